//! The Cpu driver: owns a `Machine` and walks it forward one instruction
//! at a time via `step()`, reporting what changed so the CLI can trace
//! or tally clocks without duplicating the decode/execute/estimate
//! sequence itself. Grounded on the teacher's `CPU::clock_tick` loop:
//! decode once, execute, hand back a report.

use crate::cpu::decoder::{self, DecodedInstruction};
use crate::cpu::estimator;
use crate::cpu::executor;
use crate::machine::Machine;

/// Everything the CLI needs to print a trace line or tally clocks for
/// one executed instruction.
pub struct StepReport {
	pub instruction: DecodedInstruction,
	pub ip_before: u16,
	pub ip_after: u16,
	pub flags_before: u16,
	pub flags_after: u16,
	pub mutated_register: Option<(usize, u16, u16)>,
	pub base_clocks: u32,
	pub ea_clocks: u32,
	pub branch_taken: bool,
	pub clocks_this_step: u32,
}

pub struct Cpu {
	machine: Machine,
	total_clocks: u64,
}

impl Cpu {
	pub fn new(machine: Machine) -> Self {
		Cpu {
			machine,
			total_clocks: 0,
		}
	}

	pub fn machine(&self) -> &Machine {
		&self.machine
	}

	pub fn into_machine(self) -> Machine {
		self.machine
	}

	pub fn total_clocks(&self) -> u64 {
		self.total_clocks
	}

	pub fn at_end(&self) -> bool {
		self.machine.ip() >= self.machine.program_len()
	}

	/// Decodes and executes the instruction at the current IP, returning
	/// `None` once IP has walked past the loaded program's length.
	pub fn step(&mut self) -> Option<StepReport> {
		if self.at_end() {
			return None;
		}

		let ip_before = self.machine.ip();
		let flags_before = self.machine.flags_raw();
		let reg_before = self.register_snapshot();

		let inst = decoder::decode(&self.machine, ip_before);
		let (base_clocks, ea_clocks) = estimator::estimate(&inst);
		let is_branch = inst.opcode.is_branch();
		let fallthrough_ip = ip_before.wrapping_add(inst.length as u16);

		executor::execute(&mut self.machine, &inst);

		let ip_after = self.machine.ip();
		let flags_after = self.machine.flags_raw();
		let branch_taken = is_branch && ip_after != fallthrough_ip;

		let clocks_this_step = if is_branch {
			let (not_taken, taken) = estimator::estimate_branch(inst.opcode);
			if branch_taken {
				taken
			} else {
				not_taken
			}
		} else {
			base_clocks + ea_clocks
		};
		self.total_clocks += clocks_this_step as u64;

		let mutated_register = self.diff_registers(&reg_before);

		Some(StepReport {
			instruction: inst,
			ip_before,
			ip_after,
			flags_before,
			flags_after,
			mutated_register,
			base_clocks,
			ea_clocks,
			branch_taken,
			clocks_this_step,
		})
	}

	fn register_snapshot(&self) -> [u16; 8] {
		let mut snapshot = [0u16; 8];
		for (i, slot) in snapshot.iter_mut().enumerate() {
			*slot = self.machine.reg16(i);
		}
		snapshot
	}

	fn diff_registers(&self, before: &[u16; 8]) -> Option<(usize, u16, u16)> {
		(0..8).find_map(|i| {
			let after = self.machine.reg16(i);
			if after != before[i] {
				Some((i, before[i], after))
			} else {
				None
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::machine::WORD_REG_NAMES;

	fn cpu_with(bytes: &[u8]) -> Cpu {
		let mut m = Machine::new();
		m.load_program(bytes);
		Cpu::new(m)
	}

	#[test]
	fn step_returns_some_before_program_end() {
		let mut cpu = cpu_with(&[0x90, 0x90]);
		assert!(cpu.step().is_some());
	}

	#[test]
	fn step_reports_the_mutated_register() {
		let mut cpu = cpu_with(&[0xB8, 0x05, 0x00]); // mov ax, 5
		let report = cpu.step().unwrap();
		let (index, old, new) = report.mutated_register.unwrap();
		assert_eq!(WORD_REG_NAMES[index], "ax");
		assert_eq!(old, 0);
		assert_eq!(new, 5);
	}

	#[test]
	fn run_to_end_accumulates_clocks_and_stops() {
		let mut cpu = cpu_with(&[0xB8, 0x05, 0x00, 0x89, 0xD8]); // mov ax,5 ; mov ax,bx
		while cpu.step().is_some() {}
		assert!(cpu.at_end());
		assert_eq!(cpu.total_clocks(), 4 + 2);
	}

	#[test]
	fn loop_branch_taken_reports_branch_taken_true() {
		let mut m = Machine::new();
		m.set_reg16(1, 2); // cx
		m.load_program(&[0xE2, 0xFD]); // loop $-1
		let mut cpu = Cpu::new(m);
		let report = cpu.step().unwrap();
		assert!(report.branch_taken);
		assert_eq!(report.clocks_this_step, 0);
	}
}
