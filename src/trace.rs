//! Per-instruction trace lines and the final-state summary, mirroring
//! the reference simulator's `-exec` output: each executed instruction
//! is followed by what it changed, and the run ends with a dump of the
//! registers the run actually touched (in the order they were first
//! touched), the instruction pointer and any set flags.

use crate::cpu::cpu::StepReport;
use crate::machine::{Machine, FLAG_SYMBOLS, WORD_REG_NAMES};

fn flags_text(flags: u16) -> String {
	FLAG_SYMBOLS
		.iter()
		.filter(|(bit, _)| flags & (1 << bit) != 0)
		.map(|(_, symbol)| *symbol)
		.collect()
}

/// The `reg:old->new ip:old->new [flags:old->new]` suffix appended after
/// an instruction's rendered text in `-exec` mode.
pub fn format_effect(report: &StepReport) -> String {
	let mut parts = Vec::new();

	if let Some((index, old, new)) = report.mutated_register {
		parts.push(format!("{}:0x{:04x}->0x{:04x}", WORD_REG_NAMES[index], old, new));
	}

	parts.push(format!("ip:0x{:02x}->0x{:02x}", report.ip_before, report.ip_after));

	if report.flags_before != report.flags_after {
		parts.push(format!(
			"flags:{}->{}",
			flags_text(report.flags_before),
			flags_text(report.flags_after)
		));
	}

	parts.join(" ")
}

/// The `-showclocks` suffix: this step's clocks, running total, and the
/// EA penalty breakdown when one applies.
pub fn format_clocks(report: &StepReport, running_total: u64) -> String {
	if report.ea_clocks > 0 {
		format!(
			"Clocks: +{} ({} + {}ea) = {}",
			report.clocks_this_step, report.base_clocks, report.ea_clocks, running_total
		)
	} else {
		format!("Clocks: +{} = {}", report.clocks_this_step, running_total)
	}
}

pub fn format_final_state(machine: &Machine) -> String {
	let mut out = String::from("Final registers:\n");
	for &index in machine.mutated_registers() {
		let value = machine.reg16(index);
		out.push_str(&format!("      {}: 0x{:04x} ({})\n", WORD_REG_NAMES[index], value, value));
	}
	out.push_str(&format!("      ip: 0x{:04x} ({})\n", machine.ip(), machine.ip()));
	if machine.any_flag_set() {
		out.push_str(&format!("   flags: {}\n", machine.flags_symbols()));
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cpu::cpu::Cpu;

	#[test]
	fn effect_line_reports_zero_padded_register_and_ip_change() {
		let mut m = Machine::new();
		m.load_program(&[0xB8, 0x05, 0x00]); // mov ax, 5
		let mut cpu = Cpu::new(m);
		let report = cpu.step().unwrap();
		assert_eq!(format_effect(&report), "ax:0x0000->0x0005 ip:0x00->0x03");
	}

	#[test]
	fn final_state_lists_only_mutated_registers_in_mutation_order() {
		let mut m = Machine::new();
		m.set_reg16(3, 7); // bx
		m.set_reg16(0, 0); // ax: written, but back to zero - still mutated
		let text = format_final_state(&m);
		assert!(text.contains("bx: 0x0007 (7)"));
		assert!(text.contains("ax: 0x0000 (0)"));
		assert!(text.find("bx:").unwrap() < text.find("ax:").unwrap());
	}
}
