use std::process::ExitCode;

use log::error;
use simple_logger::SimpleLogger;

mod cli;
mod common;
mod cpu;
mod error;
mod machine;
mod program_loader;
mod render;
mod trace;

use cli::Mode;
use cpu::cpu::Cpu;
use cpu::decoder;
use error::SimError;
use machine::Machine;

fn main() -> ExitCode {
	SimpleLogger::new().init().unwrap();

	let args = match cli::parse(std::env::args()) {
		Ok(args) => args,
		Err(message) => {
			eprintln!("{}", message);
			return ExitCode::from(255);
		}
	};

	let machine = match program_loader::load_program(&args.input) {
		Ok(machine) => machine,
		Err(err) => {
			error!("{}", err);
			return ExitCode::from(255);
		}
	};

	let result = match args.mode {
		Mode::Disassemble => {
			print!("{}", disassemble_text(&machine));
			Ok(())
		}
		Mode::DisassembleToFile(path) => std::fs::write(&path, disassemble_text(&machine)).map_err(|source| SimError::OutputWrite { path, source }),
		Mode::Exec => {
			run(machine, false);
			Ok(())
		}
		Mode::ShowClocks | Mode::ExplainClocks => {
			run(machine, true);
			Ok(())
		}
		Mode::Dump => dump(machine, args.dump_path.as_deref()),
	};

	if let Err(err) = result {
		error!("{}", err);
		return ExitCode::from(255);
	}

	ExitCode::SUCCESS
}

/// Decodes the whole loaded image without executing it, rendering one
/// instruction per line.
fn disassemble_text(machine: &Machine) -> String {
	let mut out = String::new();
	let mut ip = 0u16;
	while ip < machine.program_len() {
		let inst = decoder::decode(machine, ip);
		out.push_str(&render::render(&inst));
		out.push('\n');
		ip = ip.wrapping_add(inst.length as u16);
	}
	out
}

/// Runs the loaded image to completion, printing each instruction's
/// rendered text and effect (optionally annotated with its clock cost)
/// followed by the final-state summary. Returns the machine in its
/// final state so `-dump` can share this same trace before dumping.
fn run(machine: Machine, show_clocks: bool) -> Machine {
	let mut cpu = Cpu::new(machine);
	while let Some(report) = cpu.step() {
		let text = render::render(&report.instruction);
		let effect = trace::format_effect(&report);
		if show_clocks {
			let clocks = trace::format_clocks(&report, cpu.total_clocks());
			println!("{} ; {} | {}", text, effect, clocks);
		} else {
			println!("{} ; {}", text, effect);
		}
	}
	println!();
	print!("{}", trace::format_final_state(cpu.machine()));
	cpu.into_machine()
}

/// Shares `-exec`'s full trace and final-state summary, then additionally
/// writes the final memory image to `dump_path`.
fn dump(machine: Machine, dump_path: Option<&std::path::Path>) -> Result<(), SimError> {
	let final_machine = run(machine, false);

	let path = dump_path.expect("dump mode always carries a sidecar path");
	std::fs::write(path, final_machine.memory().as_slice()).map_err(|source| SimError::DumpWrite {
		path: path.to_path_buf(),
		source,
	})
}
