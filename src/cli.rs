//! Command-line argument parsing, mirroring the reference simulator's
//! `main.cpp`: a mode flag is only consulted when there are at least
//! two arguments after the program name (a flag plus a filename) -
//! a single bare argument is always treated as "disassemble this file".

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
	Disassemble,
	DisassembleToFile(PathBuf),
	Exec,
	Dump,
	ShowClocks,
	ExplainClocks,
}

pub struct Args {
	pub mode: Mode,
	pub input: PathBuf,
	pub dump_path: Option<PathBuf>,
}

pub fn parse<I: Iterator<Item = String>>(mut raw: I) -> Result<Args, String> {
	raw.next(); // argv[0]
	let rest: Vec<String> = raw.collect();

	if rest.is_empty() {
		return Err("usage: sim8086 [-exec|-dump|-showclocks|-explainclocks] <file>".to_string());
	}

	if rest.len() == 1 {
		return Ok(Args {
			mode: Mode::Disassemble,
			input: PathBuf::from(&rest[0]),
			dump_path: None,
		});
	}

	let input = PathBuf::from(&rest[1]);
	let (mode, dump_path) = match rest[0].as_str() {
		"-exec" => (Mode::Exec, None),
		"-dump" => (Mode::Dump, Some(next_dump_path())),
		"-showclocks" => (Mode::ShowClocks, None),
		"-explainclocks" => (Mode::ExplainClocks, None),
		other => (Mode::DisassembleToFile(PathBuf::from(other)), None),
	};

	Ok(Args { mode, input, dump_path })
}

/// Finds the smallest `N` for which `sim8086_memory_N.data` does not
/// already exist, matching `main.cpp`'s auto-incrementing dump
/// filename rather than deriving the sidecar from the input's name.
fn next_dump_path() -> PathBuf {
	let mut n = 0u32;
	loop {
		let candidate = PathBuf::from(format!("sim8086_memory_{}.data", n));
		if !candidate.exists() {
			return candidate;
		}
		n += 1;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn argv(parts: &[&str]) -> impl Iterator<Item = String> {
		parts.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
	}

	#[test]
	fn single_bare_argument_is_disassemble_mode() {
		let args = parse(argv(&["sim8086", "listing.bin"])).unwrap();
		assert_eq!(args.mode, Mode::Disassemble);
		assert_eq!(args.input, PathBuf::from("listing.bin"));
	}

	#[test]
	fn exec_flag_selects_exec_mode() {
		let args = parse(argv(&["sim8086", "-exec", "listing.bin"])).unwrap();
		assert_eq!(args.mode, Mode::Exec);
	}

	#[test]
	fn dump_flag_derives_an_auto_incrementing_sidecar_path() {
		let args = parse(argv(&["sim8086", "-dump", "listing.bin"])).unwrap();
		assert_eq!(args.mode, Mode::Dump);
		let path = args.dump_path.unwrap();
		let name = path.file_name().unwrap().to_str().unwrap();
		assert!(name.starts_with("sim8086_memory_") && name.ends_with(".data"));
	}

	#[test]
	fn no_arguments_is_an_error() {
		assert!(parse(argv(&["sim8086"])).is_err());
	}

	#[test]
	fn unrecognized_first_argument_is_disassemble_to_file() {
		let args = parse(argv(&["sim8086", "out.asm", "listing.bin"])).unwrap();
		assert_eq!(args.mode, Mode::DisassembleToFile(PathBuf::from("out.asm")));
		assert_eq!(args.input, PathBuf::from("listing.bin"));
	}
}
