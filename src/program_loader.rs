//! Loading an 8086 binary image into a fresh `Machine`.

use std::fs;
use std::path::Path;

use crate::error::SimError;
use crate::machine::Machine;

/// Reads `path` into a new `Machine`, starting execution at IP 0.
pub fn load_program(path: &Path) -> Result<Machine, SimError> {
	let bytes = fs::read(path).map_err(|source| SimError::Io {
		path: path.to_path_buf(),
		source,
	})?;
	let mut machine = Machine::new();
	machine.load_program(&bytes);
	Ok(machine)
}

/// Parses a space-separated hex byte string into a `Vec<u8>`, in the
/// style of the teacher's `write_rom` fixture helper. Test-only: real
/// programs are loaded from disk via `load_program`.
#[cfg(test)]
pub fn assemble(hex_bytes: &str) -> Vec<u8> {
	hex_bytes
		.split_whitespace()
		.map(|byte| hex::decode(byte).expect("test fixture hex must be well-formed")[0])
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn assemble_parses_space_separated_hex_bytes() {
		assert_eq!(assemble("B8 05 00"), vec![0xB8, 0x05, 0x00]);
	}

	#[test]
	fn load_program_reads_file_bytes_into_memory_at_zero() {
		let mut path = std::env::temp_dir();
		path.push("sim8086_program_loader_test.bin");
		{
			let mut f = fs::File::create(&path).unwrap();
			f.write_all(&[0xB8, 0x05, 0x00]).unwrap();
		}
		let machine = load_program(&path).unwrap();
		assert_eq!(machine.program_len(), 3);
		assert_eq!(machine.read_byte(0), 0xB8);
		fs::remove_file(&path).ok();
	}

	#[test]
	fn load_program_reports_io_error_for_missing_file() {
		let path = Path::new("/nonexistent/path/sim8086_missing.bin");
		assert!(load_program(path).is_err());
	}
}
