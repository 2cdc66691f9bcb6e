use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors at the crate's only fallible boundary: the filesystem.
/// The decode/execute/estimate core never returns `Result` - it has
/// no fallible operations once handed an in-bounds instruction pointer.
#[derive(Debug, Error)]
pub enum SimError {
	#[error("{path:?} could not be opened for reading!")]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("could not write memory dump to {path:?}")]
	DumpWrite {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("could not write disassembly to {path:?}")]
	OutputWrite {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
}
