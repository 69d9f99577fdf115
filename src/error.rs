use std::io;
use std::path::{Path, PathBuf};

/// Result alias used by the fallible cache operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures raised while accessing the on-disk tier.
///
/// A missing key is never an error; lookups simply omit it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The cache directory or one of its files could not be read or written.
	#[error("cache i/o failed at {}", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	/// A key, index or shard record could not be encoded or decoded.
	#[error("cache codec error: {0}")]
	Codec(#[from] bincode::Error),
	/// A file was written by an incompatible format version.
	#[error("unsupported format version {found} in {}", path.display())]
	Version {
		path: PathBuf,
		found: u32,
	},
}

impl Error {
	pub(crate) fn io(path: &Path, source: io::Error) -> Self {
		Self::Io {
			path: path.to_path_buf(),
			source,
		}
	}

	/// True when the file exists but its contents cannot be trusted.
	///
	/// Corrupt files are recovered locally; plain I/O failures are not.
	pub fn is_corruption(&self) -> bool {
		matches!(self, Self::Codec(_) | Self::Version { .. })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_io_error_mentions_path() {
		let err = Error::io(Path::new("/tmp/cache/index.bin"), io::Error::other("denied"));
		assert!(err.to_string().contains("/tmp/cache/index.bin"));
		assert!(!err.is_corruption());
	}

	#[test]
	fn test_version_error_is_corruption() {
		let err = Error::Version {
			path: PathBuf::from("a.shard"),
			found: 9,
		};
		assert!(err.is_corruption());
		assert!(err.to_string().contains("version 9"));
	}
}
