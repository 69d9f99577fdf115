//! Versioned, atomically replaced files.
//!
//! Every file in the cache directory is a bincode-encoded [`Envelope`]. Writes
//! go to a temporary file in the same directory which is synced and then
//! renamed over the target, so readers see either the old contents or the
//! new ones.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub(crate) const FORMAT_VERSION: u32 = 1;

const TEMP_PREFIX: &str = ".pending-";

#[derive(Serialize, Deserialize)]
struct Envelope<B> {
	version: u32,
	body: B,
}

/// Read and decode a file. A missing file is `Ok(None)`.
pub(crate) fn read<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
	let bytes = match fs::read(path) {
		Ok(bytes) => bytes,
		Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
		Err(err) => return Err(Error::io(path, err)),
	};

	let envelope: Envelope<T> = bincode::deserialize(&bytes)?;
	if envelope.version != FORMAT_VERSION {
		return Err(Error::Version {
			path: path.to_path_buf(),
			found: envelope.version,
		});
	}
	Ok(Some(envelope.body))
}

/// Encode `body` and atomically replace `path` with it.
pub(crate) fn write_atomic<T: Serialize>(path: &Path, body: &T) -> Result<()> {
	let bytes = bincode::serialize(&Envelope {
		version: FORMAT_VERSION,
		body,
	})?;

	let dir = path.parent().unwrap_or_else(|| Path::new("."));
	let mut temp = tempfile::Builder::new()
		.prefix(TEMP_PREFIX)
		.tempfile_in(dir)
		.map_err(|err| Error::io(dir, err))?;
	temp.write_all(&bytes).map_err(|err| Error::io(temp.path(), err))?;
	temp.as_file().sync_all().map_err(|err| Error::io(temp.path(), err))?;
	temp.persist(path).map_err(|err| Error::io(path, err.error))?;
	Ok(())
}

/// Delete a file. A file that is already gone is not an error.
pub(crate) fn remove(path: &Path) -> Result<()> {
	match fs::remove_file(path) {
		Ok(()) => Ok(()),
		Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
		Err(err) => Err(Error::io(path, err)),
	}
}
