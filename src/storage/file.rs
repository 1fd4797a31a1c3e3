//! Directory-backed storage, one file per key.

use super::Persistence;
use crate::error::{NotifyError, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Stores each key as `<dir>/<key>.json`.
///
/// The directory is held under an exclusive advisory lock for the lifetime
/// of the value, so a second session on the same directory fails with
/// [`NotifyError::Locked`].
pub struct FileStorage {
    path: PathBuf,
    _lock_file: File,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        let lock_file = Self::acquire_lock(&path)?;

        Ok(Self {
            path,
            _lock_file: lock_file,
        })
    }

    /// Directory this storage writes into.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.path.join(format!("{key}.json")))
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| NotifyError::Locked)?;

        Ok(lock_file)
    }
}

impl Persistence for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.blob_path(key)?) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, blob: &str) -> Result<()> {
        let target = self.blob_path(key)?;
        let tmp = self.path.join(format!("{key}.json.tmp"));

        // Rename is atomic on the same filesystem; readers see old or new.
        let result = write_synced(&tmp, blob).and_then(|()| Ok(fs::rename(&tmp, &target)?));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}

fn write_synced(path: &Path, blob: &str) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(blob.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Keys become file names, so keep them to a portable alphabet.
fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(NotifyError::Config(format!("invalid storage key: {key:?}")))
    }
}
