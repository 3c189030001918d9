use crate::error::PersistError;
use crate::fs;
use crate::store::Persistence;
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::trace;

/// A `Persistence` backend that keeps each key in its own `<key>.json` file inside a directory.
#[derive(Debug, Clone)]
pub struct FileSlots {
    dir: PathBuf,
}

impl FileSlots {
    /// Opens (creating if needed) the slot directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

fn classify(key: &str, source: std::io::Error) -> PersistError {
    if fs::is_storage_full(&source) {
        PersistError::Full {
            key: key.to_string(),
        }
    } else {
        PersistError::Io {
            key: key.to_string(),
            source,
        }
    }
}

impl Persistence for FileSlots {
    fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, PersistError> {
        fs::read_optional(self.path(key)).map_err(|e| classify(key, e))
    }

    fn set(&self, key: &str, bytes: &[u8]) -> std::result::Result<(), PersistError> {
        trace!("Writing {} bytes to slot '{key}'", bytes.len());
        fs::write_atomic(self.path(key), bytes).map_err(|e| classify(key, e))
    }

    fn remove(&self, key: &str) -> std::result::Result<(), PersistError> {
        fs::remove_if_exists(self.path(key)).map_err(|e| classify(key, e))
    }
}
