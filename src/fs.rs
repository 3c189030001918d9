//! Blocking filesystem helpers for the persisted slots. These return `std::io::Result` so that
//! callers can classify failures (storage exhaustion in particular) before adding context.

use anyhow::{Context, Result};
use std::io::{ErrorKind, Write};
use std::path::Path;

pub(crate) fn create_dir_all(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::create_dir_all(path).context(format!("Unable to create directory {}", path.display()))
}

/// Reads the whole file, `None` if it does not exist.
pub(crate) fn read_optional(path: impl AsRef<Path>) -> std::io::Result<Option<Vec<u8>>> {
    match std::fs::read(path.as_ref()) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Writes `data` next to `path` and renames it into place, so readers see either the old or the
/// new contents and never a partial write.
pub(crate) fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);

    let result = (|| {
        let mut f = std::fs::File::create(tmp)?;
        f.write_all(data)?;
        f.sync_all()?;
        std::fs::rename(tmp, path)
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(tmp);
    }
    result
}

pub(crate) fn remove_if_exists(path: impl AsRef<Path>) -> std::io::Result<()> {
    match std::fs::remove_file(path.as_ref()) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// True when the error means the device has no space (or quota) left.
pub(crate) fn is_storage_full(e: &std::io::Error) -> bool {
    // ENOSPC, EDQUOT
    e.kind() == ErrorKind::StorageFull || matches!(e.raw_os_error(), Some(28) | Some(122))
}

#[test]
fn write_atomic_replaces_contents() {
    let tempdir = tempfile::TempDir::new().unwrap();
    let p = tempdir.path().join("slot.json");
    write_atomic(&p, b"[1]").unwrap();
    write_atomic(&p, b"[1,2]").unwrap();
    assert_eq!(read_optional(&p).unwrap().unwrap(), b"[1,2]");
    assert!(!tempdir.path().join("slot.json.tmp").exists());
}

#[test]
fn read_missing_is_none() {
    let tempdir = tempfile::TempDir::new().unwrap();
    assert!(read_optional(tempdir.path().join("nope")).unwrap().is_none());
    remove_if_exists(tempdir.path().join("nope")).unwrap();
}
