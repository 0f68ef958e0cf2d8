//! Whole-file writes that readers never observe half-done.
//!
//! Both helpers stage the bytes in a dot-prefixed temp file next to the
//! target, then publish it with a single filesystem operation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

// ---

/// Replace `path` with `bytes`, creating it if needed.
pub(crate) fn replace_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    // ---
    let tmp = staging_path(path);
    write_staged(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Create `path` with `bytes` only if it does not exist yet.
///
/// Returns `Ok(false)` when the target already exists; its content is left
/// untouched. The existence check and the publish are one `link(2)` call.
pub(crate) fn create_new_atomic(path: &Path, bytes: &[u8]) -> io::Result<bool> {
    // ---
    let tmp = staging_path(path);
    write_staged(&tmp, bytes)?;
    let linked = fs::hard_link(&tmp, path);
    let _ = fs::remove_file(&tmp);
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// Write the staging file, removing whatever was written if that fails.
fn write_staged(tmp: &Path, bytes: &[u8]) -> io::Result<()> {
    // ---
    fs::write(tmp, bytes).inspect_err(|_| {
        let _ = fs::remove_file(tmp);
    })
}

fn staging_path(path: &Path) -> PathBuf {
    // ---
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_name = format!(".{}.{}.tmp", name, Uuid::new_v4().simple());
    match path.parent() {
        Some(dir) => dir.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}
