//! Small filesystem helpers shared by [`crate::workspace`] and [`crate::note`].

use crate::error::{CoreError, Result};
use std::fs;
use std::path::Path;

/// Write `contents` to `path` via a temp file + rename so a crash never
/// leaves a half-written file behind.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| CoreError::PathUnsafe(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent).map_err(|e| CoreError::io("create_dir_all", parent, e))?;

    let temp_path = parent.join(format!(".tmp.{}.{}", std::process::id(), temp_suffix()));

    fs::write(&temp_path, contents).map_err(|e| CoreError::io("write", &temp_path, e))?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        CoreError::io("rename", path, e)
    })?;

    Ok(())
}

/// A process-local counter so concurrent atomic writes in the same process
/// never collide on the same temp file name.
fn temp_suffix() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}
