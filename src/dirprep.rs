//! Directory Preparer (spec §4.2): ensures a path's ancestor directories
//! exist, never creating the final path component itself.

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

use log::debug;

use crate::error::{PipelogError, Result};

pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Creates every missing ancestor directory of `path` with `mode`, treating
/// the final component as the file itself (never created here). Mirrors the
/// original's `make_parent_dirs`: idempotent, tolerates a directory that
/// already exists.
pub fn prepare_parent_dirs(path: &Path, mode: u32) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent == Path::new("/") {
        return Ok(());
    }

    debug!("creating parent directories for '{}'", path.display());

    DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(parent)
        .map_err(|source| PipelogError::io("creating parent directory", Some(parent.to_path_buf()), source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let target: PathBuf = dir.path().join("a/b/c/file.log");

        prepare_parent_dirs(&target, DEFAULT_DIR_MODE).unwrap();
        assert!(target.parent().unwrap().is_dir());
        assert!(!target.exists());

        // Running twice must not error.
        prepare_parent_dirs(&target, DEFAULT_DIR_MODE).unwrap();
    }

    #[test]
    fn no_parent_components_is_a_noop() {
        prepare_parent_dirs(Path::new("file.log"), DEFAULT_DIR_MODE).unwrap();
    }
}
