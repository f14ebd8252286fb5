//! Pidfile management (spec §4.7, §6): exclusive-create, `"<pid>\n"` body,
//! best-effort unlink on drop.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::{PipelogError, Result};

const PIDFILE_MODE: u32 = 0o644;

/// RAII guard: the pidfile is removed when this value is dropped, mirroring
/// the original's "best-effort unlink on exit" rather than a fallible
/// explicit teardown call.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Writes the current process id to `path`, failing if it already
    /// exists (spec: "exclusive create").
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(PIDFILE_MODE)
            .open(path)
            .map_err(|source| PipelogError::io("creating pidfile", Some(path.to_path_buf()), source))?;

        write!(file, "{}\n", std::process::id())
            .map_err(|source| PipelogError::io("writing pidfile", Some(path.to_path_buf()), source))?;

        Ok(PidFile { path: path.to_path_buf() })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("removing pidfile '{}': {}", self.path.display(), err);
            }
        }
    }
}
