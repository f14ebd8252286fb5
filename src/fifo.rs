//! FIFO lifecycle for `--fifo` (spec §4.7, §6): create-if-missing, then
//! reopened non-blocking read-only once per Driver iteration.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::Path;

use log::warn;
use nix::errno::Errno;
use nix::libc::O_NONBLOCK;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

use crate::error::{PipelogError, Result};

const FIFO_MODE: u32 = 0o644;

/// Creates the FIFO at `path` if it does not exist yet. `EEXIST` is
/// tolerated only when the existing entry is already a FIFO.
pub fn ensure_exists(path: &Path) -> Result<()> {
    match mkfifo(path, Mode::from_bits_truncate(FIFO_MODE)) {
        Ok(()) => Ok(()),
        Err(Errno::EEXIST) => {
            let metadata = std::fs::symlink_metadata(path)
                .map_err(|source| PipelogError::io("checking fifo path", Some(path.to_path_buf()), source))?;
            if metadata.file_type().is_fifo() {
                Ok(())
            } else {
                Err(PipelogError::Config(format!(
                    "'{}' exists and is not a fifo",
                    path.display()
                )))
            }
        }
        Err(errno) => Err(PipelogError::io(
            "creating fifo",
            Some(path.to_path_buf()),
            std::io::Error::from_raw_os_error(errno as i32),
        )),
    }
}

/// Opens the FIFO non-blocking, read-only, for one Driver iteration.
pub fn open_read(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(O_NONBLOCK)
        .open(path)
        .map_err(|source| PipelogError::io("opening fifo", Some(path.to_path_buf()), source))
}

/// Best-effort unlink on Driver exit; a missing file is not an error.
pub fn remove(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("removing fifo '{}': {}", path.display(), err);
        }
    }
}
