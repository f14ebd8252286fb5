//! Link Maintainer (spec §4.3, `Link Maintainer` in §2): after a successful
//! rotation, atomically-as-possible repoints a sink's symlink at the new
//! file's absolute path.

use std::fs;
use std::path::Path;

use log::debug;

use crate::dirprep::{self, DEFAULT_DIR_MODE};
use crate::error::{PipelogError, Result};

/// `unlink`-then-`symlink` the `link` path at the absolute path of
/// `rendered_file`. Non-atomic (see spec §9 design notes); accepted because
/// no portable atomic alternative exists across the targeted filesystems.
pub fn refresh(link: &Path, rendered_file: &Path) -> Result<()> {
    dirprep::prepare_parent_dirs(link, DEFAULT_DIR_MODE)?;

    match fs::remove_file(link) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => return Err(PipelogError::io("unlinking", Some(link.to_path_buf()), source)),
    }

    let absolute = fs::canonicalize(rendered_file)
        .map_err(|source| PipelogError::io("resolving absolute path", Some(rendered_file.to_path_buf()), source))?;

    debug!("linking '{}' -> '{}'", link.display(), absolute.display());

    std::os::unix::fs::symlink(&absolute, link)
        .map_err(|source| PipelogError::io("creating symlink", Some(link.to_path_buf()), source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_at_absolute_path_and_can_be_refreshed_twice() {
        let dir = tempfile::tempdir().unwrap();
        let file_a = dir.path().join("a.log");
        let file_b = dir.path().join("b.log");
        fs::write(&file_a, b"1").unwrap();
        fs::write(&file_b, b"2").unwrap();
        let link = dir.path().join("latest");

        refresh(&link, &file_a).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), fs::canonicalize(&file_a).unwrap());

        refresh(&link, &file_b).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), fs::canonicalize(&file_b).unwrap());
    }
}
