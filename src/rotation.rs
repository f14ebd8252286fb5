//! Rotation Controller (spec §4.3): the heart of the engine. Decides, per
//! tick, whether a path-sink's file must be reopened, and maintains the
//! optional symlink after a successful reopen.

use std::fs::{File, OpenOptions};
use std::os::fd::{IntoRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::warn;
use nix::errno::Errno;

use crate::cli::EngineFlags;
use crate::dirprep::{self, DEFAULT_DIR_MODE};
use crate::error::{PipelogError, Result};
use crate::link;
use crate::render;
use crate::sink::{SinkSpec, SinkState};

/// One iteration's worth of context shared by the Rotation Controller and
/// both copy engines (spec §3 `TickContext`).
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub local_now: DateTime<Local>,
    pub force_rotate: bool,
    pub splice_mode: bool,
}

impl Tick {
    pub fn new(local_now: DateTime<Local>, splice_mode: bool) -> Self {
        Tick {
            local_now,
            force_rotate: false,
            splice_mode,
        }
    }
}

/// Opens a sink for the first time. Any failure here is fatal (spec §4.3,
/// §7: "Initialization failures are always fatal").
pub fn initialize(spec: &SinkSpec, now: DateTime<Local>, splice_mode: bool) -> Result<SinkState> {
    match spec {
        SinkSpec::Inherited { fd, .. } => Ok(SinkState::inherited(*fd)),
        SinkSpec::Path { pattern, link: link_path } => {
            let rendered = render::render(pattern, now)?;
            let path = PathBuf::from(rendered);

            let file = open_with_retry(&path, splice_mode)?;

            if splice_mode {
                seek_to_end_tolerating_epipe(&file, &path)?;
            }

            if let Some(link_path) = link_path {
                link::refresh(link_path, &path)?;
            }

            Ok(SinkState::Path {
                pattern: pattern.clone(),
                link: link_path.clone(),
                rendered_name: Some(path),
                descriptor: Some(file),
            })
        }
    }
}

/// Returns the descriptor to write to for this tick, reopening the sink if
/// required. `Ok(None)` means the sink is disabled for this tick (best-effort
/// policy); `Err` means the failure was promoted to fatal by
/// `exit_on_write_error`.
pub fn current_descriptor(state: &mut SinkState, flags: &EngineFlags, tick: &Tick) -> Result<Option<RawFd>> {
    let SinkState::Path {
        pattern,
        link: link_path,
        rendered_name,
        descriptor,
    } = state
    else {
        return Ok(state.raw_fd());
    };

    let new_name = match render::render(pattern, tick.local_now).map(PathBuf::from) {
        Ok(new_name) => new_name,
        Err(err) => return fail_or_disable(flags, err, descriptor),
    };
    let name_changed = rendered_name.as_deref() != Some(new_name.as_path());
    let must_reopen = descriptor.is_none() || name_changed || tick.force_rotate;

    let Some(new_name) = must_reopen.then_some(new_name) else {
        use std::os::fd::AsRawFd;
        return Ok(descriptor.as_ref().map(|f| f.as_raw_fd()));
    };

    if let Some(old) = descriptor.take() {
        close_logging_errors(old, rendered_name.as_deref());
    }

    if name_changed {
        *rendered_name = Some(new_name.clone());
    }

    match reopen_file(&new_name, link_path.as_deref(), tick, name_changed) {
        Ok(file) => {
            let fd = {
                use std::os::fd::AsRawFd;
                file.as_raw_fd()
            };
            *descriptor = Some(file);
            Ok(Some(fd))
        }
        Err(err) => fail_or_disable(flags, err, descriptor),
    }
}

fn fail_or_disable(flags: &EngineFlags, err: PipelogError, descriptor: &mut Option<File>) -> Result<Option<RawFd>> {
    if flags.exit_on_write_error {
        return Err(err);
    }
    if !flags.quiet {
        warn!("disabling sink after reopen failure: {err}");
    }
    *descriptor = None;
    Ok(None)
}

fn reopen_file(path: &Path, link_path: Option<&Path>, tick: &Tick, name_changed: bool) -> Result<File> {
    let file = open_with_retry(path, tick.splice_mode)?;

    if tick.splice_mode {
        seek_to_end_tolerating_epipe(&file, path)?;
    }

    if name_changed {
        if let Some(link_path) = link_path {
            link::refresh(link_path, path)?;
        }
    }

    Ok(file)
}

fn open_with_retry(path: &Path, splice_mode: bool) -> Result<File> {
    match open_file(path, splice_mode) {
        Ok(file) => Ok(file),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            dirprep::prepare_parent_dirs(path, DEFAULT_DIR_MODE)?;
            open_file(path, splice_mode)
                .map_err(|source| PipelogError::io("opening file", Some(path.to_path_buf()), source))
        }
        Err(source) => Err(PipelogError::io("opening file", Some(path.to_path_buf()), source)),
    }
}

fn open_file(path: &Path, splice_mode: bool) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(splice_mode)
        .write(true)
        .append(!splice_mode)
        .mode(0o644)
        .open(path)
}

fn seek_to_end_tolerating_epipe(file: &File, path: &Path) -> Result<()> {
    use std::io::{Seek, SeekFrom};
    let mut file = file.try_clone().map_err(|source| PipelogError::io("cloning descriptor", Some(path.to_path_buf()), source))?;
    match file.seek(SeekFrom::End(0)) {
        Ok(_) => Ok(()),
        Err(source) if source.raw_os_error() == Some(Errno::EPIPE as i32) => Ok(()),
        Err(source) => Err(PipelogError::io("seeking file to end", Some(path.to_path_buf()), source)),
    }
}

fn close_logging_errors(file: File, name: Option<&Path>) {
    let fd = file.into_raw_fd();
    if let Err(err) = nix::unistd::close(fd) {
        warn!(
            "closing file '{}': {}",
            name.map(|p| p.display().to_string()).unwrap_or_default(),
            err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::os::unix::fs::MetadataExt;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    fn flags(exit_on_write_error: bool) -> EngineFlags {
        EngineFlags {
            quiet: true,
            exit_on_write_error,
            no_splice: true,
        }
    }

    #[test]
    fn reopens_iff_name_changes_or_force_rotate() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("a-%M.log").to_str().unwrap().to_owned();
        let spec = SinkSpec::Path { pattern, link: None };

        let t0 = at(2024, 6, 1, 0, 10);
        let mut state = initialize(&spec, t0, false).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        current_descriptor(&mut state, &flags(false), &Tick::new(t0, false)).unwrap();

        // Same minute, no force rotate: must not reopen, so no second file appears.
        current_descriptor(&mut state, &flags(false), &Tick::new(t0, false)).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        // Minute changes: must reopen into a second file.
        let t1 = at(2024, 6, 1, 0, 11);
        current_descriptor(&mut state, &flags(false), &Tick::new(t1, false)).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
        assert!(dir.path().join("a-10.log").exists());
        assert!(dir.path().join("a-11.log").exists());

        // Force rotate with the same name must also reopen (spec §9 open
        // question, resolved in favor of traversal).
        let before = std::fs::metadata(dir.path().join("a-11.log")).unwrap().ino();
        let mut forced = Tick::new(t1, false);
        forced.force_rotate = true;
        current_descriptor(&mut state, &flags(false), &forced).unwrap();
        let after = std::fs::metadata(dir.path().join("a-11.log")).unwrap().ino();
        assert_eq!(before, after, "same path is reopened, not replaced");
    }

    #[test]
    fn disables_sink_on_failure_without_exit_on_write_error() {
        let dir = tempfile::tempdir().unwrap();
        // A path under a file (not a directory) can never be opened.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let pattern = blocker.join("x-%M.log").to_str().unwrap().to_owned();
        let spec = SinkSpec::Path { pattern, link: None };

        let t0 = at(2024, 6, 1, 0, 10);
        // initialize itself will fail (fatal), so build the state by hand for
        // the steady-state failure path being tested.
        let mut state = SinkState::uninitialized_path(
            blocker.join("x-%M.log").to_str().unwrap().to_owned(),
            None,
        );

        let result = current_descriptor(&mut state, &flags(false), &Tick::new(t0, false)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn propagates_failure_with_exit_on_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let mut state = SinkState::uninitialized_path(
            blocker.join("x-%M.log").to_str().unwrap().to_owned(),
            None,
        );

        let t0 = at(2024, 6, 1, 0, 10);
        let result = current_descriptor(&mut state, &flags(true), &Tick::new(t0, false));
        assert!(result.is_err());
    }
}
