//! Sink data model (spec §3 `SinkSpec`/`SinkState`).
//!
//! `SinkSpec` is the user-facing, immutable configuration parsed by
//! [`crate::cli`]; `SinkState` is the engine-owned runtime counterpart that
//! [`crate::rotation`] mutates in place. The `Inherited`/`Path` split mirrors
//! the teacher's `CommandInterface` trait split between
//! `LocalCommandInterface` and `RemoteCommandInterface`: two shapes of the
//! same capability, dispatched once at construction rather than re-checked
//! per call.

use std::fs::File;
use std::os::fd::RawFd;
use std::path::PathBuf;

/// Immutable, user-supplied description of one output destination.
///
/// Invariant: exactly one of `{pattern, descriptor}` is set; a link is
/// permitted only when `pattern` is set. Enforced by construction — there is
/// no way to build a `Path` variant without a pattern, nor to attach a link
/// to `Inherited`.
#[derive(Debug, Clone)]
pub enum SinkSpec {
    /// A pre-opened, engine-unowned descriptor (stdout/stderr).
    Inherited { fd: RawFd, label: &'static str },
    /// A time-formatted path, with an optional symlink to the active file.
    Path {
        pattern: String,
        link: Option<PathBuf>,
    },
}

impl SinkSpec {
    pub fn is_rotation_enabled(&self) -> bool {
        match self {
            SinkSpec::Inherited { .. } => false,
            SinkSpec::Path { pattern, .. } => crate::render::is_rotation_enabled(pattern),
        }
    }

    pub fn label(&self) -> String {
        match self {
            SinkSpec::Inherited { label, .. } => (*label).to_string(),
            SinkSpec::Path { pattern, .. } => pattern.clone(),
        }
    }
}

/// Engine-owned runtime state for one sink, mutated only by
/// [`crate::rotation`] and the slow-path error-disabling rule.
pub enum SinkState {
    Inherited {
        fd: RawFd,
    },
    Path {
        pattern: String,
        link: Option<PathBuf>,
        /// Last name for which `descriptor` was successfully opened (or the
        /// name of a pending rotation attempt, per the spec's invariant).
        rendered_name: Option<PathBuf>,
        /// `None` while a reopen is pending or after a disabling write error.
        descriptor: Option<File>,
    },
}

impl SinkState {
    pub fn uninitialized_path(pattern: String, link: Option<PathBuf>) -> Self {
        SinkState::Path {
            pattern,
            link,
            rendered_name: None,
            descriptor: None,
        }
    }

    pub fn inherited(fd: RawFd) -> Self {
        SinkState::Inherited { fd }
    }

    /// Current descriptor without attempting a reopen; `None` for a disabled
    /// or not-yet-opened path-sink.
    pub fn raw_fd(&self) -> Option<RawFd> {
        match self {
            SinkState::Inherited { fd } => Some(*fd),
            SinkState::Path { descriptor, .. } => {
                use std::os::fd::AsRawFd;
                descriptor.as_ref().map(|f| f.as_raw_fd())
            }
        }
    }

    /// Marks a path-sink as needing a reopen on the next tick, per the
    /// write-failure policy. A no-op for `Inherited`: there is no reopen
    /// target to retry against, so a failing stdout/stderr write is just
    /// logged and skipped for that chunk.
    pub fn disable(&mut self) {
        if let SinkState::Path { descriptor, .. } = self {
            *descriptor = None;
        }
    }
}
