//! Structured error type for the streaming engine.
//!
//! Mirrors the split the teacher uses in `abstract_fs::trace`/`abstract_fs::fs`:
//! a `thiserror` enum inside library code, with `anyhow::Context` reserved for
//! the driver/CLI boundary.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelogError>;

#[derive(Error, Debug)]
pub enum PipelogError {
    #[error("invalid argument: {0}")]
    Config(String),

    #[error("{op} '{}': {source}", path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<fd>".into()))]
    Io {
        op: &'static str,
        path: Option<PathBuf>,
        #[source]
        source: io::Error,
    },

    #[error("cannot format logfile pattern '{pattern}'")]
    Format { pattern: String },

    #[error("interrupted")]
    Interrupted,
}

impl PipelogError {
    pub fn io(op: &'static str, path: Option<PathBuf>, source: io::Error) -> Self {
        PipelogError::Io { op, path, source }
    }
}
