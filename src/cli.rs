//! Command-line interface (spec §6).
//!
//! Grouped into functional flag structs the way `jmalicki-arsync`'s `cli.rs`
//! flattens `PathConfig`/`IoConfig`/... into one `Args` (the teacher's own
//! `args.rs` is a single flat struct); `clap` cannot express the
//! `FILE [@LINK]` positional-pairing grammar, so the raw tokens are parsed by
//! hand in [`Args::sinks`], mirroring the manual loop in the original
//! `main()`.

use std::path::PathBuf;

use clap::Parser;

use crate::error::{PipelogError, Result};
use crate::sink::SinkSpec;

pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 9;
pub const VERSION_PATCH: u32 = 0;

/// Runtime policy flags (spec §3 `Flags`). Reused directly as the domain type
/// the engine consults, the way the teacher's `MetadataConfig` is consumed
/// directly by copy operations rather than translated into a second struct.
#[derive(clap::Args, Debug, Clone, Copy)]
#[command(next_help_heading = "Engine Options")]
pub struct EngineFlags {
    /// Don't print error messages.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Exit if writing to any output fails or reopening on rotation fails.
    #[arg(short = 'e', long = "exit-on-write-error")]
    pub exit_on_write_error: bool,

    /// Disable the zero-copy splice fast path.
    #[arg(short = 'S', long = "no-splice")]
    pub no_splice: bool,
}

/// Pidfile and FIFO wiring, owned by the Driver (spec §4.7, §9).
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Process Options")]
pub struct ProcessConfig {
    /// Write pipelog's process ID to PATH; removed on exit.
    #[arg(short = 'p', long = "pidfile", value_name = "PATH")]
    pub pidfile: Option<PathBuf>,

    /// Read input from a FIFO at PATH, creating it if absent; reopened on EOF.
    #[arg(short = 'f', long = "fifo", value_name = "PATH")]
    pub fifo: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pipelog",
    about = "pipe to log rotated files",
    disable_version_flag = true,
    override_usage = "pipelog [OPTION]... [--] [FILE [@LINK]]..."
)]
pub struct Args {
    /// Print version (MAJOR.MINOR.PATCH) and exit.
    #[arg(short = 'v', long = "version", action = clap::ArgAction::SetTrue)]
    pub version: bool,

    #[command(flatten)]
    pub process: ProcessConfig,

    #[command(flatten)]
    pub engine: EngineFlags,

    /// FILE, optionally followed by a separate @LINK token.
    #[arg(value_name = "FILE", trailing_var_arg = true, allow_hyphen_values = true)]
    pub raw_sinks: Vec<String>,
}

impl Args {
    pub fn version_string() -> String {
        format!("{VERSION_MAJOR}.{VERSION_MINOR}.{VERSION_PATCH}")
    }

    /// Parses the trailing `FILE [@LINK]...` token stream into sink
    /// specifications, matching the original's hand-rolled argv walk.
    pub fn sinks(&self) -> Result<Vec<SinkSpec>> {
        parse_sinks(&self.raw_sinks)
    }
}

fn parse_sinks(tokens: &[String]) -> Result<Vec<SinkSpec>> {
    if tokens.is_empty() {
        return Err(PipelogError::Config("illegal number of arguments".into()));
    }

    let mut sinks = Vec::new();
    let mut index = 0;
    while index < tokens.len() {
        let arg = &tokens[index];
        if arg.is_empty() {
            return Err(PipelogError::Config("FILE may not be an empty string".into()));
        }

        let next_is_link = tokens
            .get(index + 1)
            .map(|next| next.starts_with('@'))
            .unwrap_or(false);

        match arg.as_str() {
            "STDOUT" | "-" => {
                if next_is_link {
                    return Err(PipelogError::Config(
                        "only if FILE is a path it may be followed by @LINK".into(),
                    ));
                }
                sinks.push(SinkSpec::Inherited {
                    fd: nix::libc::STDOUT_FILENO,
                    label: "STDOUT",
                });
                index += 1;
            }
            "STDERR" => {
                if next_is_link {
                    return Err(PipelogError::Config(
                        "only if FILE is a path it may be followed by @LINK".into(),
                    ));
                }
                sinks.push(SinkSpec::Inherited {
                    fd: nix::libc::STDERR_FILENO,
                    label: "STDERR",
                });
                index += 1;
            }
            pattern => {
                let link = if next_is_link {
                    let token = &tokens[index + 1];
                    let link_str = &token[1..];
                    if link_str.is_empty() {
                        return Err(PipelogError::Config("LINK may not be an empty string".into()));
                    }
                    index += 1;
                    Some(PathBuf::from(link_str))
                } else {
                    None
                };
                sinks.push(SinkSpec::Path {
                    pattern: pattern.to_owned(),
                    link,
                });
                index += 1;
            }
        }
    }

    Ok(sinks)
}
