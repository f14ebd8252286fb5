//! Diagnostic logging (spec §7): a single stderr appender with a one-line
//! pattern encoder, built programmatically rather than from a `log4rs.yml`
//! since the whole configuration is two knobs (quiet or not).
//!
//! `--quiet` raises the root level above `Warn` so the "no diagnostic
//! output" guarantee is structural rather than a scattered `if !quiet`
//! around every `eprintln!`.

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::error::{PipelogError, Result};

pub fn init(quiet: bool) -> Result<()> {
    let level = if quiet { LevelFilter::Off } else { LevelFilter::Warn };

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("*** {l}: {m}{n}")))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|source| PipelogError::Config(format!("building log config: {source}")))?;

    log4rs::init_config(config).map_err(|source| PipelogError::Config(format!("initializing logger: {source}")))?;

    Ok(())
}
