//! Driver (spec §4.7): wires the CLI, pidfile, FIFO, and Signal Coordinator
//! together and dispatches each input session to the fast or slow Copy
//! Engine, falling back permanently to the slow path after a demotion.

use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;

use anyhow::Context;
use log::error;
use nix::libc::STDIN_FILENO;

use crate::cli::{Args, EngineFlags};
use crate::clock::{Clock, SystemClock};
use crate::copy_fast;
use crate::copy_slow;
use crate::error::Result;
use crate::fifo;
use crate::pidfile::PidFile;
use crate::rotation;
use crate::signals::SignalCoordinator;
use crate::sink::{SinkSpec, SinkState};
use crate::status::Status;

/// Top-level entry point: returns the process exit code (spec §6).
pub fn run(args: &Args) -> i32 {
    if args.version {
        println!("{}", Args::version_string());
        return 0;
    }

    if let Err(err) = crate::logging::init(args.engine.quiet) {
        eprintln!("*** error: initializing logger: {err}");
        return 1;
    }

    match run_inner(args) {
        Ok((status, termination_observed)) => status.exit_code(termination_observed),
        Err(err) => {
            error!("{err:#}");
            1
        }
    }
}

fn run_inner(args: &Args) -> anyhow::Result<(Status, bool)> {
    let sink_specs = args.sinks().context("parsing sink arguments")?;
    let clock = SystemClock;
    let signals = SignalCoordinator::install().context("installing signal handlers")?;

    let _pidfile_guard = args
        .process
        .pidfile
        .as_deref()
        .map(PidFile::create)
        .transpose()
        .context("creating pidfile")?;

    let splice_mode = copy_fast::is_eligible(&sink_specs, &args.engine);
    let mut sinks = initialize_sinks(&sink_specs, &clock, splice_mode).context("initializing sinks")?;
    let mut fast_path_active = splice_mode;

    let status = if let Some(fifo_path) = &args.process.fifo {
        run_with_fifo(fifo_path, &mut sinks, &args.engine, &signals, &clock, &mut fast_path_active)
            .context("running the fifo-driven copy loop")?
    } else {
        run_once_on(STDIN_FILENO, &mut sinks, &args.engine, &signals, &clock, &mut fast_path_active)
            .context("running the copy loop")?
    };

    Ok((status, signals.termination_requested()))
}

fn initialize_sinks(specs: &[SinkSpec], clock: &dyn Clock, splice_mode: bool) -> Result<Vec<SinkState>> {
    let now = clock.now();
    let mut sinks = Vec::with_capacity(specs.len());
    for spec in specs {
        match rotation::initialize(spec, now, splice_mode) {
            Ok(state) => sinks.push(state),
            Err(err) => {
                teardown(&mut sinks);
                return Err(err);
            }
        }
    }
    Ok(sinks)
}

/// Partially initialized sinks are torn down in reverse order (spec §7).
fn teardown(sinks: &mut Vec<SinkState>) {
    while sinks.pop().is_some() {}
}

fn run_with_fifo(
    fifo_path: &Path,
    sinks: &mut [SinkState],
    flags: &EngineFlags,
    signals: &SignalCoordinator,
    clock: &dyn Clock,
    fast_path_active: &mut bool,
) -> Result<Status> {
    fifo::ensure_exists(fifo_path)?;

    let result = loop {
        let file = match fifo::open_read(fifo_path) {
            Ok(file) => file,
            Err(err) => break Err(err),
        };
        let fd = file.as_raw_fd();

        let status = run_once_on(fd, sinks, flags, signals, clock, fast_path_active);
        drop(file);

        match status {
            Ok(Status::Success) if !signals.termination_requested() => continue,
            other => break other,
        }
    };

    fifo::remove(fifo_path);
    result
}

fn run_once_on(
    input_fd: RawFd,
    sinks: &mut [SinkState],
    flags: &EngineFlags,
    signals: &SignalCoordinator,
    clock: &dyn Clock,
    fast_path_active: &mut bool,
) -> Result<Status> {
    if *fast_path_active && copy_fast::enable(input_fd) {
        match copy_fast::run(input_fd, &mut sinks[0], flags, signals, clock) {
            copy_fast::FastPathOutcome::Done(status) => return Ok(status),
            copy_fast::FastPathOutcome::Demoted => *fast_path_active = false,
        }
    }
    Ok(copy_slow::run(input_fd, sinks, flags, signals, clock))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::OpenOptionsExt;
    use std::time::Duration;

    use chrono::{Local, TimeZone};

    use crate::clock::FrozenClock;
    use crate::rotation;

    fn flags() -> EngineFlags {
        EngineFlags {
            quiet: true,
            exit_on_write_error: false,
            no_splice: true,
        }
    }

    /// Scenario F (spec §8): a FIFO writer disconnects (EOF, reopen) one or
    /// more times, then a `SIGTERM` arrives; the loop exits with `Success`,
    /// the termination is observed, and the FIFO is unlinked on the way out.
    #[test]
    fn fifo_reopens_on_eof_then_exits_cleanly_on_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let fifo_path = dir.path().join("input.fifo");
        let out_pattern = dir.path().join("out-%M.log").to_str().unwrap().to_owned();
        let out_spec = SinkSpec::Path {
            pattern: out_pattern,
            link: None,
        };

        let now = Local.with_ymd_and_hms(2024, 6, 1, 0, 40, 0).unwrap();
        let mut sinks = vec![rotation::initialize(&out_spec, now, false).unwrap()];
        let clock = FrozenClock(now);
        let signals = SignalCoordinator::install().unwrap();
        let mut fast_path_active = false;

        fifo::ensure_exists(&fifo_path).unwrap();

        // Held open for the test's lifetime so a write-only open never fails
        // with ENXIO for want of a reader, and so the fifo's buffer survives
        // between the writer's disconnect and the driver's next reopen.
        let _keepalive = std::fs::OpenOptions::new().read(true).write(true).open(&fifo_path).unwrap();

        let mut writer = std::fs::OpenOptions::new()
            .write(true)
            .custom_flags(nix::libc::O_NONBLOCK)
            .open(&fifo_path)
            .unwrap();
        {
            use std::io::Write;
            writer.write_all(b"line one\n").unwrap();
        }
        drop(writer);

        let terminator = std::thread::spawn(|| {
            std::thread::sleep(Duration::from_millis(30));
            unsafe {
                nix::libc::raise(nix::libc::SIGTERM);
            }
        });

        let status = run_with_fifo(&fifo_path, &mut sinks, &flags(), &signals, &clock, &mut fast_path_active).unwrap();
        terminator.join().unwrap();

        assert_eq!(status, Status::Success);
        assert!(signals.termination_requested());
        assert!(!fifo_path.exists(), "fifo must be unlinked on exit");
        assert_eq!(
            std::fs::read(dir.path().join("out-40.log")).unwrap(),
            b"line one\n"
        );
    }
}
