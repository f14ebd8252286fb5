//! Copy Engine — slow/buffered path (spec §4.4). Used whenever more than one
//! sink exists, or the fast path has been disabled or demoted.

use std::os::fd::RawFd;

use log::{error, warn};
use nix::errno::Errno;

use crate::cli::EngineFlags;
use crate::clock::Clock;
use crate::error::PipelogError;
use crate::rotation::{self, Tick};
use crate::signals::SignalCoordinator;
use crate::sink::SinkState;
use crate::status::Status;

/// Matches the glibc default `BUFSIZ` the original reads into.
const BUFSIZ: usize = 8192;

/// Runs the buffered copy loop until end of input, a fatal error, or an
/// interruption. Returns the terminal [`Status`]; never panics on I/O
/// failures — those are folded into the returned status per spec §7.
pub fn run(
    input_fd: RawFd,
    sinks: &mut [SinkState],
    flags: &EngineFlags,
    signals: &SignalCoordinator,
    clock: &dyn Clock,
) -> Status {
    let mut buf = [0u8; BUFSIZ];

    loop {
        let mut force_rotate = signals.take_rotate_request();

        let rcount = if force_rotate {
            0
        } else {
            match read_input(input_fd, &mut buf) {
                ReadOutcome::Eof => return Status::Success,
                ReadOutcome::Read(n) => n,
                ReadOutcome::Interrupted => {
                    if signals.take_rotate_request() {
                        force_rotate = true;
                        0
                    } else {
                        if !flags.quiet {
                            error!("reading input: {}", Errno::EINTR);
                        }
                        return Status::Interrupted;
                    }
                }
                ReadOutcome::Error(e) => {
                    if !flags.quiet {
                        error!("reading input: {e}");
                    }
                    return Status::Error;
                }
            }
        };

        let saved_mask = match signals.block_rotate() {
            Ok(mask) => mask,
            Err(e) => {
                if !flags.quiet {
                    error!("blocking rotate signal: {e}");
                }
                return Status::Error;
            }
        };

        // Capturing local time is side-effect-free, so we do it unconditionally
        // rather than conditioning on whether any sink actually needs it; a
        // static-pattern sink's render simply ignores the value.
        let tick = Tick {
            local_now: clock.now(),
            force_rotate,
            splice_mode: false,
        };

        let status = distribute_chunk(sinks, &buf[..rcount], flags, &tick);

        if let Err(e) = signals.unblock_rotate(saved_mask) {
            if !flags.quiet {
                error!("unblocking rotate signal: {e}");
            }
            return Status::Error;
        }

        if let Some(status) = status {
            return status;
        }
    }
}

/// Writes `chunk` to every sink in order, disabling or failing sinks per
/// spec §4.4's write-failure policy. `None` means the loop should continue.
fn distribute_chunk(sinks: &mut [SinkState], chunk: &[u8], flags: &EngineFlags, tick: &Tick) -> Option<Status> {
    for (index, sink) in sinks.iter_mut().enumerate() {
        let fd = match rotation::current_descriptor(sink, flags, tick) {
            Ok(Some(fd)) => fd,
            Ok(None) => continue,
            Err(err) => {
                if !flags.quiet {
                    error!("output[{index}]: {err}");
                }
                return Some(Status::Error);
            }
        };

        match write_full(fd, chunk, index, flags) {
            WriteOutcome::Completed => {}
            WriteOutcome::Disabled => sink.disable(),
            WriteOutcome::Interrupted => return Some(Status::Interrupted),
            WriteOutcome::Fatal => return Some(Status::Error),
        }
    }
    None
}

enum WriteOutcome {
    Completed,
    Disabled,
    Interrupted,
    Fatal,
}

fn write_full(fd: RawFd, chunk: &[u8], index: usize, flags: &EngineFlags) -> WriteOutcome {
    let mut offset = 0;
    while offset < chunk.len() {
        match nix::unistd::write(fd, &chunk[offset..]) {
            Ok(0) => break,
            Ok(n) => offset += n,
            Err(Errno::EINTR) => {
                if !flags.quiet {
                    error!("output[{index}]: writing output: {}", Errno::EINTR);
                }
                return WriteOutcome::Interrupted;
            }
            Err(e) if flags.exit_on_write_error => {
                if !flags.quiet {
                    error!("output[{index}]: writing output: {e}");
                }
                return WriteOutcome::Fatal;
            }
            Err(Errno::EAGAIN) => break,
            Err(e) => {
                if !flags.quiet {
                    warn!("output[{index}]: writing output: {e}, disabling sink");
                }
                return WriteOutcome::Disabled;
            }
        }
    }
    WriteOutcome::Completed
}

enum ReadOutcome {
    Eof,
    Read(usize),
    Interrupted,
    Error(PipelogError),
}

fn read_input(fd: RawFd, buf: &mut [u8]) -> ReadOutcome {
    match nix::unistd::read(fd, buf) {
        Ok(0) => ReadOutcome::Eof,
        Ok(n) => ReadOutcome::Read(n),
        Err(Errno::EINTR) => ReadOutcome::Interrupted,
        Err(e) => ReadOutcome::Error(PipelogError::io(
            "reading input",
            None,
            std::io::Error::from_raw_os_error(e as i32),
        )),
    }
}
