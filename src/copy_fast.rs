//! Copy Engine — fast/zero-copy path (spec §4.5). Used only when there is
//! exactly one path-sink and the splice path has not been disabled or
//! demoted by a previous `EINVAL`.

use std::os::fd::{BorrowedFd, RawFd};

use log::error;
use nix::errno::Errno;
use nix::fcntl::{fcntl, splice, FcntlArg, OFlag, SpliceFFlags};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::cli::EngineFlags;
use crate::clock::Clock;
use crate::rotation::{self, Tick};
use crate::signals::SignalCoordinator;
use crate::sink::{SinkSpec, SinkState};
use crate::status::Status;

/// Matches the original's `SPLICE_SIZE`: a large bounded chunk per transfer,
/// not an attempt to move the whole stream in one call.
const SPLICE_MAX: usize = 2 * 1024 * 1024 * 1024;

/// Whether the fast path applies at all (spec §4.5: "exactly one path-sink
/// exists"). Counting path-sinks rather than sinks in general matters for a
/// configuration like a lone `STDOUT` sink: one sink total, but zero
/// path-sinks, so the splice path must not engage.
pub fn is_eligible(sinks: &[SinkSpec], flags: &EngineFlags) -> bool {
    if flags.no_splice {
        return false;
    }
    sinks.len() == 1 && matches!(sinks[0], SinkSpec::Path { .. })
}

/// Puts `input_fd` into non-blocking mode. `false` means the attempt failed
/// and the caller should silently run the slow path instead, matching the
/// original's setup-time fallback (no log line, no fatal error).
pub fn enable(input_fd: RawFd) -> bool {
    let Ok(raw) = fcntl(input_fd, FcntlArg::F_GETFL) else {
        return false;
    };
    let current = OFlag::from_bits_truncate(raw);
    if current.contains(OFlag::O_NONBLOCK) {
        return true;
    }
    fcntl(input_fd, FcntlArg::F_SETFL(current | OFlag::O_NONBLOCK)).is_ok()
}

pub enum FastPathOutcome {
    Done(Status),
    /// The kernel refused zero-copy for this descriptor pair. The input
    /// descriptor has been restored to blocking/append mode; the caller
    /// should fall through to the slow path on the next outer iteration.
    Demoted,
}

/// Runs the splice copy loop for the single eligible sink until end of
/// input, a fatal error, an interruption, or a demotion to the slow path.
pub fn run(
    input_fd: RawFd,
    sink: &mut SinkState,
    flags: &EngineFlags,
    signals: &SignalCoordinator,
    clock: &dyn Clock,
) -> FastPathOutcome {
    'outer: loop {
        if signals.take_rotate_request() {
            if let Err(status) = force_rotate_tick(sink, flags, clock) {
                return FastPathOutcome::Done(status);
            }
        }

        if let Err(status) = wait_readable(input_fd, sink, flags, signals, clock) {
            return FastPathOutcome::Done(status);
        }

        let tick = Tick {
            local_now: clock.now(),
            force_rotate: false,
            splice_mode: true,
        };
        let mut fd = match rotation::current_descriptor(sink, flags, &tick) {
            Ok(Some(fd)) => fd,
            Ok(None) => continue 'outer,
            Err(err) => {
                if !flags.quiet {
                    error!("writing output: {err}");
                }
                return FastPathOutcome::Done(Status::Error);
            }
        };

        loop {
            match splice(input_fd, None, fd, None, SPLICE_MAX, SpliceFFlags::SPLICE_F_NONBLOCK) {
                Ok(0) => return FastPathOutcome::Done(Status::Success),
                Ok(_) => continue 'outer,
                Err(Errno::EINVAL) => {
                    if !flags.quiet {
                        error!("splice failed, retrying slow path.");
                    }
                    restore_blocking_append(input_fd, flags);
                    return FastPathOutcome::Demoted;
                }
                Err(Errno::EINTR) if signals.take_rotate_request() => match force_rotate_tick(sink, flags, clock) {
                    Ok(Some(new_fd)) => fd = new_fd,
                    Ok(None) => continue 'outer,
                    Err(status) => return FastPathOutcome::Done(status),
                },
                Err(Errno::EINTR) => {
                    if !flags.quiet {
                        error!("splice failed, retrying slow path: {}", Errno::EINTR);
                    }
                    return FastPathOutcome::Done(Status::Interrupted);
                }
                Err(e) => {
                    if !flags.quiet {
                        error!("splice failed, retrying slow path: {e}");
                    }
                    return FastPathOutcome::Done(Status::Error);
                }
            }
        }
    }
}

fn wait_readable(
    input_fd: RawFd,
    sink: &mut SinkState,
    flags: &EngineFlags,
    signals: &SignalCoordinator,
    clock: &dyn Clock,
) -> std::result::Result<(), Status> {
    loop {
        let borrowed = unsafe { BorrowedFd::borrow_raw(input_fd) };
        let mut pollfds = [PollFd::new(borrowed, PollFlags::POLLIN)];
        match poll(&mut pollfds, PollTimeout::NONE) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => {
                if signals.take_rotate_request() {
                    force_rotate_tick(sink, flags, clock)?;
                } else {
                    if !flags.quiet {
                        error!("polling input: {}", Errno::EINTR);
                    }
                    return Err(Status::Interrupted);
                }
            }
            Err(e) => {
                if !flags.quiet {
                    error!("polling input: {e}");
                }
                return Err(Status::Error);
            }
        }
    }
}

fn force_rotate_tick(
    sink: &mut SinkState,
    flags: &EngineFlags,
    clock: &dyn Clock,
) -> std::result::Result<Option<RawFd>, Status> {
    let tick = Tick {
        local_now: clock.now(),
        force_rotate: true,
        splice_mode: true,
    };
    rotation::current_descriptor(sink, flags, &tick).map_err(|err| {
        if !flags.quiet {
            error!("writing output: {err}");
        }
        Status::Error
    })
}

fn restore_blocking_append(input_fd: RawFd, flags: &EngineFlags) {
    match fcntl(input_fd, FcntlArg::F_GETFL) {
        Ok(raw) => {
            let current = OFlag::from_bits_truncate(raw);
            let restored = (current & !OFlag::O_NONBLOCK) | OFlag::O_APPEND;
            if let Err(e) = fcntl(input_fd, FcntlArg::F_SETFL(restored)) {
                if !flags.quiet {
                    error!("setting input file descriptor to blocking and appending: {e}");
                }
            }
        }
        Err(e) => {
            if !flags.quiet {
                error!("getting flags of input file descriptor: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::fd::IntoRawFd;

    use chrono::{Local, TimeZone};

    use crate::clock::FrozenClock;
    use crate::rotation;

    fn flags(no_splice: bool) -> EngineFlags {
        EngineFlags {
            quiet: true,
            exit_on_write_error: false,
            no_splice,
        }
    }

    #[test]
    fn is_eligible_requires_exactly_one_path_sink() {
        let inherited = SinkSpec::Inherited { fd: 1, label: "STDOUT" };
        let path = SinkSpec::Path {
            pattern: "x-%M.log".into(),
            link: None,
        };

        // Lone inherited sink: one sink total, but zero path-sinks.
        assert!(!is_eligible(&[inherited.clone()], &flags(false)));
        assert!(is_eligible(&[path.clone()], &flags(false)));
        // Two sinks, one of them a path: still not eligible, since the
        // fast path only ever writes to sinks[0].
        assert!(!is_eligible(&[path.clone(), inherited], &flags(false)));
        assert!(!is_eligible(&[path], &flags(true)));
    }

    #[test]
    fn splices_pipe_input_into_a_path_sink() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("fast-%M.log").to_str().unwrap().to_owned();
        let spec = SinkSpec::Path { pattern, link: None };

        let now = Local.with_ymd_and_hms(2024, 6, 1, 0, 30, 0).unwrap();
        let mut sink = rotation::initialize(&spec, now, true).unwrap();

        let signals = SignalCoordinator::install().unwrap();
        let clock = FrozenClock(now);

        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        let write_fd = write_end.into_raw_fd();
        let input_fd = read_end.into_raw_fd();

        nix::unistd::write(write_fd, b"spliced\n").unwrap();
        nix::unistd::close(write_fd).unwrap();

        assert!(enable(input_fd));
        match run(input_fd, &mut sink, &flags(false), &signals, &clock) {
            FastPathOutcome::Done(status) => assert_eq!(status, Status::Success),
            FastPathOutcome::Demoted => panic!("splice should not demote on a plain pipe-to-file transfer"),
        }

        let mut buf = Vec::new();
        std::fs::File::open(dir.path().join("fast-30.log"))
            .unwrap()
            .read_to_end(&mut buf)
            .unwrap();
        assert_eq!(buf, b"spliced\n");
    }
}
