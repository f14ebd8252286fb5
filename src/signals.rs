//! Signal Coordinator (spec §4.6): installs the rotate-request flag, blocks
//! `SIGPIPE` for the engine's lifetime, and brackets critical sections with
//! `SIGHUP` blocking.
//!
//! Grounded on the level-triggered-flag pattern documented by the
//! `signal_hook::flag` module itself, which is the idiomatic Rust
//! replacement for the original's `volatile bool` set from a bare
//! `signal()` handler.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::sys::signal::{sigprocmask, SigSet, SigmaskHow, Signal};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::low_level::unregister;
use signal_hook::SigId;

use crate::error::{PipelogError, Result};

/// Coalescing rotate-request flag (spec §5: "a single flag, coalescing
/// bursts"). Read with a plain load, matching the spec's "safe under a
/// single handler and a single reader" invariant.
pub struct SignalCoordinator {
    rotate_requested: Arc<AtomicBool>,
    terminate_requested: Arc<AtomicBool>,
    hup_id: SigId,
    int_id: SigId,
    term_id: SigId,
}

impl SignalCoordinator {
    /// Blocks `SIGPIPE` for the process lifetime and installs the `SIGHUP`
    /// rotate flag plus the `SIGINT`/`SIGTERM` termination flag.
    pub fn install() -> Result<Self> {
        block_sigpipe()?;

        let rotate_requested = Arc::new(AtomicBool::new(false));
        let terminate_requested = Arc::new(AtomicBool::new(false));

        let hup_id = signal_hook::flag::register(SIGHUP, Arc::clone(&rotate_requested))
            .map_err(signal_install_error)?;
        let int_id = signal_hook::flag::register(SIGINT, Arc::clone(&terminate_requested))
            .map_err(signal_install_error)?;
        let term_id = signal_hook::flag::register(SIGTERM, Arc::clone(&terminate_requested))
            .map_err(signal_install_error)?;

        Ok(SignalCoordinator {
            rotate_requested,
            terminate_requested,
            hup_id,
            int_id,
            term_id,
        })
    }

    /// Consumes a pending rotate request, if any. Level-triggered: any number
    /// of `SIGHUP`s delivered since the last call collapse into one `true`.
    pub fn take_rotate_request(&self) -> bool {
        self.rotate_requested.swap(false, Ordering::SeqCst)
    }

    pub fn termination_requested(&self) -> bool {
        self.terminate_requested.load(Ordering::SeqCst)
    }

    /// Blocks `SIGHUP` delivery for the duration of a critical section (spec
    /// §4.6, §5: chunk distribution and reopen/symlink operations).
    pub fn block_rotate(&self) -> Result<SigSet> {
        block_signal(Signal::SIGHUP)
    }

    pub fn unblock_rotate(&self, previous: SigSet) -> Result<()> {
        restore_mask(previous)
    }
}

impl Drop for SignalCoordinator {
    fn drop(&mut self) {
        unregister(self.hup_id);
        unregister(self.int_id);
        unregister(self.term_id);
    }
}

fn block_sigpipe() -> Result<()> {
    block_signal(Signal::SIGPIPE).map(|_| ())
}

fn block_signal(signal: Signal) -> Result<SigSet> {
    let mut set = SigSet::empty();
    set.add(signal);
    let mut old = SigSet::empty();
    sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut old))
        .map_err(|errno| PipelogError::io("blocking signal", None, io::Error::from_raw_os_error(errno as i32)))?;
    Ok(old)
}

fn restore_mask(mask: SigSet) -> Result<()> {
    sigprocmask(SigmaskHow::SIG_SETMASK, Some(&mask), None)
        .map_err(|errno| PipelogError::io("unblocking signal", None, io::Error::from_raw_os_error(errno as i32)))
}

fn signal_install_error(source: io::Error) -> PipelogError {
    PipelogError::io("installing signal handler", None, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn coalesces_bursts() {
        let coordinator = SignalCoordinator::install().unwrap();

        unsafe {
            nix::libc::raise(SIGHUP);
            nix::libc::raise(SIGHUP);
            nix::libc::raise(SIGHUP);
        }
        thread::sleep(Duration::from_millis(20));

        assert!(coordinator.take_rotate_request());
        assert!(!coordinator.take_rotate_request(), "second read must be empty");
    }
}
