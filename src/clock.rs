//! Injectable clock, grounded on the teacher's `CommandInterface` pattern
//! (`command::LocalCommandInterface` / `RemoteCommandInterface`): production
//! code and tests get different implementations of the same trait instead of
//! tests reaching for the wall clock directly.

use chrono::{DateTime, Local};

pub trait Clock {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Test double that always returns the same instant, letting rotation-boundary
/// scenarios (spec §8, scenarios A–E) be driven deterministically.
#[derive(Debug, Clone)]
pub struct FrozenClock(pub DateTime<Local>);

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}
