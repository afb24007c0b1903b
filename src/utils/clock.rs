// SPDX-License-Identifier: GPL-3.0-only

use rustix::time::{clock_gettime, ClockId};
use std::time::Duration;

/// Source of presentation timestamps.
pub trait PresentationClock {
    /// Monotonic time since an unspecified epoch.
    fn now(&self) -> Duration;
}

/// Software presentation clock backed by `CLOCK_MONOTONIC`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl PresentationClock for MonotonicClock {
    fn now(&self) -> Duration {
        let ts = clock_gettime(ClockId::Monotonic);
        Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn monotonic() {
        let clock = MonotonicClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
