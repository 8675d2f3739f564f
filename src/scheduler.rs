/// Interval timers for the cooperative control loop.
///
/// Every comparison is `now - last >= period` in wrapping `u32`
/// arithmetic, never a comparison of absolute timestamps, so the schedule
/// is unaffected by clock rollover.
use crate::config::TrackerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalTimer {
    pub period_ms: u32,
    last_ms: u32,
}

impl IntervalTimer {
    /// A timer whose first firing is one full period after `start`.
    pub const fn new(period_ms: u32, start: u32) -> Self {
        Self {
            period_ms,
            last_ms: start,
        }
    }

    pub fn elapsed(&self, now: u32) -> u32 {
        now.wrapping_sub(self.last_ms)
    }

    pub fn is_due(&self, now: u32) -> bool {
        self.elapsed(now) >= self.period_ms
    }

    pub fn reset(&mut self, now: u32) {
        self.last_ms = now;
    }

    /// Fire if due, restarting the period at `now`.
    pub fn fire(&mut self, now: u32) -> bool {
        if self.is_due(now) {
            self.reset(now);
            true
        } else {
            false
        }
    }
}

/// Work due on a control loop pass. The expiry sweep runs on every pass
/// and has no flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Due {
    pub scan: bool,
    pub flush: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub scan: IntervalTimer,
    pub flush: IntervalTimer,
}

impl Schedule {
    pub const fn new(config: &TrackerConfig, start: u32) -> Self {
        Self {
            scan: IntervalTimer::new(config.scan_interval_ms, start),
            flush: IntervalTimer::new(config.flush_interval_ms, start),
        }
    }

    /// Check both timers at `now`, restarting the ones that fire.
    pub fn poll(&mut self, now: u32) -> Due {
        Due {
            scan: self.scan.fire(now),
            flush: self.flush.fire(now),
        }
    }
}
