// SPDX-License-Identifier: GPL-3.0-only

//! Display refresh pacing for the presentation thread

use std::thread;
use std::time::{Duration, Instant};

use crate::constants::timing::DEFAULT_REFRESH_HZ;

/// Keeps presents at least one refresh interval apart
#[derive(Debug, Clone)]
pub struct VsyncClock {
    interval: Duration,
    last_tick: Option<Instant>,
}

impl VsyncClock {
    /// A zero rate falls back to the default refresh rate
    pub fn new(refresh_hz: u32) -> Self {
        let hz = if refresh_hz == 0 { DEFAULT_REFRESH_HZ } else { refresh_hz };
        Self {
            interval: Duration::from_secs_f64(1.0 / hz as f64),
            last_tick: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left before the next tick may be taken
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_tick {
            Some(last) => (last + self.interval).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Sleep until the next tick and claim it
    pub fn wait_for_next_tick(&mut self) -> Instant {
        let remaining = self.remaining(Instant::now());
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
        let tick = Instant::now();
        self.last_tick = Some(tick);
        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_are_spaced() {
        let mut clock = VsyncClock::new(100);
        let first = clock.wait_for_next_tick();
        let second = clock.wait_for_next_tick();
        assert!(second - first >= Duration::from_millis(10));
    }

    #[test]
    fn test_zero_rate_uses_default() {
        let clock = VsyncClock::new(0);
        assert_eq!(clock.interval(), Duration::from_secs_f64(1.0 / DEFAULT_REFRESH_HZ as f64));
        assert_eq!(clock.remaining(Instant::now()), Duration::ZERO);
    }
}
