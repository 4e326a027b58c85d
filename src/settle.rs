//! Screen settle detection.
//!
//! After a mutating action the screen is polled until two consecutive
//! captures have the same fingerprint. Waiting is best effort: a timeout is
//! reported as `false` and never escalated.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config;
use crate::device::DeviceDriver;
use crate::screen::Fingerprint;

/// Time source for polling loops
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Polls a device until its screen stops changing
pub struct SettleDetector {
    timeout: Duration,
    interval: Duration,
    clock: Box<dyn Clock>,
}

impl SettleDetector {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            clock: Box::new(SystemClock),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Block until two consecutive captures match, or the timeout elapses.
    ///
    /// A failed capture breaks the run of matching fingerprints but does not
    /// end the wait.
    pub fn wait_for_settle(&self, device: &mut dyn DeviceDriver) -> bool {
        let started = self.clock.now();
        let mut previous: Option<Fingerprint> = None;
        let mut polls = 0u32;

        while self.clock.now().duration_since(started) < self.timeout {
            polls += 1;
            match device.screenshot() {
                Ok(screenshot) => {
                    let current = screenshot.fingerprint();
                    if previous == Some(current) {
                        debug!("[settle] screen settled after {} polls ({})", polls, current.short());
                        return true;
                    }
                    previous = Some(current);
                }
                Err(e) => {
                    warn!("[settle] capture failed on poll {}: {}", polls, e);
                    previous = None;
                }
            }
            self.clock.sleep(self.interval);
        }

        warn!(
            "[settle] SettleTimeout: screen still changing after {:?} ({} polls)",
            self.timeout, polls
        );
        false
    }
}

impl Default for SettleDetector {
    fn default() -> Self {
        let timing = &config::get().timing;
        Self::new(timing.settle_timeout(), timing.settle_interval())
    }
}

impl std::fmt::Debug for SettleDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettleDetector")
            .field("timeout", &self.timeout)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
