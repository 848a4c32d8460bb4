//! Clock injection: "time as ambient now" turned into an explicit
//! dependency, generalizing the simulated gateway's (`oflow-broker-sim`)
//! current-instant pointer into a shared abstraction so both live and
//! backtest code read the same trait.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// A source of the current instant. Implementations must be cheap to call
/// repeatedly — this is read on every loop iteration of the position
/// monitor and signal worker.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Reads the OS wall clock. Used by the live engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// An externally-advanced clock for backtest replay. The backtest driver
/// calls [`SteppingClock::set`] as it walks forward through minute bars;
/// every other component reads the same instant through [`Clock::now_utc`].
#[derive(Clone)]
pub struct SteppingClock {
    inner: Arc<Mutex<DateTime<Utc>>>,
}

impl SteppingClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock to `ts`. Panics if `ts` moves backwards — a
    /// backtest driver bug, not a condition callers should recover from.
    pub fn set(&self, ts: DateTime<Utc>) {
        let mut guard = self.inner.lock().expect("stepping clock poisoned");
        assert!(ts >= *guard, "SteppingClock must not move backwards");
        *guard = ts;
    }
}

impl Clock for SteppingClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.inner.lock().expect("stepping clock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stepping_clock_reflects_last_set_value() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 8, 14, 30, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 8, 14, 35, 0).unwrap();
        let clock = SteppingClock::new(t0);
        assert_eq!(clock.now_utc(), t0);
        clock.set(t1);
        assert_eq!(clock.now_utc(), t1);
    }

    #[test]
    #[should_panic(expected = "must not move backwards")]
    fn stepping_clock_rejects_backwards_step() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 8, 14, 35, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 8, 14, 30, 0).unwrap();
        let clock = SteppingClock::new(t0);
        clock.set(t1);
    }
}
