//! In-memory clock with a controllable rate, for tests and simulation.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{ADJ_FREQ_MAX, ClockControl};
use crate::error::ClockError;
use crate::protocol::ptp::time::{NANOS_PER_SEC, TimeInternal};

#[derive(Debug)]
struct State {
    /// Clock reading at `anchor`.
    base: TimeInternal,
    /// Real instant `base` was taken at; `None` when time only moves by `advance`.
    anchor: Option<Instant>,
    /// Servo-requested rate.
    frequency_ppb: i32,
    /// Intrinsic oscillator error.
    drift_ppb: i64,
    steps: u32,
    adjustments: u32,
    fail_adjust: bool,
}

/// A clock whose reading and rate are fully controlled by the caller.
///
/// A manual clock only moves when [`advance`](Self::advance) is called. A
/// free-running clock follows the monotonic clock, scaled by its drift and
/// the frequency the servo asked for.
#[derive(Debug)]
pub struct SimulatedClock {
    state: Mutex<State>,
}

impl SimulatedClock {
    /// Manual clock reading `start`.
    #[must_use]
    pub fn manual(start: TimeInternal) -> Self {
        Self::with_anchor(start, None)
    }

    /// Free-running clock reading `start` now.
    #[must_use]
    pub fn free_running(start: TimeInternal) -> Self {
        Self::with_anchor(start, Some(Instant::now()))
    }

    fn with_anchor(base: TimeInternal, anchor: Option<Instant>) -> Self {
        Self {
            state: Mutex::new(State {
                base,
                anchor,
                frequency_ppb: 0,
                drift_ppb: 0,
                steps: 0,
                adjustments: 0,
                fail_adjust: false,
            }),
        }
    }

    /// Give the oscillator an intrinsic rate error.
    #[must_use]
    pub fn with_drift_ppb(self, drift_ppb: i64) -> Self {
        self.lock().drift_ppb = drift_ppb;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scaled(elapsed: Duration, rate_ppb: i64) -> TimeInternal {
        let nanos = i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX / 2);
        let error = i128::from(nanos) * i128::from(rate_ppb) / i128::from(NANOS_PER_SEC);
        TimeInternal::from_nanos(nanos)
            + TimeInternal::from_nanos(i64::try_from(error).unwrap_or(0))
    }

    fn settle(state: &mut State) {
        if let Some(anchor) = state.anchor {
            let now = Instant::now();
            let rate = i64::from(state.frequency_ppb) + state.drift_ppb;
            state.base = state.base + Self::scaled(now - anchor, rate);
            state.anchor = Some(now);
        }
    }

    /// Move a manual clock forward by `elapsed` real time.
    pub fn advance(&self, elapsed: Duration) {
        let mut state = self.lock();
        let rate = i64::from(state.frequency_ppb) + state.drift_ppb;
        state.base = state.base + Self::scaled(elapsed, rate);
    }

    /// Frequency last requested by the servo.
    #[must_use]
    pub fn frequency_ppb(&self) -> i32 {
        self.lock().frequency_ppb
    }

    /// Number of steps applied.
    #[must_use]
    pub fn steps(&self) -> u32 {
        self.lock().steps
    }

    /// Number of frequency adjustments applied.
    #[must_use]
    pub fn adjustments(&self) -> u32 {
        self.lock().adjustments
    }

    /// Make every following frequency adjustment fail.
    pub fn fail_adjustments(&self, fail: bool) {
        self.lock().fail_adjust = fail;
    }
}

impl ClockControl for SimulatedClock {
    fn now(&self, utc_offset: i16) -> TimeInternal {
        let mut state = self.lock();
        Self::settle(&mut state);
        state.base + TimeInternal::new(i64::from(utc_offset), 0)
    }

    fn step(&self, time: TimeInternal, utc_offset: i16) -> Result<(), ClockError> {
        let mut state = self.lock();
        Self::settle(&mut state);
        state.base = time - TimeInternal::new(i64::from(utc_offset), 0);
        state.steps += 1;
        Ok(())
    }

    fn adjust_frequency(&self, ppb: i32) -> Result<(), ClockError> {
        let mut state = self.lock();
        if state.fail_adjust {
            return Err(ClockError::PermissionDenied);
        }
        Self::settle(&mut state);
        state.frequency_ppb = ppb.clamp(-ADJ_FREQ_MAX, ADJ_FREQ_MAX);
        state.adjustments += 1;
        Ok(())
    }
}
