//! One-way delay and offset filters and the PI clock servo.

use super::time::TimeInternal;
use crate::clock::ClockControl;
use crate::error::ClockError;
use crate::types::config::ServoConfig;

/// Raw path delay and offset from one Sync exchange and one delay exchange.
///
/// `t1` master Sync transmit, `t2` slave Sync receive, `t3` slave
/// `Delay_Req` transmit, `t4` master `Delay_Req` receive. Returns
/// `(one_way_delay, offset_from_master)`.
#[must_use]
pub fn compute_delay_and_offset(
    t1: TimeInternal,
    t2: TimeInternal,
    t3: TimeInternal,
    t4: TimeInternal,
) -> (TimeInternal, TimeInternal) {
    let master_to_slave = t2 - t1;
    let slave_to_master = t4 - t3;
    let one_way_delay = (master_to_slave + slave_to_master).halve();
    (one_way_delay, master_to_slave - one_way_delay)
}

/// Peer mean path delay: `((t4 - t1) - (t3 - t2) - correction) / 2`.
///
/// `t1` request transmit, `t2` responder receive, `t3` responder transmit,
/// `t4` response receive.
#[must_use]
pub fn compute_peer_delay(
    t1: TimeInternal,
    t2: TimeInternal,
    t3: TimeInternal,
    t4: TimeInternal,
    correction: TimeInternal,
) -> TimeInternal {
    ((t4 - t1) - (t3 - t2) - correction).halve()
}

/// Low-pass filter on the one-way delay.
///
/// `y += (sample - y) / s_exp`, where `s_exp` ramps from 1 up to
/// `2^stiffness` so the first sample passes through unchanged and the
/// filter stiffens as samples accumulate.
#[derive(Debug, Clone, Default)]
pub struct DelayFilter {
    y: i64,
    s_exp: i64,
    stiffness: u8,
}

impl DelayFilter {
    /// Filter with the given stiffness (power of two).
    #[must_use]
    pub fn new(stiffness: u8) -> Self {
        Self {
            y: 0,
            s_exp: 0,
            stiffness: stiffness.min(30),
        }
    }

    /// Feed a raw delay sample and return the filtered delay.
    ///
    /// A sample of a second or more cannot be filtered: the filter is
    /// cleared and the sample is returned as is.
    pub fn update(&mut self, sample: TimeInternal) -> TimeInternal {
        if sample.seconds != 0 {
            self.reset();
            return sample;
        }
        let limit = 1i64 << self.stiffness;
        if self.s_exp < 1 {
            self.s_exp = 1;
        } else if self.s_exp < limit {
            self.s_exp += 1;
        } else if self.s_exp > limit {
            self.s_exp = limit;
        }
        let nsec = i64::from(sample.nanoseconds);
        // explicit division: truncates toward zero for negative steps
        self.y += (nsec - self.y) / self.s_exp;
        TimeInternal::from_nanos(self.y)
    }

    /// Current output.
    #[must_use]
    pub fn value(&self) -> TimeInternal {
        TimeInternal::from_nanos(self.y)
    }

    /// Forget every sample.
    pub fn reset(&mut self) {
        self.y = 0;
        self.s_exp = 0;
    }
}

/// Two-tap average of the offset from master.
#[derive(Debug, Clone, Default)]
pub struct OffsetFilter {
    previous: Option<i64>,
}

impl OffsetFilter {
    /// Empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw offset and return the filtered offset. Offsets of a
    /// second or more pass through and clear the history.
    pub fn update(&mut self, sample: TimeInternal) -> TimeInternal {
        if sample.seconds != 0 {
            self.previous = None;
            return sample;
        }
        let nsec = i64::from(sample.nanoseconds);
        let previous = self.previous.replace(nsec).unwrap_or(nsec);
        TimeInternal::from_nanos(nsec / 2 + previous / 2)
    }

    /// Forget every sample.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// What the servo did with an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoAction {
    /// Clock was stepped by the offset; filters should be reset.
    Stepped,
    /// Frequency was set to the given ppb.
    Adjusted(i32),
    /// Adjustment is disabled; nothing was touched.
    Skipped,
}

/// PI controller turning offsets into frequency adjustments.
#[derive(Debug, Clone)]
pub struct Servo {
    config: ServoConfig,
    observed_drift: i64,
}

impl Servo {
    /// Create a servo. `ap` and `ai` below 1 are treated as 1.
    #[must_use]
    pub fn new(config: ServoConfig) -> Self {
        Self {
            config,
            observed_drift: 0,
        }
    }

    /// Accumulated integral term, in ppb.
    #[must_use]
    pub fn observed_drift(&self) -> i64 {
        self.observed_drift
    }

    /// Clear the integral term.
    pub fn reset(&mut self) {
        self.observed_drift = 0;
    }

    fn max_ppb(&self, clock: &dyn ClockControl) -> i64 {
        i64::from(self.config.max_frequency_ppb.min(clock.max_frequency_ppb()).max(1))
    }

    /// Drive the clock from the filtered `offset` (local minus master).
    ///
    /// Offsets of a whole second or more step the clock unless stepping is
    /// disabled, in which case the clock slews at the maximum rate.
    ///
    /// # Errors
    ///
    /// Returns the clock's error; the integral term keeps its update so the
    /// next sample retries from the same state. A failed frequency reset
    /// after a successful step is only logged.
    pub fn update(
        &mut self,
        offset: TimeInternal,
        clock: &dyn ClockControl,
        utc_offset: i16,
    ) -> Result<ServoAction, ClockError> {
        if self.config.no_adjust {
            return Ok(ServoAction::Skipped);
        }
        let max = self.max_ppb(clock);

        if offset.seconds != 0 {
            if !self.config.no_reset_clock {
                let now = clock.now(utc_offset);
                clock.step(now - offset, utc_offset)?;
                self.observed_drift = 0;
                if let Err(e) = clock.adjust_frequency(0) {
                    tracing::warn!(error = %e, "Clock stepped but frequency reset failed");
                }
                return Ok(ServoAction::Stepped);
            }
            let adj = if offset.is_negative() { -max } else { max };
            return Self::apply(clock, -adj);
        }

        let ap = i64::from(self.config.ap.max(1));
        let ai = i64::from(self.config.ai.max(1));
        let nsec = i64::from(offset.nanoseconds);

        self.observed_drift = (self.observed_drift + nsec / ai).clamp(-max, max);
        let adj = nsec / ap + self.observed_drift;
        Self::apply(clock, -adj.clamp(-max, max))
    }

    fn apply(clock: &dyn ClockControl, ppb: i64) -> Result<ServoAction, ClockError> {
        let ppb = i32::try_from(ppb).unwrap_or(if ppb < 0 { i32::MIN } else { i32::MAX });
        clock.adjust_frequency(ppb)?;
        Ok(ServoAction::Adjusted(ppb))
    }
}
