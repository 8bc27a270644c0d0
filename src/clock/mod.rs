//! Local clock capability
//!
//! The protocol core only reads, steps and slews the clock through
//! [`ClockControl`]. Implementations are expected to return promptly.

mod simulated;
#[cfg(all(feature = "system-clock", target_os = "linux"))]
mod system;

pub use simulated::SimulatedClock;
#[cfg(all(feature = "system-clock", target_os = "linux"))]
pub use system::SystemClock;

use crate::error::ClockError;
use crate::protocol::ptp::time::TimeInternal;

/// Largest frequency adjustment most kernels accept, in ppb.
pub const ADJ_FREQ_MAX: i32 = 512_000;

/// Largest frequency adjustment on MPC831x hardware clocks, in ppb.
pub const ADJ_FREQ_MAX_MPC831X: i32 = 524_288;

/// Read, step and slew the local clock.
pub trait ClockControl: Send + Sync {
    /// Current PTP time: system time plus `utc_offset` seconds.
    fn now(&self, utc_offset: i16) -> TimeInternal;

    /// Set the clock so that [`now`](Self::now) returns `time`.
    ///
    /// # Errors
    ///
    /// Returns an error if the clock cannot be set.
    fn step(&self, time: TimeInternal, utc_offset: i16) -> Result<(), ClockError>;

    /// Run the clock `ppb` parts per billion fast (negative: slow).
    ///
    /// # Errors
    ///
    /// Returns an error if the adjustment is rejected.
    fn adjust_frequency(&self, ppb: i32) -> Result<(), ClockError>;

    /// Largest adjustment this clock accepts.
    fn max_frequency_ppb(&self) -> i32 {
        ADJ_FREQ_MAX
    }
}

impl<T: ClockControl + ?Sized> ClockControl for std::sync::Arc<T> {
    fn now(&self, utc_offset: i16) -> TimeInternal {
        (**self).now(utc_offset)
    }

    fn step(&self, time: TimeInternal, utc_offset: i16) -> Result<(), ClockError> {
        (**self).step(time, utc_offset)
    }

    fn adjust_frequency(&self, ppb: i32) -> Result<(), ClockError> {
        (**self).adjust_frequency(ppb)
    }

    fn max_frequency_ppb(&self) -> i32 {
        (**self).max_frequency_ppb()
    }
}
