//! The host realtime clock, disciplined through `clock_settime` and
//! `adjtimex`.

use std::io;

use super::{ADJ_FREQ_MAX, ClockControl};
use crate::error::ClockError;
use crate::protocol::ptp::time::TimeInternal;

/// `adjtimex` frequency units are ppm scaled by 2^16; 1 ppb = 65.536 units.
const PPB_TO_SCALED_PPM_NUM: i64 = 65_536;
const PPB_TO_SCALED_PPM_DEN: i64 = 1_000;

/// `CLOCK_REALTIME` of the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    /// Create a handle to the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn os_error() -> ClockError {
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EPERM) => ClockError::PermissionDenied,
            Some(libc::ENOSYS | libc::EOPNOTSUPP) => ClockError::Unsupported,
            _ => ClockError::Os(err),
        }
    }
}

impl ClockControl for SystemClock {
    fn now(&self, utc_offset: i16) -> TimeInternal {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec.
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &raw mut ts) };
        if rc != 0 {
            tracing::warn!("clock_gettime failed: {}", io::Error::last_os_error());
        }
        TimeInternal::new(
            i64::from(ts.tv_sec) + i64::from(utc_offset),
            i64::from(ts.tv_nsec),
        )
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::useless_conversion,
        reason = "time_t and c_long widths differ between targets"
    )]
    fn step(&self, time: TimeInternal, utc_offset: i16) -> Result<(), ClockError> {
        let t = time - TimeInternal::new(i64::from(utc_offset), 0);
        let ts = libc::timespec {
            tv_sec: t.seconds as libc::time_t,
            tv_nsec: libc::c_long::from(t.nanoseconds),
        };
        // SAFETY: `ts` is a valid timespec that outlives the call.
        let rc = unsafe { libc::clock_settime(libc::CLOCK_REALTIME, &raw const ts) };
        if rc != 0 {
            return Err(Self::os_error());
        }
        tracing::info!("Clock stepped to {}", time);
        Ok(())
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "Clamped to ADJ_FREQ_MAX before scaling"
    )]
    fn adjust_frequency(&self, ppb: i32) -> Result<(), ClockError> {
        let ppb = ppb.clamp(-ADJ_FREQ_MAX, ADJ_FREQ_MAX);
        // SAFETY: timex is plain old data; all-zero is a valid value.
        let mut tx: libc::timex = unsafe { std::mem::zeroed() };
        tx.modes = libc::ADJ_FREQUENCY;
        tx.freq = (i64::from(ppb) * PPB_TO_SCALED_PPM_NUM / PPB_TO_SCALED_PPM_DEN) as libc::c_long;
        // SAFETY: `tx` is a valid, writable timex.
        let rc = unsafe { libc::adjtimex(&raw mut tx) };
        if rc < 0 {
            return Err(Self::os_error());
        }
        Ok(())
    }
}
