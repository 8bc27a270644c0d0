//! Signed PTP time arithmetic and wire time representations.
//!
//! All internal time math is done on [`TimeInternal`], a signed
//! seconds + nanoseconds pair that always carries a single sign. The
//! wire formats are unsigned seconds with the sign folded into the top
//! bit of the nanoseconds field:
//!
//! - v1: 32-bit seconds + sign-flagged nanoseconds, with a half-epoch
//!   flag extending the range past `i32::MAX` seconds.
//! - v2: the same plus a 16-bit epoch number (the upper 16 bits of the
//!   48-bit seconds field on the wire).
//!
//! The v2 correction field is a signed 64-bit count of nanoseconds
//! scaled by 2^16.

use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::time::Duration;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Folding modulus used by the half-epoch encoding.
const INT_MAX: u32 = i32::MAX as u32;

/// Sign flag in the nanoseconds field of a wire timestamp.
const NEGATIVE_FLAG: u32 = !INT_MAX;

/// Signed time value: `seconds` and `nanoseconds` share a sign.
///
/// After construction through any method here,
/// `-999_999_999 <= nanoseconds <= 999_999_999` and the two fields never
/// carry opposite signs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimeInternal {
    /// Whole seconds.
    pub seconds: i64,
    /// Nanoseconds, same sign as `seconds` (or either is zero).
    pub nanoseconds: i32,
}

impl TimeInternal {
    /// Zero duration.
    pub const ZERO: Self = Self {
        seconds: 0,
        nanoseconds: 0,
    };

    /// Create and normalize a time value from possibly denormal parts.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Remainder of a division by 1e9 always fits in i32"
    )]
    pub fn new(seconds: i64, nanoseconds: i64) -> Self {
        let mut seconds = seconds + nanoseconds / NANOS_PER_SEC;
        let mut nanoseconds = nanoseconds % NANOS_PER_SEC;

        if seconds > 0 && nanoseconds < 0 {
            seconds -= 1;
            nanoseconds += NANOS_PER_SEC;
        } else if seconds < 0 && nanoseconds > 0 {
            seconds += 1;
            nanoseconds -= NANOS_PER_SEC;
        }

        Self {
            seconds,
            nanoseconds: nanoseconds as i32,
        }
    }

    /// Create from a total nanosecond count.
    #[must_use]
    pub fn from_nanos(nanos: i64) -> Self {
        Self::new(0, nanos)
    }

    /// Total nanoseconds, saturating at the `i64` range.
    #[must_use]
    pub fn to_nanos(&self) -> i64 {
        self.seconds
            .saturating_mul(NANOS_PER_SEC)
            .saturating_add(i64::from(self.nanoseconds))
    }

    /// Re-establish the sign/range invariant.
    #[must_use]
    pub fn normalize(self) -> Self {
        Self::new(self.seconds, i64::from(self.nanoseconds))
    }

    /// Whether both fields are zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.seconds == 0 && self.nanoseconds == 0
    }

    /// Whether the value is strictly negative.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.seconds < 0 || self.nanoseconds < 0
    }

    /// Half of this duration, rounding toward zero.
    ///
    /// An odd seconds count hands ±0.5 s to the nanoseconds field.
    #[must_use]
    pub fn halve(self) -> Self {
        let mut nanoseconds = i64::from(self.nanoseconds) / 2;
        let seconds = self.seconds / 2;
        if self.seconds % 2 != 0 {
            if self.seconds > 0 {
                nanoseconds += NANOS_PER_SEC / 2;
            } else {
                nanoseconds -= NANOS_PER_SEC / 2;
            }
        }
        Self::new(seconds, nanoseconds)
    }

    /// Absolute value.
    #[must_use]
    pub fn abs(self) -> Self {
        if self.is_negative() { -self } else { self }
    }

    /// Time interval for a log2-seconds message interval.
    #[must_use]
    pub fn from_log_interval(log_interval: i8) -> Self {
        if log_interval >= 0 {
            Self::new(1i64 << log_interval.min(30), 0)
        } else {
            Self::new(0, NANOS_PER_SEC >> (-i32::from(log_interval)).min(30))
        }
    }

    /// Convert to a `Duration` for waiting; negative values clamp to zero.
    #[must_use]
    pub fn to_duration(&self) -> Duration {
        if self.is_negative() {
            return Duration::ZERO;
        }
        #[allow(
            clippy::cast_sign_loss,
            reason = "Both fields are non-negative after the check above"
        )]
        Duration::new(self.seconds as u64, self.nanoseconds as u32)
    }

    /// Convert a `Duration` (never negative).
    #[must_use]
    pub fn from_duration(d: Duration) -> Self {
        Self::new(
            i64::try_from(d.as_secs()).unwrap_or(i64::MAX / 2),
            i64::from(d.subsec_nanos()),
        )
    }

    /// Encode into the v1 representation.
    #[must_use]
    pub fn to_v1(&self, half_epoch: bool) -> TimeRepresentation {
        let (seconds, nanoseconds) = self.to_unsigned_parts(half_epoch);
        TimeRepresentation {
            seconds,
            nanoseconds,
        }
    }

    /// Encode into the v2 representation.
    #[must_use]
    pub fn to_v2(&self, half_epoch: bool, epoch_number: u16) -> V2TimeRepresentation {
        let (seconds, nanoseconds) = self.to_unsigned_parts(half_epoch);
        V2TimeRepresentation {
            epoch_number,
            seconds,
            nanoseconds,
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "Wire seconds are 32 bits; the half-epoch flag carries the overflow"
    )]
    fn to_unsigned_parts(self, half_epoch: bool) -> (u32, u32) {
        let mut seconds = self.seconds.unsigned_abs() as u32;
        if half_epoch {
            seconds = seconds.wrapping_add(INT_MAX);
        }
        let magnitude = self.nanoseconds.unsigned_abs();
        let nanoseconds = if self.is_negative() {
            magnitude | NEGATIVE_FLAG
        } else {
            magnitude
        };
        (seconds, nanoseconds)
    }

    /// Interpret a v2 scaled-nanosecond correction field.
    ///
    /// Positive values shift right by 16; negative values divide so that
    /// the result truncates toward zero.
    #[must_use]
    pub fn from_correction(correction: i64) -> Self {
        if correction == 0 {
            return Self::ZERO;
        }
        let nanos = if correction > 0 {
            correction >> 16
        } else {
            correction / 65_536
        };
        if nanos.unsigned_abs() < NANOS_PER_SEC.unsigned_abs() {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "Magnitude checked below one second"
            )]
            return Self {
                seconds: 0,
                nanoseconds: nanos as i32,
            };
        }
        Self::from_nanos(nanos)
    }

    /// Encode as a v2 scaled-nanosecond correction field, saturating.
    #[must_use]
    pub fn to_correction(&self) -> i64 {
        self.to_nanos().saturating_mul(65_536)
    }
}

impl Add for TimeInternal {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.seconds + rhs.seconds,
            i64::from(self.nanoseconds) + i64::from(rhs.nanoseconds),
        )
    }
}

impl Sub for TimeInternal {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(
            self.seconds - rhs.seconds,
            i64::from(self.nanoseconds) - i64::from(rhs.nanoseconds),
        )
    }
}

impl Neg for TimeInternal {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            seconds: -self.seconds,
            nanoseconds: -self.nanoseconds,
        }
    }
}

impl fmt::Display for TimeInternal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        write!(
            f,
            "{sign}{}.{:09}",
            self.seconds.unsigned_abs(),
            self.nanoseconds.unsigned_abs()
        )
    }
}

impl From<Duration> for TimeInternal {
    fn from(d: Duration) -> Self {
        Self::from_duration(d)
    }
}

/// v1 wire time: unsigned seconds, sign-flagged nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRepresentation {
    /// Unsigned seconds (folded by the half-epoch flag).
    pub seconds: u32,
    /// Nanosecond magnitude; top bit set means negative.
    pub nanoseconds: u32,
}

impl TimeRepresentation {
    /// Decode to internal time, returning the half-epoch flag alongside.
    #[must_use]
    pub fn to_internal(&self) -> (TimeInternal, bool) {
        let half_epoch = self.seconds / INT_MAX != 0;
        (
            unsigned_parts_to_internal(self.seconds, self.nanoseconds),
            half_epoch,
        )
    }
}

/// v2 wire time: 16-bit epoch + unsigned 32-bit seconds + nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct V2TimeRepresentation {
    /// Epoch number (upper 16 bits of the 48-bit seconds field).
    pub epoch_number: u16,
    /// Lower 32 bits of seconds.
    pub seconds: u32,
    /// Nanosecond magnitude; top bit set means negative.
    pub nanoseconds: u32,
}

impl V2TimeRepresentation {
    /// Decode to internal time. The epoch number is not folded in.
    #[must_use]
    pub fn to_internal(&self) -> TimeInternal {
        unsigned_parts_to_internal(self.seconds, self.nanoseconds)
    }
}

#[allow(
    clippy::cast_possible_wrap,
    reason = "Both values are masked or folded below i32::MAX"
)]
fn unsigned_parts_to_internal(seconds: u32, nanoseconds: u32) -> TimeInternal {
    let folded = i64::from(seconds % INT_MAX);
    let magnitude = (nanoseconds & INT_MAX) as i32;
    if nanoseconds & NEGATIVE_FLAG != 0 {
        TimeInternal {
            seconds: -folded,
            nanoseconds: -magnitude,
        }
    } else {
        TimeInternal {
            seconds: folded,
            nanoseconds: magnitude,
        }
    }
}
