//! Helpers for exercising ports without a real network.

#[cfg(feature = "tokio-runtime")]
pub mod network_sim;

#[cfg(feature = "tokio-runtime")]
pub use network_sim::{LinkConditions, MockNetwork, MockTransport};

use crate::protocol::ptp::time::TimeInternal;
use crate::types::config::{PtpConfig, PtpConfigBuilder};

/// A locally administered MAC address ending in `n`.
#[must_use]
pub fn test_mac(n: u8) -> [u8; 6] {
    [0x02, 0x00, 0x5E, 0x10, 0x00, n]
}

/// Builder preset with a short announce interval, suitable for tests that
/// step through elections tick by tick.
#[must_use]
pub fn fast_config() -> PtpConfigBuilder {
    PtpConfig::builder()
        .log_sync_interval(-3)
        .log_announce_interval(-3)
        .log_min_delay_req_interval(-3)
        .log_min_pdelay_req_interval(-3)
        .tick_interval(std::time::Duration::from_millis(125))
}

/// `seconds.nanoseconds` as a [`TimeInternal`].
#[must_use]
pub fn at(seconds: i64, nanoseconds: i64) -> TimeInternal {
    TimeInternal::new(seconds, nanoseconds)
}
