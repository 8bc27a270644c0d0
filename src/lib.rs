//! # ptpd
//!
//! Precision Time Protocol daemon core: IEEE 1588-2002 (v1), IEEE 1588-2008
//! (v2) and IEEE 802.1AS.
//!
//! ## Features
//!
//! - Best master clock election over a bounded foreign master table
//! - End-to-end and peer-to-peer delay measurement
//! - PI servo stepping or slewing the local clock
//! - Software or hardware timestamps
//! - Management GET/SET/COMMAND
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ptpd::clock::SimulatedClock;
//! use ptpd::daemon::Daemon;
//! use ptpd::net::{UdpTransport, UdpTransportConfig};
//! use ptpd::protocol::ptp::TimeInternal;
//! use ptpd::PtpConfig;
//!
//! # async fn example() -> Result<(), ptpd::PtpError> {
//! let config = PtpConfig::builder().domain_number(0).build()?;
//! let clock = Arc::new(SimulatedClock::free_running(TimeInternal::ZERO));
//! let transport = UdpTransport::bind(UdpTransportConfig::default()).await?;
//!
//! let mut daemon = Daemon::new(clock, config.tick_interval);
//! daemon.add_port(config, [0x02, 0, 0, 0, 0, 1], Box::new(transport))?;
//!
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//! daemon.run(shutdown).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! - **Daemon**: `Daemon` - owns the ports and drives them from the network
//! - **Port**: `PtpPort` - sans-IO state machine, one per interface
//! - **Capabilities**: `ClockControl` and `Transport` - the clock and network

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

pub mod clock;
#[cfg(feature = "tokio-runtime")]
pub mod daemon;
pub mod net;
pub mod protocol;

// Re-exports
pub use clock::{ClockControl, SimulatedClock};
#[cfg(feature = "tokio-runtime")]
pub use daemon::{Daemon, MAX_PTP_PORTS};
pub use error::{ClockError, NetError, PtpError, WireError};
pub use protocol::ptp::{PortState, PortStatus, PtpPort, TimeInternal};
pub use types::{DelayMechanism, ProtocolVariant, PtpConfig, ServoConfig, TimestampMode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::{
        ClockControl, DelayMechanism, PortState, ProtocolVariant, PtpConfig, PtpError, PtpPort,
        SimulatedClock, TimeInternal, TimestampMode,
    };
}
