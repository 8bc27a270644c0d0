//! Precision Time Protocol (IEEE 1588-2002, IEEE 1588-2008, IEEE 802.1AS).
//!
//! The protocol core is sans-IO. A [`PtpPort`] owns one port's state
//! machine and is driven by three inputs: received frames, hardware
//! transmit timestamps and the shared tick. Everything it wants sent comes
//! back as [`Outbound`] messages.
//!
//! ## Standard Ports
//!
//! - **319**: Event messages (Sync, `Delay_Req`, `Pdelay_*`), timestamped.
//! - **320**: General messages (`Follow_Up`, `Delay_Resp`, Announce, Management).
//!
//! 802.1AS runs over raw Ethernet (ethertype `0x88F7`) instead.
//!
//! ## Clock Synchronization Flow
//!
//! ```text
//! Master                          Slave
//!   |--- Sync (t1) ----------------->|  (slave records t2)
//!   |--- Follow_Up (precise t1) ---->|
//!   |                                |
//!   |<---- Delay_Req (t3) ---------- |
//!   |---- Delay_Resp (t4) --------->|
//!   |                                |
//!   |  delay  = ((t2-t1)+(t4-t3))/2 |
//!   |  offset = (t2-t1) - delay     |
//! ```

pub mod bmc;
pub mod codec;
pub mod dataset;
mod dispatch;
pub mod foreign;
pub mod management;
pub mod message;
pub mod port;
pub mod servo;
pub mod time;
pub mod timer;

#[cfg(test)]
mod tests;

// Re-exports for convenient access.
pub use bmc::Recommendation;
pub use codec::{Codec, CodecOptions};
pub use dataset::{ClockDataset, ClockIdentity, ClockQuality, PortIdentity};
pub use foreign::{ForeignMasterRecord, ForeignMasterTable, ForeignUpdate};
pub use management::{
    ManagementAction, ManagementErrorId, ManagementId, ManagementMessage, ManagementTarget,
};
pub use message::{Flags, Header, Message, MessageBody, MessageType};
pub use port::{MessageCounters, Outbound, PortState, PortStatistics, PortStatus, PtpPort};
pub use servo::{DelayFilter, OffsetFilter, Servo, ServoAction};
pub use time::TimeInternal;
pub use timer::{IntervalTimers, TickCounter, TickSource, TimerId};
