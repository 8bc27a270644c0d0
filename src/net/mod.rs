//! Network abstraction layer
//!
//! The protocol core talks to the network only through [`Transport`].

mod timestamp_ring;
mod traits;

#[cfg(feature = "tokio-runtime")]
mod tokio_impl;


pub use timestamp_ring::TimestampRing;
pub use traits::{
    ALTERNATE_PTP_DOMAIN1_ADDRESS, ALTERNATE_PTP_DOMAIN2_ADDRESS, ALTERNATE_PTP_DOMAIN3_ADDRESS,
    Channel, DEFAULT_PTP_DOMAIN_ADDRESS, Destination, PEER_DELAY_ADDRESS, PTP_EVENT_PORT,
    PTP_GENERAL_PORT, ReceivedFrame, TimestampKey, Transport, multicast_group,
    multicast_group_for_subdomain,
};

#[cfg(feature = "tokio-runtime")]
pub use tokio_impl::{UdpTransport, UdpTransportConfig};
