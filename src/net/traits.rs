//! Network capability consumed by the protocol core

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::NetError;
use crate::protocol::ptp::message::MessageType;
use crate::protocol::ptp::time::TimeInternal;

/// UDP port for event messages
pub const PTP_EVENT_PORT: u16 = 319;

/// UDP port for general messages
pub const PTP_GENERAL_PORT: u16 = 320;

/// Multicast group of the default domain (`_DFLT`)
pub const DEFAULT_PTP_DOMAIN_ADDRESS: Ipv4Addr = Ipv4Addr::new(224, 0, 1, 129);

/// Multicast group of `_ALT1`
pub const ALTERNATE_PTP_DOMAIN1_ADDRESS: Ipv4Addr = Ipv4Addr::new(224, 0, 1, 130);

/// Multicast group of `_ALT2`
pub const ALTERNATE_PTP_DOMAIN2_ADDRESS: Ipv4Addr = Ipv4Addr::new(224, 0, 1, 131);

/// Multicast group of `_ALT3`
pub const ALTERNATE_PTP_DOMAIN3_ADDRESS: Ipv4Addr = Ipv4Addr::new(224, 0, 1, 132);

/// Multicast group for peer delay messages
pub const PEER_DELAY_ADDRESS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 107);

/// Multicast group for a domain number (v1 subdomain index)
#[must_use]
pub fn multicast_group(domain: u8) -> Option<Ipv4Addr> {
    match domain {
        0 => Some(DEFAULT_PTP_DOMAIN_ADDRESS),
        1 => Some(ALTERNATE_PTP_DOMAIN1_ADDRESS),
        2 => Some(ALTERNATE_PTP_DOMAIN2_ADDRESS),
        3 => Some(ALTERNATE_PTP_DOMAIN3_ADDRESS),
        _ => None,
    }
}

/// Multicast group for a v1 subdomain name
#[must_use]
pub fn multicast_group_for_subdomain(name: &str) -> Option<Ipv4Addr> {
    multicast_group(crate::protocol::ptp::codec::v1::domain_for_subdomain(name))
}

/// Receive channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Event port (319)
    Event,
    /// General port (320)
    General,
    /// Raw Ethernet (802.1AS)
    Raw,
}

/// Where an outgoing message goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Domain multicast group, event port
    MulticastEvent,
    /// Domain multicast group, general port
    MulticastGeneral,
    /// Peer delay group
    MulticastPdelay {
        /// Event port if set, general otherwise
        event: bool,
    },
    /// A single host
    Unicast {
        /// Host address
        address: IpAddr,
        /// Event port if set, general otherwise
        event: bool,
    },
    /// 802.1AS link-local multicast frame
    RawLink,
}

impl Destination {
    /// Channel the message leaves on
    #[must_use]
    pub fn channel(&self) -> Channel {
        match self {
            Self::MulticastEvent
            | Self::MulticastPdelay { event: true }
            | Self::Unicast { event: true, .. } => Channel::Event,
            Self::MulticastGeneral
            | Self::MulticastPdelay { event: false }
            | Self::Unicast { event: false, .. } => Channel::General,
            Self::RawLink => Channel::Raw,
        }
    }
}

/// Identifies a transmitted event message whose timestamp is awaited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimestampKey {
    /// Message kind
    pub message_type: MessageType,
    /// Sequence id
    pub sequence_id: u16,
}

/// A received datagram or frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Channel it arrived on
    pub channel: Channel,
    /// Payload (PTP message, or full Ethernet frame on `Raw`)
    pub bytes: Vec<u8>,
    /// Receive timestamp, if the transport takes one
    pub timestamp: Option<TimeInternal>,
}

/// Send and receive PTP messages
#[async_trait]
pub trait Transport: Send {
    /// Send `buf` to `destination`
    async fn send(&mut self, buf: &[u8], destination: Destination) -> Result<(), NetError>;

    /// Wait up to `timeout` for a message on any channel.
    ///
    /// `Ok(None)` means nothing arrived in time.
    async fn recv(&mut self, timeout: Duration) -> Result<Option<ReceivedFrame>, NetError>;

    /// Transmit timestamp of a sent event message, if the hardware took one
    async fn take_tx_timestamp(
        &mut self,
        key: TimestampKey,
    ) -> Result<Option<TimeInternal>, NetError> {
        let _ = key;
        Ok(None)
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&mut self, buf: &[u8], destination: Destination) -> Result<(), NetError> {
        (**self).send(buf, destination).await
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Option<ReceivedFrame>, NetError> {
        (**self).recv(timeout).await
    }

    async fn take_tx_timestamp(
        &mut self,
        key: TimestampKey,
    ) -> Result<Option<TimeInternal>, NetError> {
        (**self).take_tx_timestamp(key).await
    }
}
