//! Tokio UDP multicast transport

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use super::traits::{
    Channel, DEFAULT_PTP_DOMAIN_ADDRESS, Destination, PEER_DELAY_ADDRESS, PTP_EVENT_PORT,
    PTP_GENERAL_PORT, ReceivedFrame, Transport,
};
use crate::error::NetError;

/// Largest datagram accepted
const MAX_PACKET_SIZE: usize = 300;

/// Addresses for a [`UdpTransport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpTransportConfig {
    /// Local interface address used for multicast membership
    pub interface: Ipv4Addr,
    /// Domain multicast group
    pub group: Ipv4Addr,
    /// Event port (default: 319)
    pub event_port: u16,
    /// General port (default: 320)
    pub general_port: u16,
    /// Receive our own multicast
    pub multicast_loop: bool,
}

impl Default for UdpTransportConfig {
    fn default() -> Self {
        Self {
            interface: Ipv4Addr::UNSPECIFIED,
            group: DEFAULT_PTP_DOMAIN_ADDRESS,
            event_port: PTP_EVENT_PORT,
            general_port: PTP_GENERAL_PORT,
            multicast_loop: false,
        }
    }
}

/// PTP over UDP/IPv4 with tokio sockets
///
/// Receive timestamps are left to the caller (software timestamping).
#[derive(Debug)]
pub struct UdpTransport {
    config: UdpTransportConfig,
    event: UdpSocket,
    general: UdpSocket,
}

impl UdpTransport {
    /// Bind the event and general sockets and join the domain and peer
    /// delay groups on both.
    ///
    /// # Errors
    ///
    /// Returns an error if a socket cannot be bound or a group joined.
    pub async fn bind(config: UdpTransportConfig) -> Result<Self, NetError> {
        let event = bind_multicast(&config, config.event_port).await?;
        let general = bind_multicast(&config, config.general_port).await?;
        tracing::info!(
            "PTP transport bound: event={} general={} group={}",
            event.local_addr()?,
            general.local_addr()?,
            config.group
        );
        Ok(Self {
            config,
            event,
            general,
        })
    }

    fn target(&self, destination: Destination) -> Result<(SocketAddr, Channel), NetError> {
        let port_for = |event: bool| {
            if event {
                self.config.event_port
            } else {
                self.config.general_port
            }
        };
        let (ip, event) = match destination {
            Destination::MulticastEvent => (IpAddr::V4(self.config.group), true),
            Destination::MulticastGeneral => (IpAddr::V4(self.config.group), false),
            Destination::MulticastPdelay { event } => (IpAddr::V4(PEER_DELAY_ADDRESS), event),
            Destination::Unicast { address, event } => (address, event),
            Destination::RawLink => {
                return Err(NetError::Io(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "raw Ethernet frames need a link-layer transport",
                )));
            }
        };
        Ok((SocketAddr::new(ip, port_for(event)), destination.channel()))
    }
}

async fn bind_multicast(config: &UdpTransportConfig, port: u16) -> Result<UdpSocket, NetError> {
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).await?;
    for group in [config.group, PEER_DELAY_ADDRESS] {
        socket.join_multicast_v4(group, config.interface)?;
    }
    socket.set_multicast_loop_v4(config.multicast_loop)?;
    socket.set_multicast_ttl_v4(1)?;
    Ok(socket)
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&mut self, buf: &[u8], destination: Destination) -> Result<(), NetError> {
        let (addr, channel) = self.target(destination)?;
        let socket = match channel {
            Channel::Event => &self.event,
            _ => &self.general,
        };
        let sent = socket.send_to(buf, addr).await?;
        if sent != buf.len() {
            tracing::warn!("Short PTP send to {}: {} of {} bytes", addr, sent, buf.len());
        }
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Option<ReceivedFrame>, NetError> {
        let mut event_buf = [0u8; MAX_PACKET_SIZE];
        let mut general_buf = [0u8; MAX_PACKET_SIZE];

        let received = tokio::time::timeout(timeout, async {
            tokio::select! {
                r = self.event.recv_from(&mut event_buf) => {
                    r.map(|(n, src)| (Channel::Event, n, src))
                }
                r = self.general.recv_from(&mut general_buf) => {
                    r.map(|(n, src)| (Channel::General, n, src))
                }
            }
        })
        .await;

        let Ok(result) = received else {
            return Ok(None);
        };
        let (channel, len, src) = result?;
        tracing::trace!("PTP: {} bytes on {:?} from {}", len, channel, src);
        let bytes = match channel {
            Channel::Event => event_buf[..len].to_vec(),
            _ => general_buf[..len].to_vec(),
        };
        Ok(Some(ReceivedFrame {
            channel,
            bytes,
            timestamp: None,
        }))
    }
}
