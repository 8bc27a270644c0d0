//! 802.1AS raw Ethernet framing (no IP/UDP).

use super::cursor::{Reader, Writer};
use crate::error::WireError;

/// PTP ethertype.
pub const PTP_ETHERTYPE: u16 = 0x88F7;
/// 802.1AS link-local multicast destination.
pub const PTP_MULTICAST_MAC: [u8; 6] = [0x01, 0x80, 0xC2, 0x00, 0x00, 0x0E];
/// Ethernet II header length.
pub const ETHERNET_HEADER_LENGTH: usize = 14;

/// Prefix `payload` with an Ethernet header addressed to the 802.1AS group.
#[must_use]
pub fn frame(source_mac: [u8; 6], payload: &[u8]) -> Vec<u8> {
    let mut w = Writer::with_capacity(ETHERNET_HEADER_LENGTH + payload.len());
    w.bytes(&PTP_MULTICAST_MAC);
    w.bytes(&source_mac);
    w.u16(PTP_ETHERTYPE);
    w.bytes(payload);
    w.into_vec()
}

/// Strip the Ethernet header, returning the source MAC and the PTP payload.
pub fn unframe(frame: &[u8]) -> Result<([u8; 6], &[u8]), WireError> {
    let mut r = Reader::new(frame);
    r.skip(6)?;
    let source: [u8; 6] = r.array()?;
    let ethertype = r.u16()?;
    if ethertype != PTP_ETHERTYPE {
        return Err(WireError::WrongEthertype(ethertype));
    }
    Ok((source, &frame[ETHERNET_HEADER_LENGTH..]))
}
