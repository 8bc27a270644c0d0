//! IEEE 1588-2002 (v1) message layout.
//!
//! Fixed 40-byte header followed by a fixed-size body per control code.
//! Sync and `Delay_Req` share the 124-byte layout that also describes the
//! sender's grandmaster, which is what v1 uses instead of Announce.

use super::crc::crc32;
use super::cursor::{Reader, Writer};
use super::CodecOptions;
use crate::error::WireError;
use crate::protocol::ptp::dataset::{ClockIdentity, PortIdentity};
use crate::protocol::ptp::management::{
    ManagementMessage, ManagementPayload, WILDCARD_PORT_IDENTITY,
};
use crate::protocol::ptp::message::{
    Flags, Header, Message, MessageBody, MessageType, V1ClockFields,
};

/// v1 header length.
pub const HEADER_LENGTH: usize = 40;
/// Sync message length.
pub const SYNC_PACKET_LENGTH: usize = 124;
/// `Delay_Req` message length.
pub const DELAY_REQ_PACKET_LENGTH: usize = 124;
/// `Follow_Up` message length.
pub const FOLLOW_UP_PACKET_LENGTH: usize = 52;
/// `Delay_Resp` message length.
pub const DELAY_RESP_PACKET_LENGTH: usize = 60;
/// Management message length.
pub const MANAGEMENT_PACKET_LENGTH: usize = 136;

/// Subdomain names in domain-number order.
pub const SUBDOMAINS: [&str; 4] = ["_DFLT", "_ALT1", "_ALT2", "_ALT3"];

/// Length of the v1 subdomain name field.
pub const SUBDOMAIN_LENGTH: usize = 16;
const COMMUNICATION_ETHERNET: u8 = 1;
const MESSAGE_EVENT: u8 = 1;
const MESSAGE_GENERAL: u8 = 2;

const CONTROL_SYNC: u8 = 0;
const CONTROL_DELAY_REQ: u8 = 1;
const CONTROL_FOLLOW_UP: u8 = 2;
const CONTROL_DELAY_RESP: u8 = 3;
const CONTROL_MANAGEMENT: u8 = 4;

const FLAG_LI_61: u16 = 1 << 0;
const FLAG_LI_59: u16 = 1 << 1;
const FLAG_BOUNDARY_CLOCK: u16 = 1 << 2;
const FLAG_ASSIST: u16 = 1 << 3;

const MANAGEMENT_PARAMETER_SPACE: usize = MANAGEMENT_PACKET_LENGTH - 64;

/// Zero-padded header field for a subdomain name, truncated to 16 bytes.
#[must_use]
pub fn subdomain_field(name: &str) -> [u8; SUBDOMAIN_LENGTH] {
    let mut field = [0u8; SUBDOMAIN_LENGTH];
    let len = name.len().min(SUBDOMAIN_LENGTH);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    field
}

/// Domain number for a v1 subdomain name.
///
/// The four well-known names map to their index. Any other name is hashed
/// with CRC-32 onto one of the alternate domains 1..=3.
#[must_use]
pub fn domain_for_subdomain(name: &str) -> u8 {
    domain_for_field(&subdomain_field(name))
}

fn domain_for_field(field: &[u8; SUBDOMAIN_LENGTH]) -> u8 {
    if let Some(index) = SUBDOMAINS
        .iter()
        .position(|s| subdomain_field(s) == *field)
        .and_then(|i| u8::try_from(i).ok())
    {
        return index;
    }
    match crc32(field) % 3 {
        0 => 1,
        1 => 2,
        _ => 3,
    }
}

/// Fixed message length for a v1 control code.
fn packet_length(message_type: MessageType) -> Result<usize, WireError> {
    match message_type {
        MessageType::Sync => Ok(SYNC_PACKET_LENGTH),
        MessageType::DelayReq => Ok(DELAY_REQ_PACKET_LENGTH),
        MessageType::FollowUp => Ok(FOLLOW_UP_PACKET_LENGTH),
        MessageType::DelayResp => Ok(DELAY_RESP_PACKET_LENGTH),
        MessageType::Management => Ok(MANAGEMENT_PACKET_LENGTH),
        _ => Err(WireError::InvalidField("message type has no v1 encoding")),
    }
}

fn control_for(message_type: MessageType) -> u8 {
    match message_type {
        MessageType::Sync => CONTROL_SYNC,
        MessageType::DelayReq => CONTROL_DELAY_REQ,
        MessageType::FollowUp => CONTROL_FOLLOW_UP,
        MessageType::DelayResp => CONTROL_DELAY_RESP,
        _ => CONTROL_MANAGEMENT,
    }
}

fn type_for_control(control: u8) -> Result<MessageType, WireError> {
    match control {
        CONTROL_SYNC => Ok(MessageType::Sync),
        CONTROL_DELAY_REQ => Ok(MessageType::DelayReq),
        CONTROL_FOLLOW_UP => Ok(MessageType::FollowUp),
        CONTROL_DELAY_RESP => Ok(MessageType::DelayResp),
        CONTROL_MANAGEMENT => Ok(MessageType::Management),
        other => Err(WireError::UnknownMessageType(other)),
    }
}

fn flags_to_bits(flags: &Flags) -> u16 {
    let mut bits = 0;
    if flags.leap61 {
        bits |= FLAG_LI_61;
    }
    if flags.leap59 {
        bits |= FLAG_LI_59;
    }
    if flags.boundary_clock {
        bits |= FLAG_BOUNDARY_CLOCK;
    }
    if flags.two_step {
        bits |= FLAG_ASSIST;
    }
    bits
}

fn flags_from_bits(bits: u16) -> Flags {
    Flags {
        two_step: bits & FLAG_ASSIST != 0,
        leap61: bits & FLAG_LI_61 != 0,
        leap59: bits & FLAG_LI_59 != 0,
        boundary_clock: bits & FLAG_BOUNDARY_CLOCK != 0,
        ..Flags::default()
    }
}

/// Encode a message in the v1 layout.
pub fn encode(msg: &Message, options: &CodecOptions) -> Result<Vec<u8>, WireError> {
    let header = &msg.header;
    let length = packet_length(header.message_type)?;
    let mut w = Writer::with_capacity(length + 4);

    // header
    w.u16(1);
    w.u16(1);
    let name = if domain_for_field(&options.subdomain) == header.domain_number {
        options.subdomain
    } else {
        SUBDOMAINS
            .get(usize::from(header.domain_number))
            .map(|s| subdomain_field(s))
            .ok_or(WireError::InvalidField("domain has no v1 subdomain"))?
    };
    w.bytes(&name);
    w.u8(if header.message_type.is_event() {
        MESSAGE_EVENT
    } else {
        MESSAGE_GENERAL
    });
    w.u8(COMMUNICATION_ETHERNET);
    w.bytes(&header.source_port_identity.clock_identity.to_uuid());
    w.u16(header.source_port_identity.port_number);
    w.u16(header.sequence_id);
    w.u8(control_for(header.message_type));
    w.u8(0);
    w.u16(flags_to_bits(&header.flags));
    w.zeros(4);

    match &msg.body {
        MessageBody::Sync {
            origin_timestamp,
            v1,
        }
        | MessageBody::DelayReq {
            origin_timestamp,
            v1,
        } => {
            let fields = v1.unwrap_or_default();
            w.v1_time(origin_timestamp, options.half_epoch || fields.half_epoch);
            encode_clock_fields(&mut w, &fields);
        }
        MessageBody::FollowUp {
            associated_sequence_id,
            precise_origin_timestamp,
        } => {
            w.zeros(2);
            w.u16(*associated_sequence_id);
            w.v1_time(precise_origin_timestamp, options.half_epoch);
        }
        MessageBody::DelayResp {
            receive_timestamp,
            requesting_port_identity,
            requesting_sequence_id,
        } => {
            w.v1_time(receive_timestamp, options.half_epoch);
            w.u8(0);
            w.u8(COMMUNICATION_ETHERNET);
            w.bytes(&requesting_port_identity.clock_identity.to_uuid());
            w.u16(requesting_port_identity.port_number);
            w.u16(*requesting_sequence_id);
        }
        MessageBody::Management(mgmt) => encode_management(&mut w, mgmt)?,
        _ => return Err(WireError::InvalidField("message body has no v1 encoding")),
    }

    debug_assert_eq!(w.len(), length);
    let mut out = w.into_vec();
    if options.v1_crc_trailer {
        let crc = crc32(&out);
        out.extend_from_slice(&crc.to_be_bytes());
    }
    Ok(out)
}

fn encode_clock_fields(w: &mut Writer, f: &V1ClockFields) {
    w.u16(f.epoch_number);
    w.i16(f.current_utc_offset);
    w.u8(0);
    w.u8(f.grandmaster_communication_technology);
    w.bytes(&f.grandmaster_uuid);
    w.u16(f.grandmaster_port_id);
    w.u16(f.grandmaster_sequence_id);
    w.zeros(3);
    w.u8(f.grandmaster_stratum);
    w.bytes(&f.grandmaster_identifier);
    w.zeros(2);
    w.i16(f.grandmaster_variance);
    w.u8(0);
    w.u8(u8::from(f.grandmaster_preferred));
    w.u8(0);
    w.u8(u8::from(f.grandmaster_is_boundary_clock));
    w.zeros(3);
    w.i8(f.sync_interval);
    w.zeros(2);
    w.i16(f.local_clock_variance);
    w.zeros(2);
    w.u16(f.local_steps_removed);
    w.zeros(3);
    w.u8(f.local_clock_stratum);
    w.bytes(&f.local_clock_identifier);
    w.u8(0);
    w.u8(f.parent_communication_technology);
    w.bytes(&f.parent_uuid);
    w.zeros(2);
    w.u16(f.parent_port_field);
    w.zeros(2);
    w.i16(f.estimated_master_variance);
    w.i32(f.estimated_master_drift);
    w.zeros(3);
    w.u8(u8::from(f.utc_reasonable));
}

fn encode_management(w: &mut Writer, mgmt: &ManagementMessage) -> Result<(), WireError> {
    let key = mgmt
        .v1_key()
        .ok_or(WireError::InvalidField("management id has no v1 key"))?;
    let data: &[u8] = match &mgmt.payload {
        ManagementPayload::Data(data) => data,
        ManagementPayload::Error(_) => &[],
    };
    if data.len() > MANAGEMENT_PARAMETER_SPACE {
        return Err(WireError::InvalidField("management parameters too long"));
    }
    w.u8(0);
    w.u8(COMMUNICATION_ETHERNET);
    w.bytes(&mgmt.target_port_identity.clock_identity.to_uuid());
    w.u16(mgmt.target_port_identity.port_number);
    w.i16(i16::from(mgmt.starting_boundary_hops));
    w.i16(i16::from(mgmt.boundary_hops));
    w.u8(0);
    w.u8(key);
    w.zeros(2);
    w.u16(u16::try_from(data.len()).unwrap_or(0));
    w.zeros(4);
    w.bytes(data);
    w.zeros(MANAGEMENT_PARAMETER_SPACE - data.len());
    Ok(())
}

/// Decode a v1 message.
pub fn decode(data: &[u8], options: &CodecOptions) -> Result<Message, WireError> {
    let mut r = Reader::new(data);
    let version = r.u16()?;
    if version != 1 {
        return Err(WireError::UnsupportedVersion(
            u8::try_from(version).unwrap_or(u8::MAX),
        ));
    }
    r.skip(2)?;
    let subdomain: [u8; SUBDOMAIN_LENGTH] = r.array()?;
    let domain_number = domain_for_field(&subdomain);
    r.skip(2)?;
    let uuid: [u8; 6] = r.array()?;
    let port_number = r.u16()?;
    let sequence_id = r.u16()?;
    let message_type = type_for_control(r.u8()?)?;
    r.skip(1)?;
    let flags = flags_from_bits(r.u16()?);
    r.skip(4)?;

    let length = packet_length(message_type)?;
    if data.len() < length {
        return Err(WireError::TooShort {
            needed: length,
            have: data.len(),
        });
    }
    if options.v1_crc_trailer {
        let mut trailer = Reader::new(&data[length..]);
        let actual = trailer.u32()?;
        let expected = crc32(&data[..length]);
        if actual != expected {
            return Err(WireError::ChecksumMismatch { expected, actual });
        }
    }

    let header = Header {
        message_type,
        version: 1,
        transport_specific: 0,
        domain_number,
        flags,
        correction: 0,
        source_port_identity: PortIdentity::new(ClockIdentity::from_mac(uuid), port_number),
        sequence_id,
        log_message_interval: 0,
    };

    let body = match message_type {
        MessageType::Sync | MessageType::DelayReq => {
            let (origin_timestamp, half_epoch) = r.v1_time()?;
            let fields = V1ClockFields {
                half_epoch,
                ..decode_clock_fields(&mut r)?
            };
            if message_type == MessageType::Sync {
                MessageBody::Sync {
                    origin_timestamp,
                    v1: Some(fields),
                }
            } else {
                MessageBody::DelayReq {
                    origin_timestamp,
                    v1: Some(fields),
                }
            }
        }
        MessageType::FollowUp => {
            r.skip(2)?;
            let associated_sequence_id = r.u16()?;
            let (precise_origin_timestamp, _) = r.v1_time()?;
            MessageBody::FollowUp {
                associated_sequence_id,
                precise_origin_timestamp,
            }
        }
        MessageType::DelayResp => {
            let (receive_timestamp, _) = r.v1_time()?;
            r.skip(2)?;
            let uuid: [u8; 6] = r.array()?;
            let port_number = r.u16()?;
            MessageBody::DelayResp {
                receive_timestamp,
                requesting_port_identity: PortIdentity::new(
                    ClockIdentity::from_mac(uuid),
                    port_number,
                ),
                requesting_sequence_id: r.u16()?,
            }
        }
        _ => MessageBody::Management(decode_management(&mut r)?),
    };

    let mut header = header;
    if let MessageBody::Sync { v1: Some(f), .. } = &body {
        header.log_message_interval = f.sync_interval;
    }
    Ok(Message { header, body })
}

fn decode_clock_fields(r: &mut Reader<'_>) -> Result<V1ClockFields, WireError> {
    let mut f = V1ClockFields {
        epoch_number: r.u16()?,
        current_utc_offset: r.i16()?,
        ..V1ClockFields::default()
    };
    r.skip(1)?;
    f.grandmaster_communication_technology = r.u8()?;
    f.grandmaster_uuid = r.array()?;
    f.grandmaster_port_id = r.u16()?;
    f.grandmaster_sequence_id = r.u16()?;
    r.skip(3)?;
    f.grandmaster_stratum = r.u8()?;
    f.grandmaster_identifier = r.array()?;
    r.skip(2)?;
    f.grandmaster_variance = r.i16()?;
    r.skip(1)?;
    f.grandmaster_preferred = r.u8()? != 0;
    r.skip(1)?;
    f.grandmaster_is_boundary_clock = r.u8()? != 0;
    r.skip(3)?;
    f.sync_interval = r.i8()?;
    r.skip(2)?;
    f.local_clock_variance = r.i16()?;
    r.skip(2)?;
    f.local_steps_removed = r.u16()?;
    r.skip(3)?;
    f.local_clock_stratum = r.u8()?;
    f.local_clock_identifier = r.array()?;
    r.skip(1)?;
    f.parent_communication_technology = r.u8()?;
    f.parent_uuid = r.array()?;
    r.skip(2)?;
    f.parent_port_field = r.u16()?;
    r.skip(2)?;
    f.estimated_master_variance = r.i16()?;
    f.estimated_master_drift = r.i32()?;
    r.skip(3)?;
    f.utc_reasonable = r.u8()? != 0;
    Ok(f)
}

fn decode_management(r: &mut Reader<'_>) -> Result<ManagementMessage, WireError> {
    r.skip(2)?;
    let uuid: [u8; 6] = r.array()?;
    let port_number = r.u16()?;
    let starting_boundary_hops = r.i16()?;
    let boundary_hops = r.i16()?;
    r.skip(1)?;
    let key = r.u8()?;
    r.skip(2)?;
    let parameter_length = usize::from(r.u16()?);
    r.skip(4)?;
    if parameter_length > MANAGEMENT_PARAMETER_SPACE {
        return Err(WireError::LengthMismatch {
            declared: parameter_length,
            actual: MANAGEMENT_PARAMETER_SPACE,
        });
    }
    let data = r.take(parameter_length)?;
    let target_clock = if uuid == [0xFF; 6] {
        WILDCARD_PORT_IDENTITY.clock_identity
    } else {
        ClockIdentity::from_mac(uuid)
    };
    Ok(ManagementMessage::from_v1_key(
        key,
        PortIdentity::new(target_clock, port_number),
        clamp_hops(starting_boundary_hops),
        clamp_hops(boundary_hops),
        data,
    ))
}

fn clamp_hops(hops: i16) -> u8 {
    u8::try_from(hops.clamp(0, 255)).unwrap_or(u8::MAX)
}
