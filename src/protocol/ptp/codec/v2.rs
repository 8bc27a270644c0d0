//! IEEE 1588-2008 (v2) message layout.

use bytes::Bytes;

use super::cursor::{Reader, Writer};
use super::CodecOptions;
use crate::error::WireError;
use crate::protocol::ptp::dataset::{ClockDataset, ClockIdentity, ClockQuality};
use crate::protocol::ptp::management::{
    ManagementAction, ManagementErrorId, ManagementId, ManagementMessage, ManagementPayload,
};
use crate::protocol::ptp::message::{
    AnnounceBody, Flags, Header, Message, MessageBody, MessageType,
};

/// v2 header length.
pub const HEADER_LENGTH: usize = 34;
/// Sync, `Delay_Req` and `Follow_Up` length.
pub const SYNC_PACKET_LENGTH: usize = 44;
/// `Delay_Resp` and all peer delay messages.
pub const DELAY_RESP_PACKET_LENGTH: usize = 54;
/// Announce length.
pub const ANNOUNCE_PACKET_LENGTH: usize = 64;
/// Management header before the TLV.
pub const MANAGEMENT_HEADER_LENGTH: usize = 48;
/// Signaling header before the TLVs.
pub const SIGNALING_HEADER_LENGTH: usize = 44;

/// TLV type for a management payload.
pub const TLV_MANAGEMENT: u16 = 0x0001;
/// TLV type for a management error status.
pub const TLV_MANAGEMENT_ERROR_STATUS: u16 = 0x0002;

const FLAG_LEAP61: u16 = 0x0001;
const FLAG_LEAP59: u16 = 0x0002;
const FLAG_UTC_OFFSET_VALID: u16 = 0x0004;
const FLAG_PTP_TIMESCALE: u16 = 0x0008;
const FLAG_TIME_TRACEABLE: u16 = 0x0010;
const FLAG_FREQUENCY_TRACEABLE: u16 = 0x0020;
const FLAG_TWO_STEP: u16 = 0x0200;
const FLAG_UNICAST: u16 = 0x0400;

/// Minimum length of a message of the given type.
#[must_use]
pub fn min_length(message_type: MessageType) -> usize {
    match message_type {
        MessageType::Sync | MessageType::DelayReq | MessageType::FollowUp => SYNC_PACKET_LENGTH,
        MessageType::DelayResp
        | MessageType::PdelayReq
        | MessageType::PdelayResp
        | MessageType::PdelayRespFollowUp => DELAY_RESP_PACKET_LENGTH,
        MessageType::Announce => ANNOUNCE_PACKET_LENGTH,
        MessageType::Management => MANAGEMENT_HEADER_LENGTH,
        MessageType::Signaling => SIGNALING_HEADER_LENGTH,
    }
}

fn flags_to_bits(flags: &Flags) -> u16 {
    [
        (flags.leap61, FLAG_LEAP61),
        (flags.leap59, FLAG_LEAP59),
        (flags.utc_offset_valid, FLAG_UTC_OFFSET_VALID),
        (flags.ptp_timescale, FLAG_PTP_TIMESCALE),
        (flags.time_traceable, FLAG_TIME_TRACEABLE),
        (flags.frequency_traceable, FLAG_FREQUENCY_TRACEABLE),
        (flags.two_step, FLAG_TWO_STEP),
        (flags.unicast, FLAG_UNICAST),
    ]
    .iter()
    .filter(|(set, _)| *set)
    .fold(0, |bits, (_, bit)| bits | bit)
}

fn flags_from_bits(bits: u16) -> Flags {
    Flags {
        two_step: bits & FLAG_TWO_STEP != 0,
        leap61: bits & FLAG_LEAP61 != 0,
        leap59: bits & FLAG_LEAP59 != 0,
        utc_offset_valid: bits & FLAG_UTC_OFFSET_VALID != 0,
        ptp_timescale: bits & FLAG_PTP_TIMESCALE != 0,
        time_traceable: bits & FLAG_TIME_TRACEABLE != 0,
        frequency_traceable: bits & FLAG_FREQUENCY_TRACEABLE != 0,
        unicast: bits & FLAG_UNICAST != 0,
        boundary_clock: false,
    }
}

/// Encode a message in the v2 layout.
pub fn encode(msg: &Message, options: &CodecOptions) -> Result<Vec<u8>, WireError> {
    let header = &msg.header;
    let mut w = Writer::with_capacity(min_length(header.message_type));

    w.u8(((options.transport_specific & 0x0F) << 4) | (header.message_type as u8));
    w.u8(2);
    w.u16(0); // patched below
    w.u8(header.domain_number);
    w.u8(0);
    w.u16(flags_to_bits(&header.flags));
    w.i64(header.correction);
    w.zeros(4);
    w.port_identity(&header.source_port_identity);
    w.u16(header.sequence_id);
    w.u8(header.message_type.control_field());
    w.i8(header.log_message_interval);

    let half_epoch = options.half_epoch;
    let epoch = options.epoch_number;
    match &msg.body {
        MessageBody::Sync {
            origin_timestamp, ..
        }
        | MessageBody::DelayReq {
            origin_timestamp, ..
        } => w.v2_time(origin_timestamp, half_epoch, epoch),
        MessageBody::FollowUp {
            precise_origin_timestamp,
            ..
        } => w.v2_time(precise_origin_timestamp, half_epoch, epoch),
        MessageBody::DelayResp {
            receive_timestamp,
            requesting_port_identity,
            ..
        } => {
            w.v2_time(receive_timestamp, half_epoch, epoch);
            w.port_identity(requesting_port_identity);
        }
        MessageBody::PdelayReq { origin_timestamp } => {
            w.v2_time(origin_timestamp, half_epoch, epoch);
            w.zeros(10);
        }
        MessageBody::PdelayResp {
            request_receipt_timestamp,
            requesting_port_identity,
        } => {
            w.v2_time(request_receipt_timestamp, half_epoch, epoch);
            w.port_identity(requesting_port_identity);
        }
        MessageBody::PdelayRespFollowUp {
            response_origin_timestamp,
            requesting_port_identity,
        } => {
            w.v2_time(response_origin_timestamp, half_epoch, epoch);
            w.port_identity(requesting_port_identity);
        }
        MessageBody::Announce(announce) => {
            let gm = &announce.grandmaster;
            w.v2_time(&announce.origin_timestamp, half_epoch, epoch);
            w.i16(announce.current_utc_offset);
            w.u8(0);
            w.u8(gm.priority1);
            w.u8(gm.quality.clock_class);
            w.u8(gm.quality.clock_accuracy);
            w.u16(gm.quality.offset_scaled_log_variance);
            w.u8(gm.priority2);
            w.bytes(&gm.identity.0);
            w.u16(gm.steps_removed);
            w.u8(gm.time_source);
        }
        MessageBody::Management(mgmt) => encode_management(&mut w, mgmt),
        MessageBody::Signaling {
            target_port_identity,
            tlvs,
        } => {
            w.port_identity(target_port_identity);
            w.bytes(tlvs);
        }
    }

    let length = u16::try_from(w.len()).map_err(|_| WireError::LengthMismatch {
        declared: usize::from(u16::MAX),
        actual: w.len(),
    })?;
    w.patch_u16(2, length);
    Ok(w.into_vec())
}

fn encode_management(w: &mut Writer, mgmt: &ManagementMessage) {
    w.port_identity(&mgmt.target_port_identity);
    w.u8(mgmt.starting_boundary_hops);
    w.u8(mgmt.boundary_hops);
    w.u8(mgmt.action as u8 & 0x0F);
    w.u8(0);
    match &mgmt.payload {
        ManagementPayload::Data(data) => {
            let padded = data.len() + data.len() % 2;
            w.u16(TLV_MANAGEMENT);
            w.u16(u16::try_from(2 + padded).unwrap_or(u16::MAX));
            w.u16(mgmt.id.to_v2());
            w.bytes(data);
            w.zeros(padded - data.len());
        }
        ManagementPayload::Error(error) => {
            w.u16(TLV_MANAGEMENT_ERROR_STATUS);
            w.u16(8);
            w.u16(*error as u16);
            w.u16(mgmt.id.to_v2());
            w.zeros(4);
        }
    }
}

/// Decode a v2 message. `data` must start at the PTP header.
pub fn decode(data: &[u8]) -> Result<Message, WireError> {
    let mut r = Reader::new(data);
    let first = r.u8()?;
    let version = r.u8()? & 0x0F;
    if version != 2 {
        return Err(WireError::UnsupportedVersion(version));
    }
    let transport_specific = first >> 4;
    let message_type =
        MessageType::from_nibble(first).ok_or(WireError::UnknownMessageType(first & 0x0F))?;
    let declared = usize::from(r.u16()?);
    if declared > data.len() {
        return Err(WireError::LengthMismatch {
            declared,
            actual: data.len(),
        });
    }
    let minimum = min_length(message_type);
    if declared < minimum {
        return Err(WireError::LengthMismatch {
            declared,
            actual: minimum,
        });
    }
    // Trailing padding past the declared length is ignored.
    let mut r = Reader::new(&data[..declared]);
    r.skip(4)?;
    let domain_number = r.u8()?;
    r.skip(1)?;
    let flags = flags_from_bits(r.u16()?);
    let correction = r.i64()?;
    r.skip(4)?;
    let source_port_identity = r.port_identity()?;
    let sequence_id = r.u16()?;
    r.skip(1)?;
    let log_message_interval = r.i8()?;

    let header = Header {
        message_type,
        version: 2,
        transport_specific,
        domain_number,
        flags,
        correction,
        source_port_identity,
        sequence_id,
        log_message_interval,
    };

    let body = match message_type {
        MessageType::Sync => MessageBody::Sync {
            origin_timestamp: r.v2_time()?,
            v1: None,
        },
        MessageType::DelayReq => MessageBody::DelayReq {
            origin_timestamp: r.v2_time()?,
            v1: None,
        },
        MessageType::FollowUp => MessageBody::FollowUp {
            associated_sequence_id: sequence_id,
            precise_origin_timestamp: r.v2_time()?,
        },
        MessageType::DelayResp => MessageBody::DelayResp {
            receive_timestamp: r.v2_time()?,
            requesting_port_identity: r.port_identity()?,
            requesting_sequence_id: sequence_id,
        },
        MessageType::PdelayReq => MessageBody::PdelayReq {
            origin_timestamp: r.v2_time()?,
        },
        MessageType::PdelayResp => MessageBody::PdelayResp {
            request_receipt_timestamp: r.v2_time()?,
            requesting_port_identity: r.port_identity()?,
        },
        MessageType::PdelayRespFollowUp => MessageBody::PdelayRespFollowUp {
            response_origin_timestamp: r.v2_time()?,
            requesting_port_identity: r.port_identity()?,
        },
        MessageType::Announce => {
            let origin_timestamp = r.v2_time()?;
            let current_utc_offset = r.i16()?;
            r.skip(1)?;
            let priority1 = r.u8()?;
            let quality = ClockQuality {
                clock_class: r.u8()?,
                clock_accuracy: r.u8()?,
                offset_scaled_log_variance: r.u16()?,
            };
            let priority2 = r.u8()?;
            let identity = ClockIdentity(r.array()?);
            let steps_removed = r.u16()?;
            let time_source = r.u8()?;
            MessageBody::Announce(AnnounceBody {
                origin_timestamp,
                current_utc_offset,
                grandmaster: ClockDataset {
                    priority1,
                    quality,
                    priority2,
                    identity,
                    steps_removed,
                    time_source,
                },
            })
        }
        MessageType::Management => MessageBody::Management(decode_management(&mut r)?),
        MessageType::Signaling => MessageBody::Signaling {
            target_port_identity: r.port_identity()?,
            tlvs: Bytes::copy_from_slice(r.take(r.remaining())?),
        },
    };

    Ok(Message { header, body })
}

fn decode_management(r: &mut Reader<'_>) -> Result<ManagementMessage, WireError> {
    let target_port_identity = r.port_identity()?;
    let starting_boundary_hops = r.u8()?;
    let boundary_hops = r.u8()?;
    let action = ManagementAction::from_nibble(r.u8()?)
        .ok_or(WireError::InvalidField("management action"))?;
    r.skip(1)?;

    let tlv_type = r.u16()?;
    let tlv_length = usize::from(r.u16()?);
    if tlv_length > r.remaining() {
        return Err(WireError::LengthMismatch {
            declared: tlv_length,
            actual: r.remaining(),
        });
    }
    let mut tlv = Reader::new(r.take(tlv_length)?);
    let (id, payload) = match tlv_type {
        TLV_MANAGEMENT => {
            let id = ManagementId::from_v2(tlv.u16()?);
            let data = Bytes::copy_from_slice(tlv.take(tlv.remaining())?);
            (id, ManagementPayload::Data(data))
        }
        TLV_MANAGEMENT_ERROR_STATUS => {
            let error = ManagementErrorId::from_u16(tlv.u16()?);
            let id = ManagementId::from_v2(tlv.u16()?);
            (id, ManagementPayload::Error(error))
        }
        _ => return Err(WireError::InvalidField("management TLV type")),
    };

    Ok(ManagementMessage {
        target_port_identity,
        starting_boundary_hops,
        boundary_hops,
        action,
        id,
        payload,
    })
}
