//! PTP message model shared by every wire variant.
//!
//! Messages are decoded into a version-independent [`Message`]; the
//! codec picks the v1 or v2 layout from the configured variant. Fields
//! that only exist in one layout are carried in optional sub-structs.

use std::fmt;

use bytes::Bytes;

use super::dataset::{
    ClockDataset, ClockIdentity, ClockQuality, PortIdentity, accuracy_from_v1_identifier,
    time_source, variance_from_v1,
};
use super::management::ManagementMessage;
use super::time::TimeInternal;

/// PTP message kinds (v2 numbering, IEEE 1588-2008 13.3.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Sync (master to slave), carries t1 if one-step.
    Sync = 0x0,
    /// Delay request (slave to master), sent at t3.
    DelayReq = 0x1,
    /// Peer delay request.
    PdelayReq = 0x2,
    /// Peer delay response.
    PdelayResp = 0x3,
    /// Follow-up, carries precise t1.
    FollowUp = 0x8,
    /// Delay response, carries t4.
    DelayResp = 0x9,
    /// Peer delay response follow-up.
    PdelayRespFollowUp = 0xA,
    /// Announce, carries the grandmaster dataset.
    Announce = 0xB,
    /// Signaling.
    Signaling = 0xC,
    /// Management.
    Management = 0xD,
}

impl MessageType {
    /// Parse from the lower 4 bits of a v2 header byte.
    #[must_use]
    pub fn from_nibble(value: u8) -> Option<Self> {
        match value & 0x0F {
            0x0 => Some(Self::Sync),
            0x1 => Some(Self::DelayReq),
            0x2 => Some(Self::PdelayReq),
            0x3 => Some(Self::PdelayResp),
            0x8 => Some(Self::FollowUp),
            0x9 => Some(Self::DelayResp),
            0xA => Some(Self::PdelayRespFollowUp),
            0xB => Some(Self::Announce),
            0xC => Some(Self::Signaling),
            0xD => Some(Self::Management),
            _ => None,
        }
    }

    /// Whether the message needs an accurate transmit/receive timestamp.
    #[must_use]
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            Self::Sync | Self::DelayReq | Self::PdelayReq | Self::PdelayResp
        )
    }

    /// Whether the message belongs to the peer delay mechanism.
    #[must_use]
    pub fn is_peer_delay(&self) -> bool {
        matches!(
            self,
            Self::PdelayReq | Self::PdelayResp | Self::PdelayRespFollowUp
        )
    }

    /// Deprecated v2 control field value.
    #[must_use]
    pub fn control_field(&self) -> u8 {
        match self {
            Self::Sync => 0x00,
            Self::DelayReq => 0x01,
            Self::FollowUp => 0x02,
            Self::DelayResp => 0x03,
            Self::Management => 0x04,
            _ => 0x05,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sync => "Sync",
            Self::DelayReq => "Delay_Req",
            Self::PdelayReq => "Pdelay_Req",
            Self::PdelayResp => "Pdelay_Resp",
            Self::FollowUp => "Follow_Up",
            Self::DelayResp => "Delay_Resp",
            Self::PdelayRespFollowUp => "Pdelay_Resp_Follow_Up",
            Self::Announce => "Announce",
            Self::Signaling => "Signaling",
            Self::Management => "Management",
        };
        f.write_str(name)
    }
}

/// Header flags, independent of the bit layout of either version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "Mirrors the protocol flag field bit for bit"
)]
pub struct Flags {
    /// A `Follow_Up` carries the precise origin timestamp (v1: PTP_ASSIST).
    pub two_step: bool,
    /// Last minute of the day has 61 seconds.
    pub leap61: bool,
    /// Last minute of the day has 59 seconds.
    pub leap59: bool,
    /// `current_utc_offset` is valid.
    pub utc_offset_valid: bool,
    /// Grandmaster timescale is PTP (TAI).
    pub ptp_timescale: bool,
    /// Time is traceable to a primary reference.
    pub time_traceable: bool,
    /// Frequency is traceable to a primary reference.
    pub frequency_traceable: bool,
    /// Sent unicast.
    pub unicast: bool,
    /// v1: sender is a boundary clock.
    pub boundary_clock: bool,
}

impl Flags {
    /// Two-step flag only.
    #[must_use]
    pub fn two_step() -> Self {
        Self {
            two_step: true,
            ..Self::default()
        }
    }
}

/// Common message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Message kind.
    pub message_type: MessageType,
    /// PTP version on the wire (1 or 2).
    pub version: u8,
    /// v2 transport-specific nibble (1 for 802.1AS).
    pub transport_specific: u8,
    /// v2 domain number, or the v1 subdomain index.
    pub domain_number: u8,
    /// Flags.
    pub flags: Flags,
    /// v2 correction in scaled nanoseconds.
    pub correction: i64,
    /// Sender port.
    pub source_port_identity: PortIdentity,
    /// Sequence id.
    pub sequence_id: u16,
    /// Log2 message interval.
    pub log_message_interval: i8,
}

impl Header {
    /// Create a header with protocol defaults.
    #[must_use]
    pub fn new(message_type: MessageType, source: PortIdentity, sequence_id: u16) -> Self {
        Self {
            message_type,
            version: 2,
            transport_specific: 0,
            domain_number: 0,
            flags: Flags::default(),
            correction: 0,
            source_port_identity: source,
            sequence_id,
            log_message_interval: 0x7F,
        }
    }

    /// Correction field as internal time.
    #[must_use]
    pub fn correction_time(&self) -> TimeInternal {
        TimeInternal::from_correction(self.correction)
    }
}

/// v1-only Sync / `Delay_Req` body fields describing the grandmaster and
/// the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "Mirrors the v1 Sync body layout"
)]
pub struct V1ClockFields {
    /// Epoch number.
    pub epoch_number: u16,
    /// UTC offset.
    pub current_utc_offset: i16,
    /// Grandmaster communication technology (1 = Ethernet).
    pub grandmaster_communication_technology: u8,
    /// Grandmaster UUID.
    pub grandmaster_uuid: [u8; 6],
    /// Grandmaster port id.
    pub grandmaster_port_id: u16,
    /// Grandmaster sequence id.
    pub grandmaster_sequence_id: u16,
    /// Grandmaster stratum.
    pub grandmaster_stratum: u8,
    /// Grandmaster 4-character identifier.
    pub grandmaster_identifier: [u8; 4],
    /// Grandmaster variance.
    pub grandmaster_variance: i16,
    /// Grandmaster preferred flag.
    pub grandmaster_preferred: bool,
    /// Grandmaster is a boundary clock.
    pub grandmaster_is_boundary_clock: bool,
    /// Sync interval (log2 seconds).
    pub sync_interval: i8,
    /// Sender's local variance.
    pub local_clock_variance: i16,
    /// Sender's steps removed.
    pub local_steps_removed: u16,
    /// Sender's stratum.
    pub local_clock_stratum: u8,
    /// Sender's identifier.
    pub local_clock_identifier: [u8; 4],
    /// Parent communication technology.
    pub parent_communication_technology: u8,
    /// Parent UUID.
    pub parent_uuid: [u8; 6],
    /// Parent port.
    pub parent_port_field: u16,
    /// Estimated master variance.
    pub estimated_master_variance: i16,
    /// Estimated master drift.
    pub estimated_master_drift: i32,
    /// UTC is reasonable.
    pub utc_reasonable: bool,
    /// The origin timestamp is folded past the half epoch. Carried in the
    /// timestamp's seconds field rather than a field of its own.
    pub half_epoch: bool,
}

impl V1ClockFields {
    /// Map the advertised grandmaster onto a comparable dataset.
    #[must_use]
    pub fn to_dataset(&self) -> ClockDataset {
        ClockDataset {
            priority1: if self.grandmaster_preferred { 127 } else { 128 },
            quality: ClockQuality {
                clock_class: self.grandmaster_stratum,
                clock_accuracy: accuracy_from_v1_identifier(&self.grandmaster_identifier),
                offset_scaled_log_variance: variance_from_v1(self.grandmaster_variance),
            },
            priority2: 128,
            identity: ClockIdentity::from_mac(self.grandmaster_uuid),
            steps_removed: self.local_steps_removed,
            time_source: time_source::OTHER,
        }
    }
}

/// Announce body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnounceBody {
    /// Origin timestamp (approximate).
    pub origin_timestamp: TimeInternal,
    /// TAI - UTC.
    pub current_utc_offset: i16,
    /// Advertised grandmaster.
    pub grandmaster: ClockDataset,
}

/// Message bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Sync.
    Sync {
        /// t1 if one-step, otherwise approximate.
        origin_timestamp: TimeInternal,
        /// v1 grandmaster description.
        v1: Option<V1ClockFields>,
    },
    /// Delay request.
    DelayReq {
        /// Approximate t3.
        origin_timestamp: TimeInternal,
        /// v1 sender description.
        v1: Option<V1ClockFields>,
    },
    /// Follow-up.
    FollowUp {
        /// Sequence id of the Sync this follows (v1 body field; v2 header).
        associated_sequence_id: u16,
        /// Precise t1.
        precise_origin_timestamp: TimeInternal,
    },
    /// Delay response.
    DelayResp {
        /// t4.
        receive_timestamp: TimeInternal,
        /// Port that sent the `Delay_Req`.
        requesting_port_identity: PortIdentity,
        /// Sequence id of the `Delay_Req` (v1 body field; v2 header).
        requesting_sequence_id: u16,
    },
    /// Peer delay request.
    PdelayReq {
        /// Approximate request transmit time.
        origin_timestamp: TimeInternal,
    },
    /// Peer delay response.
    PdelayResp {
        /// When the responder received the request (t2).
        request_receipt_timestamp: TimeInternal,
        /// Port that sent the request.
        requesting_port_identity: PortIdentity,
    },
    /// Peer delay response follow-up.
    PdelayRespFollowUp {
        /// When the responder sent the response (t3).
        response_origin_timestamp: TimeInternal,
        /// Port that sent the request.
        requesting_port_identity: PortIdentity,
    },
    /// Announce.
    Announce(AnnounceBody),
    /// Management.
    Management(ManagementMessage),
    /// Signaling; TLVs are carried opaque.
    Signaling {
        /// Addressed port.
        target_port_identity: PortIdentity,
        /// Raw TLV bytes.
        tlvs: Bytes,
    },
}

/// A decoded PTP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Header.
    pub header: Header,
    /// Typed body.
    pub body: MessageBody,
}

impl Message {
    /// Create a Sync message.
    #[must_use]
    pub fn sync(source: PortIdentity, sequence_id: u16, origin_timestamp: TimeInternal) -> Self {
        Self {
            header: Header::new(MessageType::Sync, source, sequence_id),
            body: MessageBody::Sync {
                origin_timestamp,
                v1: None,
            },
        }
    }

    /// Create a `Follow_Up` message.
    #[must_use]
    pub fn follow_up(
        source: PortIdentity,
        sequence_id: u16,
        precise_origin_timestamp: TimeInternal,
    ) -> Self {
        Self {
            header: Header::new(MessageType::FollowUp, source, sequence_id),
            body: MessageBody::FollowUp {
                associated_sequence_id: sequence_id,
                precise_origin_timestamp,
            },
        }
    }

    /// Create a `Delay_Req` message.
    #[must_use]
    pub fn delay_req(
        source: PortIdentity,
        sequence_id: u16,
        origin_timestamp: TimeInternal,
    ) -> Self {
        Self {
            header: Header::new(MessageType::DelayReq, source, sequence_id),
            body: MessageBody::DelayReq {
                origin_timestamp,
                v1: None,
            },
        }
    }

    /// Create a `Delay_Resp` answering `request`.
    #[must_use]
    pub fn delay_resp(source: PortIdentity, request: &Header, t4: TimeInternal) -> Self {
        let mut header = Header::new(MessageType::DelayResp, source, request.sequence_id);
        header.correction = request.correction;
        Self {
            header,
            body: MessageBody::DelayResp {
                receive_timestamp: t4,
                requesting_port_identity: request.source_port_identity,
                requesting_sequence_id: request.sequence_id,
            },
        }
    }

    /// Create a `Pdelay_Req` message.
    #[must_use]
    pub fn pdelay_req(
        source: PortIdentity,
        sequence_id: u16,
        origin_timestamp: TimeInternal,
    ) -> Self {
        Self {
            header: Header::new(MessageType::PdelayReq, source, sequence_id),
            body: MessageBody::PdelayReq { origin_timestamp },
        }
    }

    /// Create a `Pdelay_Resp` answering `request`.
    #[must_use]
    pub fn pdelay_resp(source: PortIdentity, request: &Header, t2: TimeInternal) -> Self {
        let mut header = Header::new(MessageType::PdelayResp, source, request.sequence_id);
        header.flags.two_step = true;
        header.domain_number = request.domain_number;
        Self {
            header,
            body: MessageBody::PdelayResp {
                request_receipt_timestamp: t2,
                requesting_port_identity: request.source_port_identity,
            },
        }
    }

    /// Create a `Pdelay_Resp_Follow_Up` answering `request`.
    #[must_use]
    pub fn pdelay_resp_follow_up(
        source: PortIdentity,
        request: &Header,
        t3: TimeInternal,
    ) -> Self {
        let mut header =
            Header::new(MessageType::PdelayRespFollowUp, source, request.sequence_id);
        header.domain_number = request.domain_number;
        header.correction = request.correction;
        Self {
            header,
            body: MessageBody::PdelayRespFollowUp {
                response_origin_timestamp: t3,
                requesting_port_identity: request.source_port_identity,
            },
        }
    }

    /// Create an Announce message.
    #[must_use]
    pub fn announce(source: PortIdentity, sequence_id: u16, body: AnnounceBody) -> Self {
        Self {
            header: Header::new(MessageType::Announce, source, sequence_id),
            body: MessageBody::Announce(body),
        }
    }

    /// Message kind.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    /// Sequence id.
    #[must_use]
    pub fn sequence_id(&self) -> u16 {
        self.header.sequence_id
    }
}
