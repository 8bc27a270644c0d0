//! Management messages: decode a key, dispatch it to a getter or setter,
//! and build the response.
//!
//! Requests are answered against a [`ManagementTarget`], which the port
//! implements. Dataset payloads use the IEEE 1588-2008 layouts for both
//! wire versions.

use bytes::Bytes;

use super::codec::cursor::{Reader, Writer};
use super::dataset::{ClockDataset, ClockIdentity, ClockQuality, PortIdentity};
use super::time::TimeInternal;

/// Management action field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ManagementAction {
    /// Read a value.
    Get = 0,
    /// Write a value.
    Set = 1,
    /// Answer to GET or SET.
    Response = 2,
    /// Perform an action.
    Command = 3,
    /// Answer to COMMAND.
    Acknowledge = 4,
}

impl ManagementAction {
    /// Parse from the low nibble.
    #[must_use]
    pub fn from_nibble(value: u8) -> Option<Self> {
        match value & 0x0F {
            0 => Some(Self::Get),
            1 => Some(Self::Set),
            2 => Some(Self::Response),
            3 => Some(Self::Command),
            4 => Some(Self::Acknowledge),
            _ => None,
        }
    }
}

/// Management error status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ManagementErrorId {
    /// Response would not fit in a message.
    ResponseTooBig = 0x0001,
    /// Id is not recognized.
    NoSuchId = 0x0002,
    /// Payload length is wrong for the id.
    WrongLength = 0x0003,
    /// Payload value is out of range.
    WrongValue = 0x0004,
    /// Id is read-only.
    NotSetable = 0x0005,
    /// Id is recognized but not supported by this clock.
    NotSupported = 0x0006,
    /// Anything else.
    GeneralError = 0xFFFE,
}

impl ManagementErrorId {
    /// Parse an error code; unknown codes map to [`Self::GeneralError`].
    #[must_use]
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0001 => Self::ResponseTooBig,
            0x0002 => Self::NoSuchId,
            0x0003 => Self::WrongLength,
            0x0004 => Self::WrongValue,
            0x0005 => Self::NotSetable,
            0x0006 => Self::NotSupported,
            _ => Self::GeneralError,
        }
    }
}

/// Managed parameter, covering v2 management ids and v1 management keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagementId {
    /// No-op.
    Null,
    /// Clock description.
    ClockDescription,
    /// Default dataset.
    DefaultDataSet,
    /// Current dataset.
    CurrentDataSet,
    /// Parent dataset.
    ParentDataSet,
    /// Time properties dataset (v1: global time dataset).
    TimePropertiesDataSet,
    /// Port dataset.
    PortDataSet,
    /// Priority 1.
    Priority1,
    /// Priority 2.
    Priority2,
    /// Domain number.
    Domain,
    /// Slave-only flag.
    SlaveOnly,
    /// Log announce interval.
    LogAnnounceInterval,
    /// Announce receipt timeout.
    AnnounceReceiptTimeout,
    /// Log sync interval.
    LogSyncInterval,
    /// Enable the port.
    EnablePort,
    /// Disable the port.
    DisablePort,
    /// Reinitialize the clock.
    InitializeClock,
    /// Force the port into FAULTY.
    GotoFaultyState,
    /// Unrecognized id.
    Unknown(u16),
}

/// Implementation-specific v2 id for [`ManagementId::GotoFaultyState`].
const V2_GOTO_FAULTY_STATE: u16 = 0xC000;

impl ManagementId {
    /// Parse a v2 management id.
    #[must_use]
    pub fn from_v2(value: u16) -> Self {
        match value {
            0x0000 => Self::Null,
            0x0001 => Self::ClockDescription,
            0x0005 => Self::InitializeClock,
            0x2000 => Self::DefaultDataSet,
            0x2001 => Self::CurrentDataSet,
            0x2002 => Self::ParentDataSet,
            0x2003 => Self::TimePropertiesDataSet,
            0x2004 => Self::PortDataSet,
            0x2005 => Self::Priority1,
            0x2006 => Self::Priority2,
            0x2007 => Self::Domain,
            0x2008 => Self::SlaveOnly,
            0x2009 => Self::LogAnnounceInterval,
            0x200A => Self::AnnounceReceiptTimeout,
            0x200B => Self::LogSyncInterval,
            0x200D => Self::EnablePort,
            0x200E => Self::DisablePort,
            V2_GOTO_FAULTY_STATE => Self::GotoFaultyState,
            other => Self::Unknown(other),
        }
    }

    /// v2 management id.
    #[must_use]
    pub fn to_v2(&self) -> u16 {
        match self {
            Self::Null => 0x0000,
            Self::ClockDescription => 0x0001,
            Self::InitializeClock => 0x0005,
            Self::DefaultDataSet => 0x2000,
            Self::CurrentDataSet => 0x2001,
            Self::ParentDataSet => 0x2002,
            Self::TimePropertiesDataSet => 0x2003,
            Self::PortDataSet => 0x2004,
            Self::Priority1 => 0x2005,
            Self::Priority2 => 0x2006,
            Self::Domain => 0x2007,
            Self::SlaveOnly => 0x2008,
            Self::LogAnnounceInterval => 0x2009,
            Self::AnnounceReceiptTimeout => 0x200A,
            Self::LogSyncInterval => 0x200B,
            Self::EnablePort => 0x200D,
            Self::DisablePort => 0x200E,
            Self::GotoFaultyState => V2_GOTO_FAULTY_STATE,
            Self::Unknown(other) => *other,
        }
    }
}

/// v1 management keys (IEEE 1588-2002 table 38).
mod v1_key {
    pub const NULL: u8 = 0;
    pub const INITIALIZE_CLOCK: u8 = 3;
    pub const GET_DEFAULT_DATA_SET: u8 = 7;
    pub const DEFAULT_DATA_SET: u8 = 8;
    pub const GET_CURRENT_DATA_SET: u8 = 10;
    pub const CURRENT_DATA_SET: u8 = 11;
    pub const GET_PARENT_DATA_SET: u8 = 12;
    pub const PARENT_DATA_SET: u8 = 13;
    pub const GET_PORT_DATA_SET: u8 = 14;
    pub const PORT_DATA_SET: u8 = 15;
    pub const GET_GLOBAL_TIME_DATA_SET: u8 = 16;
    pub const GLOBAL_TIME_DATA_SET: u8 = 17;
    pub const GOTO_FAULTY_STATE: u8 = 19;
    pub const SET_SYNC_INTERVAL: u8 = 22;
    pub const DISABLE_PORT: u8 = 23;
    pub const ENABLE_PORT: u8 = 24;
}

/// Management TLV content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagementPayload {
    /// Dataset or parameter bytes (empty for commands and GET requests).
    Data(Bytes),
    /// Error status in place of data.
    Error(ManagementErrorId),
}

/// Management message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementMessage {
    /// Addressed port; all-ones identity and port 0xFFFF are wildcards.
    pub target_port_identity: PortIdentity,
    /// Boundary hop budget at origin.
    pub starting_boundary_hops: u8,
    /// Remaining boundary hops.
    pub boundary_hops: u8,
    /// Action.
    pub action: ManagementAction,
    /// Parameter addressed.
    pub id: ManagementId,
    /// Data or error status.
    pub payload: ManagementPayload,
}

/// Port identity matching every port of every clock.
pub const WILDCARD_PORT_IDENTITY: PortIdentity = PortIdentity {
    clock_identity: ClockIdentity([0xFF; 8]),
    port_number: 0xFFFF,
};

impl ManagementMessage {
    /// GET request addressed to every clock.
    #[must_use]
    pub fn get(id: ManagementId) -> Self {
        Self::request(ManagementAction::Get, id, Bytes::new())
    }

    /// Request with an explicit action and payload, addressed to every clock.
    #[must_use]
    pub fn request(action: ManagementAction, id: ManagementId, data: Bytes) -> Self {
        Self {
            target_port_identity: WILDCARD_PORT_IDENTITY,
            starting_boundary_hops: 0,
            boundary_hops: 0,
            action,
            id,
            payload: ManagementPayload::Data(data),
        }
    }

    /// Payload bytes, empty for error responses.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        match &self.payload {
            ManagementPayload::Data(data) => data,
            ManagementPayload::Error(_) => &[],
        }
    }

    /// Whether the message is addressed to `port`.
    #[must_use]
    pub fn addresses(&self, port: &PortIdentity) -> bool {
        let target = &self.target_port_identity;
        let clock_match = target.clock_identity == WILDCARD_PORT_IDENTITY.clock_identity
            || target.clock_identity == port.clock_identity;
        let port_match = target.port_number == WILDCARD_PORT_IDENTITY.port_number
            || target.port_number == port.port_number;
        clock_match && port_match
    }

    /// v1 key for this action and id, if v1 can express it.
    #[must_use]
    pub fn v1_key(&self) -> Option<u8> {
        use ManagementAction::{Command, Get, Response, Set};
        if matches!(self.payload, ManagementPayload::Error(_)) {
            return None;
        }
        let key = match (self.action, self.id) {
            (Get | Response, ManagementId::Null) => v1_key::NULL,
            (Command, ManagementId::InitializeClock) => v1_key::INITIALIZE_CLOCK,
            (Get, ManagementId::DefaultDataSet) => v1_key::GET_DEFAULT_DATA_SET,
            (Response, ManagementId::DefaultDataSet) => v1_key::DEFAULT_DATA_SET,
            (Get, ManagementId::CurrentDataSet) => v1_key::GET_CURRENT_DATA_SET,
            (Response, ManagementId::CurrentDataSet) => v1_key::CURRENT_DATA_SET,
            (Get, ManagementId::ParentDataSet) => v1_key::GET_PARENT_DATA_SET,
            (Response, ManagementId::ParentDataSet) => v1_key::PARENT_DATA_SET,
            (Get, ManagementId::PortDataSet) => v1_key::GET_PORT_DATA_SET,
            (Response, ManagementId::PortDataSet) => v1_key::PORT_DATA_SET,
            (Get, ManagementId::TimePropertiesDataSet) => v1_key::GET_GLOBAL_TIME_DATA_SET,
            (Response, ManagementId::TimePropertiesDataSet) => v1_key::GLOBAL_TIME_DATA_SET,
            (Command, ManagementId::GotoFaultyState) => v1_key::GOTO_FAULTY_STATE,
            (Set, ManagementId::LogSyncInterval) => v1_key::SET_SYNC_INTERVAL,
            (Command, ManagementId::DisablePort) => v1_key::DISABLE_PORT,
            (Command, ManagementId::EnablePort) => v1_key::ENABLE_PORT,
            _ => return None,
        };
        Some(key)
    }

    /// Build from a v1 management key. Unknown keys become a GET of
    /// [`ManagementId::Unknown`].
    #[must_use]
    pub fn from_v1_key(
        key: u8,
        target_port_identity: PortIdentity,
        starting_boundary_hops: u8,
        boundary_hops: u8,
        data: &[u8],
    ) -> Self {
        use ManagementAction::{Command, Get, Response, Set};
        let (action, id) = match key {
            v1_key::NULL => (Get, ManagementId::Null),
            v1_key::INITIALIZE_CLOCK => (Command, ManagementId::InitializeClock),
            v1_key::GET_DEFAULT_DATA_SET => (Get, ManagementId::DefaultDataSet),
            v1_key::DEFAULT_DATA_SET => (Response, ManagementId::DefaultDataSet),
            v1_key::GET_CURRENT_DATA_SET => (Get, ManagementId::CurrentDataSet),
            v1_key::CURRENT_DATA_SET => (Response, ManagementId::CurrentDataSet),
            v1_key::GET_PARENT_DATA_SET => (Get, ManagementId::ParentDataSet),
            v1_key::PARENT_DATA_SET => (Response, ManagementId::ParentDataSet),
            v1_key::GET_PORT_DATA_SET => (Get, ManagementId::PortDataSet),
            v1_key::PORT_DATA_SET => (Response, ManagementId::PortDataSet),
            v1_key::GET_GLOBAL_TIME_DATA_SET => (Get, ManagementId::TimePropertiesDataSet),
            v1_key::GLOBAL_TIME_DATA_SET => (Response, ManagementId::TimePropertiesDataSet),
            v1_key::GOTO_FAULTY_STATE => (Command, ManagementId::GotoFaultyState),
            v1_key::SET_SYNC_INTERVAL => (Set, ManagementId::LogSyncInterval),
            v1_key::DISABLE_PORT => (Command, ManagementId::DisablePort),
            v1_key::ENABLE_PORT => (Command, ManagementId::EnablePort),
            other => (Get, ManagementId::Unknown(u16::from(other))),
        };
        Self {
            target_port_identity,
            starting_boundary_hops,
            boundary_hops,
            action,
            id,
            payload: ManagementPayload::Data(Bytes::copy_from_slice(data)),
        }
    }
}

/// Everything a GET can read, captured from the port in one go.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "Dataset flags are independent booleans"
)]
pub struct ManagementSnapshot {
    /// This port.
    pub port_identity: PortIdentity,
    /// MAC address of the interface.
    pub physical_address: [u8; 6],
    /// Ports on this clock.
    pub number_ports: u16,
    /// Local clock sends two-step Sync.
    pub two_step: bool,
    /// Never becomes master.
    pub slave_only: bool,
    /// Local advertised dataset.
    pub local: ClockDataset,
    /// Domain number.
    pub domain_number: u8,
    /// Steps removed from the grandmaster.
    pub steps_removed: u16,
    /// Filtered offset from master.
    pub offset_from_master: TimeInternal,
    /// Filtered mean path delay.
    pub mean_path_delay: TimeInternal,
    /// Parent port.
    pub parent_port_identity: PortIdentity,
    /// Grandmaster dataset.
    pub grandmaster: ClockDataset,
    /// Observed drift in ppb.
    pub observed_drift: i32,
    /// TAI - UTC.
    pub current_utc_offset: i16,
    /// UTC offset is valid.
    pub utc_offset_valid: bool,
    /// Leap 61 pending.
    pub leap61: bool,
    /// Leap 59 pending.
    pub leap59: bool,
    /// Timescale is PTP.
    pub ptp_timescale: bool,
    /// Port state enumeration value.
    pub port_state: u8,
    /// Log min delay request interval.
    pub log_min_delay_req_interval: i8,
    /// Peer mean path delay.
    pub peer_mean_path_delay: TimeInternal,
    /// Log announce interval.
    pub log_announce_interval: i8,
    /// Announce receipt timeout.
    pub announce_receipt_timeout: u8,
    /// Log sync interval.
    pub log_sync_interval: i8,
    /// 1 = E2E, 2 = P2P.
    pub delay_mechanism: u8,
    /// Log min pdelay request interval.
    pub log_min_pdelay_req_interval: i8,
    /// PTP version spoken on the wire.
    pub version_number: u8,
}

/// A management write or command, validated and typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementUpdate {
    /// Set priority 1.
    Priority1(u8),
    /// Set priority 2.
    Priority2(u8),
    /// Set domain number.
    Domain(u8),
    /// Set slave-only.
    SlaveOnly(bool),
    /// Set log announce interval.
    LogAnnounceInterval(i8),
    /// Set announce receipt timeout.
    AnnounceReceiptTimeout(u8),
    /// Set log sync interval.
    LogSyncInterval(i8),
    /// Leave DISABLED.
    EnablePort,
    /// Enter DISABLED.
    DisablePort,
    /// Re-run initialization.
    InitializeClock,
    /// Enter FAULTY.
    GotoFaultyState,
}

/// Something management requests can be answered against.
pub trait ManagementTarget {
    /// Current values of every readable parameter.
    fn snapshot(&self) -> ManagementSnapshot;

    /// Apply a write or command.
    fn apply(&mut self, update: ManagementUpdate) -> Result<(), ManagementErrorId>;
}

/// Answer `request`, which came from `requester`.
///
/// Returns `None` for responses, acknowledgements, and requests addressed to
/// another port.
pub fn respond<T: ManagementTarget + ?Sized>(
    target: &mut T,
    request: &ManagementMessage,
    requester: PortIdentity,
) -> Option<ManagementMessage> {
    let own = target.snapshot().port_identity;
    if !request.addresses(&own) {
        return None;
    }

    let (action, payload) = match request.action {
        ManagementAction::Response | ManagementAction::Acknowledge => return None,
        ManagementAction::Get => (
            ManagementAction::Response,
            read(&target.snapshot(), request.id),
        ),
        ManagementAction::Set => {
            let payload = parse_set(request.id, request.data())
                .and_then(|update| target.apply(update))
                .and_then(|()| read(&target.snapshot(), request.id));
            (ManagementAction::Response, payload)
        }
        ManagementAction::Command => {
            let payload = parse_command(request.id)
                .and_then(|update| update.map_or(Ok(()), |u| target.apply(u)))
                .map(|()| Bytes::new());
            (ManagementAction::Acknowledge, payload)
        }
    };

    if let Err(error) = &payload {
        tracing::debug!(id = ?request.id, ?error, "Management request rejected");
    }

    Some(ManagementMessage {
        target_port_identity: requester,
        starting_boundary_hops: request
            .starting_boundary_hops
            .saturating_sub(request.boundary_hops),
        boundary_hops: 0,
        action,
        id: request.id,
        payload: payload.map_or_else(ManagementPayload::Error, ManagementPayload::Data),
    })
}

fn read(s: &ManagementSnapshot, id: ManagementId) -> Result<Bytes, ManagementErrorId> {
    let mut w = Writer::with_capacity(32);
    match id {
        ManagementId::Null => {}
        ManagementId::ClockDescription => write_clock_description(&mut w, s),
        ManagementId::DefaultDataSet => {
            w.u8(u8::from(s.two_step) | (u8::from(s.slave_only) << 1));
            w.u8(0);
            w.u16(s.number_ports);
            w.u8(s.local.priority1);
            write_quality(&mut w, &s.local.quality);
            w.u8(s.local.priority2);
            w.bytes(&s.local.identity.0);
            w.u8(s.domain_number);
            w.u8(0);
        }
        ManagementId::CurrentDataSet => {
            w.u16(s.steps_removed);
            w.i64(s.offset_from_master.to_correction());
            w.i64(s.mean_path_delay.to_correction());
        }
        ManagementId::ParentDataSet => {
            w.port_identity(&s.parent_port_identity);
            w.u8(0);
            w.u8(0);
            w.u16(0xFFFF);
            w.i32(s.observed_drift);
            w.u8(s.grandmaster.priority1);
            write_quality(&mut w, &s.grandmaster.quality);
            w.u8(s.grandmaster.priority2);
            w.bytes(&s.grandmaster.identity.0);
        }
        ManagementId::TimePropertiesDataSet => {
            w.i16(s.current_utc_offset);
            let flags = u8::from(s.leap61)
                | (u8::from(s.leap59) << 1)
                | (u8::from(s.utc_offset_valid) << 2)
                | (u8::from(s.ptp_timescale) << 3);
            w.u8(flags);
            w.u8(s.grandmaster.time_source);
        }
        ManagementId::PortDataSet => {
            w.port_identity(&s.port_identity);
            w.u8(s.port_state);
            w.i8(s.log_min_delay_req_interval);
            w.i64(s.peer_mean_path_delay.to_correction());
            w.i8(s.log_announce_interval);
            w.u8(s.announce_receipt_timeout);
            w.i8(s.log_sync_interval);
            w.u8(s.delay_mechanism);
            w.i8(s.log_min_pdelay_req_interval);
            w.u8(s.version_number & 0x0F);
        }
        ManagementId::Priority1 => pair(&mut w, s.local.priority1),
        ManagementId::Priority2 => pair(&mut w, s.local.priority2),
        ManagementId::Domain => pair(&mut w, s.domain_number),
        ManagementId::SlaveOnly => pair(&mut w, u8::from(s.slave_only)),
        ManagementId::LogAnnounceInterval => pair(&mut w, s.log_announce_interval.to_be_bytes()[0]),
        ManagementId::AnnounceReceiptTimeout => pair(&mut w, s.announce_receipt_timeout),
        ManagementId::LogSyncInterval => pair(&mut w, s.log_sync_interval.to_be_bytes()[0]),
        ManagementId::EnablePort
        | ManagementId::DisablePort
        | ManagementId::InitializeClock
        | ManagementId::GotoFaultyState => return Err(ManagementErrorId::NotSupported),
        ManagementId::Unknown(_) => return Err(ManagementErrorId::NoSuchId),
    }
    Ok(Bytes::from(w.into_vec()))
}

fn pair(w: &mut Writer, value: u8) {
    w.u8(value);
    w.u8(0);
}

fn write_quality(w: &mut Writer, q: &ClockQuality) {
    w.u8(q.clock_class);
    w.u8(q.clock_accuracy);
    w.u16(q.offset_scaled_log_variance);
}

fn write_text(w: &mut Writer, text: &str) {
    let bytes = &text.as_bytes()[..text.len().min(usize::from(u8::MAX))];
    w.u8(u8::try_from(bytes.len()).unwrap_or(u8::MAX));
    w.bytes(bytes);
}

fn write_clock_description(w: &mut Writer, s: &ManagementSnapshot) {
    const ORDINARY_CLOCK: u16 = 0x8000;
    const IEEE_802_3: u16 = 3;
    const DEFAULT_PROFILE: [u8; 6] = [0x00, 0x1B, 0x19, 0x00, 0x01, 0x00];

    w.u16(ORDINARY_CLOCK);
    write_text(w, "IEEE 802.3");
    w.u16(6);
    w.bytes(&s.physical_address);
    w.u16(IEEE_802_3);
    w.u16(6);
    w.bytes(&s.physical_address);
    w.zeros(4);
    write_text(w, concat!(";;", env!("CARGO_PKG_NAME")));
    write_text(w, concat!(";;", env!("CARGO_PKG_VERSION")));
    write_text(w, "");
    w.bytes(&DEFAULT_PROFILE);
    if w.len() % 2 == 1 {
        w.u8(0);
    }
}

fn parse_set(id: ManagementId, data: &[u8]) -> Result<ManagementUpdate, ManagementErrorId> {
    let mut r = Reader::new(data);
    let first = || -> Result<u8, ManagementErrorId> {
        if data.len() < 2 {
            return Err(ManagementErrorId::WrongLength);
        }
        Ok(data[0])
    };
    let update = match id {
        ManagementId::Priority1 => ManagementUpdate::Priority1(first()?),
        ManagementId::Priority2 => ManagementUpdate::Priority2(first()?),
        ManagementId::Domain => ManagementUpdate::Domain(first()?),
        ManagementId::SlaveOnly => ManagementUpdate::SlaveOnly(first()? & 0x01 != 0),
        ManagementId::LogAnnounceInterval => {
            ManagementUpdate::LogAnnounceInterval(i8::from_be_bytes([first()?]))
        }
        ManagementId::AnnounceReceiptTimeout => {
            ManagementUpdate::AnnounceReceiptTimeout(first()?)
        }
        ManagementId::LogSyncInterval => {
            // v1 SET_SYNC_INTERVAL carries a single signed byte
            let value = r.i8().map_err(|_| ManagementErrorId::WrongLength)?;
            ManagementUpdate::LogSyncInterval(value)
        }
        ManagementId::Unknown(_) => return Err(ManagementErrorId::NoSuchId),
        _ => return Err(ManagementErrorId::NotSetable),
    };
    Ok(update)
}

fn parse_command(id: ManagementId) -> Result<Option<ManagementUpdate>, ManagementErrorId> {
    match id {
        ManagementId::Null => Ok(None),
        ManagementId::EnablePort => Ok(Some(ManagementUpdate::EnablePort)),
        ManagementId::DisablePort => Ok(Some(ManagementUpdate::DisablePort)),
        ManagementId::InitializeClock => Ok(Some(ManagementUpdate::InitializeClock)),
        ManagementId::GotoFaultyState => Ok(Some(ManagementUpdate::GotoFaultyState)),
        ManagementId::Unknown(_) => Err(ManagementErrorId::NoSuchId),
        _ => Err(ManagementErrorId::NotSupported),
    }
}
