use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PtpError, Result};
use crate::protocol::ptp::codec::v1::{SUBDOMAIN_LENGTH, SUBDOMAINS};
use crate::protocol::ptp::dataset::variance_from_v1;

/// Wire format, fixed for the lifetime of the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVariant {
    /// IEEE 1588-2002 over UDP
    V1,
    /// IEEE 1588-2008 over UDP
    #[default]
    V2,
    /// IEEE 802.1AS over raw Ethernet
    Ieee8021As,
}

/// Path delay measurement mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayMechanism {
    /// `Delay_Req` / `Delay_Resp` with the master
    #[default]
    EndToEnd,
    /// `Pdelay_*` with the link peer
    PeerToPeer,
}

/// Where event timestamps come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampMode {
    /// Read the clock around send and receive
    #[default]
    Software,
    /// Timestamps supplied by the NIC through the transport
    Hardware,
}

/// Servo tuning (default: ap 10, ai 1000, s 6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    /// Proportional attenuation (values < 1 act as 1)
    pub ap: i32,

    /// Integral attenuation (values < 1 act as 1)
    pub ai: i32,

    /// One-way delay filter stiffness, as a power of two
    pub delay_filter_stiffness: u8,

    /// Largest frequency adjustment handed to the clock, in ppb
    pub max_frequency_ppb: i32,

    /// Never step the clock; slew at the maximum rate instead
    pub no_reset_clock: bool,

    /// Compute offsets but never touch the clock
    pub no_adjust: bool,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            ap: 10,
            ai: 1000,
            delay_filter_stiffness: 6,
            max_frequency_ppb: 512_000,
            no_reset_clock: false,
            no_adjust: false,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(
        clippy::trivially_copy_pass_by_ref,
        reason = "serde's serialize_with signature"
    )]
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Configuration for the PTP daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PtpConfig {
    /// Wire format (default: v2)
    pub variant: ProtocolVariant,

    /// Delay mechanism (default: end-to-end; 802.1AS needs peer-to-peer)
    pub delay_mechanism: DelayMechanism,

    /// Timestamp source (default: software)
    pub timestamping: TimestampMode,

    /// v2 domain number (default: 0)
    pub domain_number: u8,

    /// v1 subdomain name (default: `_DFLT`)
    pub subdomain: String,

    /// Advertised priority 1 (default: 128)
    pub priority1: u8,

    /// Advertised priority 2 (default: 128)
    pub priority2: u8,

    /// Advertised clock class; v1 stratum (default: 248)
    pub clock_class: u8,

    /// Advertised clock accuracy (default: 0xFE, unknown)
    pub clock_accuracy: u8,

    /// Advertised offset scaled log variance (default: 0xFFFF)
    pub clock_variance: u16,

    /// v1 four-character clock identifier (default: `DFLT`)
    pub clock_identifier: String,

    /// Never become master
    pub slave_only: bool,

    /// v1 preferred flag
    pub preferred: bool,

    /// Log2 Sync interval in seconds (default: 0)
    pub log_sync_interval: i8,

    /// Log2 Announce interval in seconds (default: 1)
    pub log_announce_interval: i8,

    /// Log2 minimum `Delay_Req` interval in seconds (default: 0)
    pub log_min_delay_req_interval: i8,

    /// Log2 minimum `Pdelay_Req` interval in seconds (default: 0)
    pub log_min_pdelay_req_interval: i8,

    /// Announce intervals without an Announce before the master is lost (default: 3)
    pub announce_receipt_timeout: u8,

    /// Foreign master table capacity (default: 5)
    pub max_foreign_records: usize,

    /// Messages needed before a foreign master qualifies (default: 2)
    pub foreign_master_threshold: u32,

    /// TAI - UTC in seconds (default: 0)
    pub utc_offset: i16,

    /// v2 epoch number (default: 0)
    pub epoch_number: u16,

    /// Fold seconds past 2^31 into the half-epoch
    pub half_epoch: bool,

    /// Added to every receive timestamp, in nanoseconds
    pub inbound_latency_ns: i64,

    /// Added to every software transmit timestamp, in nanoseconds
    pub outbound_latency_ns: i64,

    /// Servo tuning
    pub servo: ServoConfig,

    /// Shared tick period (default: 125ms)
    #[serde(with = "duration_ms", rename = "tick_interval_ms")]
    pub tick_interval: Duration,

    /// Append and verify a CRC-32 trailer on v1 messages
    pub v1_crc_trailer: bool,

    /// Delay before a FAULTY port reinitializes (default: 8 seconds)
    #[serde(with = "duration_ms", rename = "fault_retry_interval_ms")]
    pub fault_retry_interval: Duration,

    /// Send event and general messages to this address instead of multicast
    pub unicast_address: Option<IpAddr>,
}

impl Default for PtpConfig {
    fn default() -> Self {
        Self {
            variant: ProtocolVariant::V2,
            delay_mechanism: DelayMechanism::EndToEnd,
            timestamping: TimestampMode::Software,
            domain_number: 0,
            subdomain: SUBDOMAINS[0].to_string(),
            priority1: 128,
            priority2: 128,
            clock_class: 248,
            clock_accuracy: 0xFE,
            clock_variance: 0xFFFF,
            clock_identifier: "DFLT".to_string(),
            slave_only: false,
            preferred: false,
            log_sync_interval: 0,
            log_announce_interval: 1,
            log_min_delay_req_interval: 0,
            log_min_pdelay_req_interval: 0,
            announce_receipt_timeout: 3,
            max_foreign_records: 5,
            foreign_master_threshold: 2,
            utc_offset: 0,
            epoch_number: 0,
            half_epoch: false,
            inbound_latency_ns: 0,
            outbound_latency_ns: 0,
            servo: ServoConfig::default(),
            tick_interval: Duration::from_millis(125),
            v1_crc_trailer: false,
            fault_retry_interval: Duration::from_secs(8),
            unicast_address: None,
        }
    }
}

/// v1 default local variance.
const V1_DEFAULT_VARIANCE: i16 = -4000;

impl PtpConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> PtpConfigBuilder {
        PtpConfigBuilder::default()
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PtpError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PtpError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Reject combinations the protocol cannot run with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(PtpError::Config(msg.to_string()));
        match (self.variant, self.delay_mechanism) {
            (ProtocolVariant::V1, DelayMechanism::PeerToPeer) => {
                return fail("v1 has no peer delay mechanism");
            }
            (ProtocolVariant::Ieee8021As, DelayMechanism::EndToEnd) => {
                return fail("802.1AS requires the peer delay mechanism");
            }
            _ => {}
        }
        if self.variant == ProtocolVariant::V1
            && (self.subdomain.is_empty() || self.subdomain.len() > SUBDOMAIN_LENGTH)
        {
            return fail("v1 subdomain must be 1 to 16 bytes");
        }
        if self.clock_identifier.len() > 4 {
            return fail("clock identifier longer than 4 characters");
        }
        if self.max_foreign_records == 0 {
            return fail("foreign master table needs at least one record");
        }
        if self.servo.delay_filter_stiffness > 30 {
            return fail("delay filter stiffness above 30");
        }
        if self.servo.max_frequency_ppb <= 0 {
            return fail("max frequency adjustment must be positive");
        }
        if self.announce_receipt_timeout == 0 {
            return fail("announce receipt timeout must be at least 1");
        }
        if self.tick_interval.is_zero() {
            return fail("tick interval must be non-zero");
        }
        Ok(())
    }

    /// Domain number as carried in headers (v1: subdomain index).
    #[must_use]
    pub fn effective_domain(&self) -> u8 {
        match self.variant {
            ProtocolVariant::V1 => {
                crate::protocol::ptp::codec::v1::domain_for_subdomain(&self.subdomain)
            }
            _ => self.domain_number,
        }
    }

    /// Advertised variance, substituting the v1 default when left unset.
    #[must_use]
    pub fn effective_variance(&self) -> u16 {
        if self.variant == ProtocolVariant::V1 && self.clock_variance == 0xFFFF {
            variance_from_v1(V1_DEFAULT_VARIANCE)
        } else {
            self.clock_variance
        }
    }

    /// v1 clock identifier, zero padded.
    #[must_use]
    pub fn clock_identifier_bytes(&self) -> [u8; 4] {
        let mut out = [0u8; 4];
        let bytes = self.clock_identifier.as_bytes();
        let n = bytes.len().min(4);
        out[..n].copy_from_slice(&bytes[..n]);
        out
    }

    /// Delay mechanism in effect (802.1AS always uses peer delay).
    #[must_use]
    pub fn effective_delay_mechanism(&self) -> DelayMechanism {
        if self.variant == ProtocolVariant::Ieee8021As {
            DelayMechanism::PeerToPeer
        } else {
            self.delay_mechanism
        }
    }
}

/// Builder for `PtpConfig`
#[derive(Debug, Clone, Default)]
pub struct PtpConfigBuilder {
    config: PtpConfig,
}

impl PtpConfigBuilder {
    /// Set the wire format; 802.1AS also selects peer delay
    #[must_use]
    pub fn variant(mut self, variant: ProtocolVariant) -> Self {
        self.config.variant = variant;
        if variant == ProtocolVariant::Ieee8021As {
            self.config.delay_mechanism = DelayMechanism::PeerToPeer;
        }
        self
    }

    /// Set the delay mechanism
    #[must_use]
    pub fn delay_mechanism(mut self, mechanism: DelayMechanism) -> Self {
        self.config.delay_mechanism = mechanism;
        self
    }

    /// Set the timestamp source
    #[must_use]
    pub fn timestamping(mut self, mode: TimestampMode) -> Self {
        self.config.timestamping = mode;
        self
    }

    /// Set the v2 domain number
    #[must_use]
    pub fn domain_number(mut self, domain: u8) -> Self {
        self.config.domain_number = domain;
        self
    }

    /// Set the v1 subdomain
    #[must_use]
    pub fn subdomain(mut self, name: impl Into<String>) -> Self {
        self.config.subdomain = name.into();
        self
    }

    /// Set priority 1
    #[must_use]
    pub fn priority1(mut self, priority: u8) -> Self {
        self.config.priority1 = priority;
        self
    }

    /// Set priority 2
    #[must_use]
    pub fn priority2(mut self, priority: u8) -> Self {
        self.config.priority2 = priority;
        self
    }

    /// Set the clock class
    #[must_use]
    pub fn clock_class(mut self, class: u8) -> Self {
        self.config.clock_class = class;
        self
    }

    /// Set the clock accuracy
    #[must_use]
    pub fn clock_accuracy(mut self, accuracy: u8) -> Self {
        self.config.clock_accuracy = accuracy;
        self
    }

    /// Set the offset scaled log variance
    #[must_use]
    pub fn clock_variance(mut self, variance: u16) -> Self {
        self.config.clock_variance = variance;
        self
    }

    /// Set the v1 clock identifier
    #[must_use]
    pub fn clock_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.config.clock_identifier = identifier.into();
        self
    }

    /// Never become master
    #[must_use]
    pub fn slave_only(mut self, slave_only: bool) -> Self {
        self.config.slave_only = slave_only;
        self
    }

    /// Set the v1 preferred flag
    #[must_use]
    pub fn preferred(mut self, preferred: bool) -> Self {
        self.config.preferred = preferred;
        self
    }

    /// Set the log2 Sync interval
    #[must_use]
    pub fn log_sync_interval(mut self, interval: i8) -> Self {
        self.config.log_sync_interval = interval;
        self
    }

    /// Set the log2 Announce interval
    #[must_use]
    pub fn log_announce_interval(mut self, interval: i8) -> Self {
        self.config.log_announce_interval = interval;
        self
    }

    /// Set the log2 minimum `Delay_Req` interval
    #[must_use]
    pub fn log_min_delay_req_interval(mut self, interval: i8) -> Self {
        self.config.log_min_delay_req_interval = interval;
        self
    }

    /// Set the log2 minimum `Pdelay_Req` interval
    #[must_use]
    pub fn log_min_pdelay_req_interval(mut self, interval: i8) -> Self {
        self.config.log_min_pdelay_req_interval = interval;
        self
    }

    /// Set the announce receipt timeout
    #[must_use]
    pub fn announce_receipt_timeout(mut self, timeout: u8) -> Self {
        self.config.announce_receipt_timeout = timeout;
        self
    }

    /// Set the foreign master table capacity
    #[must_use]
    pub fn max_foreign_records(mut self, capacity: usize) -> Self {
        self.config.max_foreign_records = capacity;
        self
    }

    /// Set the foreign master qualification threshold
    #[must_use]
    pub fn foreign_master_threshold(mut self, threshold: u32) -> Self {
        self.config.foreign_master_threshold = threshold;
        self
    }

    /// Set TAI - UTC
    #[must_use]
    pub fn utc_offset(mut self, offset: i16) -> Self {
        self.config.utc_offset = offset;
        self
    }

    /// Set the epoch number and half-epoch flag
    #[must_use]
    pub fn epoch(mut self, epoch_number: u16, half_epoch: bool) -> Self {
        self.config.epoch_number = epoch_number;
        self.config.half_epoch = half_epoch;
        self
    }

    /// Set the inbound and outbound latency corrections in nanoseconds
    #[must_use]
    pub fn latency_ns(mut self, inbound: i64, outbound: i64) -> Self {
        self.config.inbound_latency_ns = inbound;
        self.config.outbound_latency_ns = outbound;
        self
    }

    /// Set servo tuning
    #[must_use]
    pub fn servo(mut self, servo: ServoConfig) -> Self {
        self.config.servo = servo;
        self
    }

    /// Set the shared tick period
    #[must_use]
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    /// Append a CRC-32 trailer to v1 messages
    #[must_use]
    pub fn v1_crc_trailer(mut self, enable: bool) -> Self {
        self.config.v1_crc_trailer = enable;
        self
    }

    /// Set the FAULTY re-check delay
    #[must_use]
    pub fn fault_retry_interval(mut self, interval: Duration) -> Self {
        self.config.fault_retry_interval = interval;
        self
    }

    /// Send to a unicast address instead of multicast
    #[must_use]
    pub fn unicast_address(mut self, address: IpAddr) -> Self {
        self.config.unicast_address = Some(address);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<PtpConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
