//! Clock and port identities and the advertised clock dataset.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 8-byte clock identity (EUI-64).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ClockIdentity(pub [u8; 8]);

impl ClockIdentity {
    /// Derive an EUI-64 identity from a 6-byte MAC by inserting `FF:FE`
    /// after the OUI.
    #[must_use]
    pub fn from_mac(mac: [u8; 6]) -> Self {
        Self([mac[0], mac[1], mac[2], 0xFF, 0xFE, mac[3], mac[4], mac[5]])
    }

    /// Recover the 6-byte v1 UUID (MAC) from an EUI-64 identity.
    ///
    /// Identities that were not derived from a MAC keep their outer bytes.
    #[must_use]
    pub fn to_uuid(&self) -> [u8; 6] {
        let b = self.0;
        [b[0], b[1], b[2], b[5], b[6], b[7]]
    }

    /// Create from a 64-bit integer (big-endian byte order).
    #[must_use]
    pub fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }

    /// The identity as a 64-bit integer.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

impl fmt::Display for ClockIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}.{:02x}{:02x}.{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

/// Port identity: clock identity plus 1-based port number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct PortIdentity {
    /// Owning clock.
    pub clock_identity: ClockIdentity,
    /// Port number (1-based).
    pub port_number: u16,
}

impl PortIdentity {
    /// Create a new port identity.
    #[must_use]
    pub fn new(clock_identity: ClockIdentity, port_number: u16) -> Self {
        Self {
            clock_identity,
            port_number,
        }
    }
}

impl fmt::Display for PortIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.clock_identity, self.port_number)
    }
}

/// Advertised quality of a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClockQuality {
    /// Traceability class (v1: stratum).
    pub clock_class: u8,
    /// Accuracy enumeration (0x20 = 25 ns ... 0xFE = unknown).
    pub clock_accuracy: u8,
    /// Offset scaled log variance (v1 variance biased by 0x8000).
    pub offset_scaled_log_variance: u16,
}

impl Default for ClockQuality {
    fn default() -> Self {
        Self {
            clock_class: 248,
            clock_accuracy: 0xFE,
            offset_scaled_log_variance: 0xFFFF,
        }
    }
}

/// Time source enumeration values carried in Announce.
pub mod time_source {
    /// Atomic clock.
    pub const ATOMIC_CLOCK: u8 = 0x10;
    /// GPS receiver.
    pub const GPS: u8 = 0x20;
    /// NTP-disciplined.
    pub const NTP: u8 = 0x50;
    /// Set by hand.
    pub const HAND_SET: u8 = 0x60;
    /// Other.
    pub const OTHER: u8 = 0x90;
    /// Free-running oscillator.
    pub const INTERNAL_OSCILLATOR: u8 = 0xA0;
}

/// A candidate master's advertised dataset.
///
/// Replaced wholesale on each new Announce (or v1 Sync) from the same
/// source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClockDataset {
    /// Operator priority (lower wins).
    pub priority1: u8,
    /// Quality triple.
    pub quality: ClockQuality,
    /// Second operator priority (lower wins).
    pub priority2: u8,
    /// Grandmaster identity (final tie-break, lower wins).
    pub identity: ClockIdentity,
    /// Hops between the grandmaster and the receiver of this dataset.
    pub steps_removed: u16,
    /// Source of the grandmaster's time.
    pub time_source: u8,
}

impl ClockDataset {
    /// Dataset describing a default-quality local clock.
    #[must_use]
    pub fn local(identity: ClockIdentity) -> Self {
        Self {
            priority1: 128,
            quality: ClockQuality::default(),
            priority2: 128,
            identity,
            steps_removed: 0,
            time_source: time_source::INTERNAL_OSCILLATOR,
        }
    }

    /// Whether `other` advertises exactly the same quality, ignoring identity
    /// and topology.
    #[must_use]
    pub fn same_quality(&self, other: &Self) -> bool {
        self.priority1 == other.priority1
            && self.quality == other.quality
            && self.priority2 == other.priority2
    }
}

/// v1 clock identifier strings and the accuracy each maps onto.
pub const V1_IDENTIFIERS: [(&[u8; 4], u8); 6] = [
    (b"ATOM", 0x22),
    (b"GPS\0", 0x23),
    (b"NTP\0", 0x2F),
    (b"HAND", 0x31),
    (b"INIT", 0xFD),
    (b"DFLT", 0xFE),
];

/// Map a v1 4-character clock identifier onto a v2 accuracy code.
#[must_use]
pub fn accuracy_from_v1_identifier(identifier: &[u8; 4]) -> u8 {
    V1_IDENTIFIERS
        .iter()
        .find(|(id, _)| *id == identifier)
        .map_or(0xFE, |(_, accuracy)| *accuracy)
}

/// Map a v1 signed variance onto the unsigned v2 ordering.
#[must_use]
#[allow(
    clippy::cast_sign_loss,
    reason = "Bias by 0x8000 keeps signed ordering in unsigned space"
)]
pub fn variance_from_v1(variance: i16) -> u16 {
    (i32::from(variance) + 0x8000) as u16
}

/// Inverse of [`variance_from_v1`].
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    reason = "Bias by 0x8000 keeps the value in i16 range"
)]
pub fn variance_to_v1(variance: u16) -> i16 {
    (i32::from(variance) - 0x8000) as i16
}
