//! Wire codec for PTP messages.
//!
//! The layout is picked once from [`ProtocolVariant`]; every multi-byte field
//! is written and read big-endian through the bounds-checked [`cursor`].

pub mod crc;
pub mod cursor;
pub mod ethernet;
pub mod v1;
pub mod v2;

use crate::error::WireError;
use crate::types::config::{ProtocolVariant, PtpConfig};

use super::message::Message;

/// Settings that change how messages are laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    /// Wire format.
    pub variant: ProtocolVariant,
    /// Seconds past 2^31 are folded into the half-epoch.
    pub half_epoch: bool,
    /// v2 upper 16 bits of seconds.
    pub epoch_number: u16,
    /// Append and verify a CRC-32 trailer on v1 messages.
    pub v1_crc_trailer: bool,
    /// v2 `transportSpecific` nibble written on encode.
    pub transport_specific: u8,
    /// Source address for 802.1AS Ethernet frames.
    pub source_mac: [u8; 6],
    /// v1 subdomain name written for the configured domain.
    pub subdomain: [u8; v1::SUBDOMAIN_LENGTH],
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self::for_variant(ProtocolVariant::V2)
    }
}

impl CodecOptions {
    /// Options with defaults for `variant`.
    #[must_use]
    pub fn for_variant(variant: ProtocolVariant) -> Self {
        Self {
            variant,
            half_epoch: false,
            epoch_number: 0,
            v1_crc_trailer: false,
            transport_specific: u8::from(variant == ProtocolVariant::Ieee8021As),
            source_mac: [0; 6],
            subdomain: v1::subdomain_field(v1::SUBDOMAINS[0]),
        }
    }

    /// Options derived from a daemon configuration.
    #[must_use]
    pub fn from_config(config: &PtpConfig, source_mac: [u8; 6]) -> Self {
        Self {
            half_epoch: config.half_epoch,
            epoch_number: config.epoch_number,
            v1_crc_trailer: config.v1_crc_trailer,
            source_mac,
            subdomain: v1::subdomain_field(&config.subdomain),
            ..Self::for_variant(config.variant)
        }
    }
}

/// Encoder/decoder bound to one wire variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    options: CodecOptions,
}

impl Codec {
    /// Create a codec.
    #[must_use]
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    /// Codec settings.
    #[must_use]
    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Follow the master's half-epoch flag on subsequent encodes.
    pub fn set_half_epoch(&mut self, half_epoch: bool) {
        self.options.half_epoch = half_epoch;
    }

    /// Serialize `msg` into a datagram (or a full Ethernet frame for 802.1AS).
    pub fn encode(&self, msg: &Message) -> Result<Vec<u8>, WireError> {
        match self.options.variant {
            ProtocolVariant::V1 => v1::encode(msg, &self.options),
            ProtocolVariant::V2 => v2::encode(msg, &self.options),
            ProtocolVariant::Ieee8021As => {
                let payload = v2::encode(msg, &self.options)?;
                Ok(ethernet::frame(self.options.source_mac, &payload))
            }
        }
    }

    /// Parse a received datagram or frame.
    pub fn decode(&self, data: &[u8]) -> Result<Message, WireError> {
        match self.options.variant {
            ProtocolVariant::V1 => v1::decode(data, &self.options),
            ProtocolVariant::V2 => v2::decode(data),
            ProtocolVariant::Ieee8021As => {
                let (_, payload) = ethernet::unframe(data)?;
                let msg = v2::decode(payload)?;
                if msg.header.transport_specific != 1 {
                    return Err(WireError::InvalidField("transportSpecific"));
                }
                Ok(msg)
            }
        }
    }
}
