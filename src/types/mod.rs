//! Core types module

pub mod config;

pub use config::{
    DelayMechanism, ProtocolVariant, PtpConfig, PtpConfigBuilder, ServoConfig, TimestampMode,
};
