// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the otalink update delivery core.

use thiserror::Error;

/// The primary error type used across all otalink crates.
///
/// Once an update session exists, errors are never surfaced to callers
/// through this type: they become a terminal session state plus an event.
/// This type is only returned by pre-session validation, storage, and
/// dispatcher plumbing.
#[derive(Debug, Error)]
pub enum OtalinkError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Channel errors (transport failure, connection refused, rejected send).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A device message was rejected before any delivery attempt.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The requested firmware artifact does not exist in the catalog.
    #[error("firmware {id} not found")]
    FirmwareNotFound { id: String },

    /// The firmware artifact targets a different device type.
    #[error(
        "firmware {firmware_id} targets device type `{firmware_device_type}`, device is `{device_type}`"
    )]
    IncompatibleFirmware {
        firmware_id: String,
        firmware_device_type: String,
        device_type: String,
    },

    /// Caller-supplied update options are unusable (e.g. a zero chunk size).
    #[error("invalid update options: {0}")]
    InvalidOptions(String),

    /// No update session with the given ID exists.
    #[error("update session {0} not found")]
    SessionNotFound(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OtalinkError {
    /// Shorthand for a channel error without an underlying source.
    pub fn channel(message: impl Into<String>) -> Self {
        OtalinkError::Channel {
            message: message.into(),
            source: None,
        }
    }
}
