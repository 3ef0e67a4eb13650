// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the otalink update delivery core.
//!
//! This crate provides the shared types, the error type, checksum helpers,
//! and the capability traits implemented by transports, catalogs, and
//! storage backends.

pub mod checksum;
pub mod error;
pub mod traits;
pub mod types;

pub use checksum::ChecksumAlgorithm;
pub use error::OtalinkError;
pub use types::{
    ConnectionState, DeviceCommPreference, DeviceInfo, DeviceMessage, DeviceReportStatus,
    FirmwareArtifact, HealthCheckResult, MessagePriority, MessageType, QueueStatus,
    QueuedMessage, SendResult, SessionOptions, UpdateKind, UpdateOptions, UpdateSession,
    UpdateStatus, UpdateStatusReport,
};

pub use traits::{DeviceChannel, FirmwareCatalog, MessageSink, PreferenceSource, StorageAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_render() {
        let err = OtalinkError::FirmwareNotFound { id: "fw-9".into() };
        assert_eq!(err.to_string(), "firmware fw-9 not found");

        let err = OtalinkError::IncompatibleFirmware {
            firmware_id: "fw-1".into(),
            firmware_device_type: "ESP32".into(),
            device_type: "NRF52".into(),
        };
        assert!(err.to_string().contains("ESP32"));
        assert!(err.to_string().contains("NRF52"));

        let err = OtalinkError::channel("mqtt broker unreachable");
        assert_eq!(err.to_string(), "channel error: mqtt broker unreachable");

        let _storage = OtalinkError::Storage {
            source: Box::new(std::io::Error::other("disk full")),
        };
        let _timeout = OtalinkError::Timeout {
            duration: std::time::Duration::from_secs(10),
        };
    }

    #[test]
    fn traits_are_object_safe() {
        fn _channel(_: &dyn DeviceChannel) {}
        fn _sink(_: &dyn MessageSink) {}
        fn _catalog(_: &dyn FirmwareCatalog) {}
        fn _prefs(_: &dyn PreferenceSource) {}
        fn _storage(_: &dyn StorageAdapter) {}
    }
}
