// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use otalink_core::ChecksumAlgorithm;
use serde::{Deserialize, Serialize};

/// Top-level otalink configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OtalinkConfig {
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Internal event bus settings.
    #[serde(default)]
    pub bus: BusConfig,

    /// Channel dispatcher settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Durable delivery queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Update session settings.
    #[serde(default)]
    pub update: UpdateConfig,

    /// Update facade settings.
    #[serde(default)]
    pub facade: FacadeConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("otalink").join("otalink.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("otalink.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    /// Events buffered per subscriber before the slowest one starts lagging.
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

fn default_bus_capacity() -> usize {
    1024
}

/// Channel dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Upper bound on a single `send_message` attempt.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Connect timeout for devices without a stored preference.
    #[serde(default = "default_connection_timeout_ms")]
    pub default_connection_timeout_ms: u64,

    /// Try channels that can honor a message's priority before those that
    /// cannot. No channel is ever dropped from the candidate list.
    #[serde(default)]
    pub prefer_priority_support: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
            default_connection_timeout_ms: default_connection_timeout_ms(),
            prefer_priority_support: false,
        }
    }
}

fn default_send_timeout_ms() -> u64 {
    10_000
}

fn default_connection_timeout_ms() -> u64 {
    30_000
}

/// Durable delivery queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// TTL given to queued messages that carry none (`ttl_ms = 0`).
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Redelivery attempts before a row is marked `FAILED`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Rows claimed per sweep pass.
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,

    /// How long a claimed row stays `PROCESSING` before another sweep may
    /// reclaim or expire it.
    #[serde(default = "default_claim_lease_ms")]
    pub claim_lease_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: default_ttl_ms(),
            max_retries: default_max_retries(),
            sweep_batch_size: default_sweep_batch_size(),
            claim_lease_ms: default_claim_lease_ms(),
        }
    }
}

fn default_ttl_ms() -> u64 {
    3_600_000
}

fn default_max_retries() -> u32 {
    5
}

fn default_sweep_batch_size() -> usize {
    100
}

fn default_claim_lease_ms() -> u64 {
    300_000
}

/// Update session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateConfig {
    /// Chunk size used when the caller does not pass one.
    #[serde(default = "default_chunk_size")]
    pub default_chunk_size: usize,

    /// Seconds to wait for `READY` after `UPDATE_PREPARE`.
    #[serde(default = "default_prepare_timeout_secs")]
    pub prepare_timeout_secs: u64,

    /// Seconds to wait for a health check result while verifying.
    #[serde(default = "default_health_check_timeout_secs")]
    pub health_check_timeout_secs: u64,

    #[serde(default = "default_update_timeout_ms")]
    pub default_update_timeout_ms: u64,

    /// TTL of prepare, chunk, and finalize messages.
    #[serde(default = "default_control_ttl_ms")]
    pub control_ttl_ms: u64,

    /// TTL of the rollback message.
    #[serde(default = "default_rollback_ttl_ms")]
    pub rollback_ttl_ms: u64,

    /// Duration estimate per chunk.
    #[serde(default = "default_per_chunk_estimate_ms")]
    pub per_chunk_estimate_ms: u64,

    /// Fixed overhead added to the duration estimate.
    #[serde(default = "default_estimate_overhead_ms")]
    pub estimate_overhead_ms: u64,

    /// Checksum sent with each chunk (`additive` or `sha256`).
    #[serde(default)]
    pub checksum_algorithm: ChecksumAlgorithm,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            default_chunk_size: default_chunk_size(),
            prepare_timeout_secs: default_prepare_timeout_secs(),
            health_check_timeout_secs: default_health_check_timeout_secs(),
            default_update_timeout_ms: default_update_timeout_ms(),
            control_ttl_ms: default_control_ttl_ms(),
            rollback_ttl_ms: default_rollback_ttl_ms(),
            per_chunk_estimate_ms: default_per_chunk_estimate_ms(),
            estimate_overhead_ms: default_estimate_overhead_ms(),
            checksum_algorithm: ChecksumAlgorithm::default(),
        }
    }
}

fn default_chunk_size() -> usize {
    4096
}

fn default_prepare_timeout_secs() -> u64 {
    60
}

fn default_health_check_timeout_secs() -> u64 {
    60
}

fn default_update_timeout_ms() -> u64 {
    300_000
}

fn default_control_ttl_ms() -> u64 {
    60_000
}

fn default_rollback_ttl_ms() -> u64 {
    300_000
}

fn default_per_chunk_estimate_ms() -> u64 {
    1000
}

fn default_estimate_overhead_ms() -> u64 {
    30_000
}

/// Update facade configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FacadeConfig {
    /// Seconds to wait for a `device.info.response`.
    #[serde(default = "default_device_info_timeout_secs")]
    pub device_info_timeout_secs: u64,

    /// Device type assumed when the registry does not answer.
    #[serde(default = "default_fallback_device_type")]
    pub fallback_device_type: String,

    #[serde(default = "default_fallback_firmware_version")]
    pub fallback_firmware_version: String,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            device_info_timeout_secs: default_device_info_timeout_secs(),
            fallback_device_type: default_fallback_device_type(),
            fallback_firmware_version: default_fallback_firmware_version(),
        }
    }
}

fn default_device_info_timeout_secs() -> u64 {
    10
}

fn default_fallback_device_type() -> String {
    "GENERIC".to_string()
}

fn default_fallback_firmware_version() -> String {
    "1.0.0".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_section_partial_override_keeps_defaults() {
        let toml_str = r#"
[update]
default_chunk_size = 1024
checksum_algorithm = "sha256"
"#;
        let config: OtalinkConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.update.default_chunk_size, 1024);
        assert_eq!(config.update.checksum_algorithm, ChecksumAlgorithm::Sha256);
        assert_eq!(config.update.prepare_timeout_secs, 60);
        assert_eq!(config.update.rollback_ttl_ms, 300_000);
    }

    #[test]
    fn queue_deny_unknown_fields() {
        let toml_str = r#"
[queue]
max_retrys = 3
"#;
        assert!(toml::from_str::<OtalinkConfig>(toml_str).is_err());
    }

    #[test]
    fn unknown_checksum_algorithm_is_rejected() {
        let toml_str = r#"
[update]
checksum_algorithm = "crc32"
"#;
        assert!(toml::from_str::<OtalinkConfig>(toml_str).is_err());
    }
}
