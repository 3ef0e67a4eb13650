// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, positive timeouts, and known log levels.

use crate::diagnostic::ConfigError;
use crate::model::OtalinkConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &OtalinkConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.log.level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "log.level `{}` is not one of {}",
                config.log.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.bus.capacity == 0 {
        errors.push(ConfigError::Validation {
            message: "bus.capacity must be at least 1".to_string(),
        });
    }

    if config.queue.sweep_batch_size == 0 {
        errors.push(ConfigError::Validation {
            message: "queue.sweep_batch_size must be at least 1".to_string(),
        });
    }

    if config.update.default_chunk_size == 0 {
        errors.push(ConfigError::Validation {
            message: "update.default_chunk_size must be at least 1".to_string(),
        });
    }

    let timeouts = [
        ("dispatch.send_timeout_ms", config.dispatch.send_timeout_ms),
        (
            "dispatch.default_connection_timeout_ms",
            config.dispatch.default_connection_timeout_ms,
        ),
        ("queue.default_ttl_ms", config.queue.default_ttl_ms),
        ("queue.claim_lease_ms", config.queue.claim_lease_ms),
        ("update.prepare_timeout_secs", config.update.prepare_timeout_secs),
        (
            "update.health_check_timeout_secs",
            config.update.health_check_timeout_secs,
        ),
        (
            "update.default_update_timeout_ms",
            config.update.default_update_timeout_ms,
        ),
        ("update.control_ttl_ms", config.update.control_ttl_ms),
        ("update.rollback_ttl_ms", config.update.rollback_ttl_ms),
        (
            "facade.device_info_timeout_secs",
            config.facade.device_info_timeout_secs,
        ),
    ];
    for (key, value) in timeouts {
        if value == 0 {
            errors.push(ConfigError::Validation {
                message: format!("{key} must be greater than zero"),
            });
        }
    }

    if config.facade.fallback_device_type.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "facade.fallback_device_type must not be empty".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
