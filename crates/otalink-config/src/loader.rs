// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./otalink.toml` > `~/.config/otalink/otalink.toml` >
//! `/etc/otalink/otalink.toml` with environment variable overrides via `OTALINK_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::OtalinkConfig;

pub(crate) const SYSTEM_CONFIG_FILE: &str = "/etc/otalink/otalink.toml";
pub(crate) const LOCAL_CONFIG_FILE: &str = "otalink.toml";

/// Top-level sections, used to map `OTALINK_<SECTION>_<KEY>` env vars.
const SECTIONS: &[&str] = &[
    "log", "storage", "bus", "dispatch", "queue", "update", "facade",
];

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("otalink").join(LOCAL_CONFIG_FILE))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/otalink/otalink.toml` (system-wide)
/// 3. `~/.config/otalink/otalink.toml` (user XDG config)
/// 4. `./otalink.toml` (local directory)
/// 5. `OTALINK_*` environment variables
pub fn load_config() -> Result<OtalinkConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<OtalinkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(OtalinkConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<OtalinkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(OtalinkConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(OtalinkConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_FILE))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Maps `OTALINK_QUEUE_MAX_RETRIES` to `queue.max_retries`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// keys that themselves contain underscores stay intact.
fn env_provider() -> Env {
    Env::prefixed("OTALINK_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    SECTIONS
        .iter()
        .find_map(|section| {
            key.strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|rest| format!("{section}.{rest}"))
        })
        .unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(map_env_key("queue_max_retries"), "queue.max_retries");
        assert_eq!(
            map_env_key("update_default_chunk_size"),
            "update.default_chunk_size"
        );
        assert_eq!(
            map_env_key("facade_device_info_timeout_secs"),
            "facade.device_info_timeout_secs"
        );
        assert_eq!(map_env_key("LOG_LEVEL"), "log.level");
        assert_eq!(map_env_key("unrelated"), "unrelated");
    }
}
