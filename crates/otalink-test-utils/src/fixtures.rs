// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed catalog and preference data for tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use otalink_core::{
    ChecksumAlgorithm, DeviceCommPreference, DeviceInfo, FirmwareArtifact, FirmwareCatalog,
    OtalinkError, PreferenceSource,
};

/// Builds an artifact whose whole-image checksum is the additive sum.
pub fn artifact(id: &str, device_type: &str, version: &str, data: Vec<u8>) -> FirmwareArtifact {
    FirmwareArtifact {
        id: id.to_string(),
        version: version.to_string(),
        device_type: device_type.to_string(),
        checksum: ChecksumAlgorithm::Additive.compute(&data),
        data,
    }
}

pub fn device(id: &str, device_type: &str, firmware_version: &str) -> DeviceInfo {
    DeviceInfo {
        id: id.to_string(),
        device_type: device_type.to_string(),
        firmware_version: firmware_version.to_string(),
    }
}

/// In-memory [`FirmwareCatalog`].
#[derive(Default)]
pub struct StaticCatalog {
    artifacts: Mutex<HashMap<String, FirmwareArtifact>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, artifact: FirmwareArtifact) -> Self {
        self.insert(artifact);
        self
    }

    pub fn insert(&self, artifact: FirmwareArtifact) {
        lock(&self.artifacts).insert(artifact.id.clone(), artifact);
    }
}

#[async_trait]
impl FirmwareCatalog for StaticCatalog {
    async fn get_firmware(&self, id: &str) -> Result<Option<FirmwareArtifact>, OtalinkError> {
        Ok(lock(&self.artifacts).get(id).cloned())
    }
}

/// In-memory [`PreferenceSource`]. Can be switched to fail every lookup.
#[derive(Default)]
pub struct StaticPreferences {
    preferences: Mutex<HashMap<String, DeviceCommPreference>>,
    failing: Mutex<bool>,
}

impl StaticPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, device_id: &str, preference: DeviceCommPreference) -> Self {
        self.insert(device_id, preference);
        self
    }

    pub fn insert(&self, device_id: &str, preference: DeviceCommPreference) {
        lock(&self.preferences).insert(device_id.to_string(), preference);
    }

    /// Shorthand for a preference that only names channel types.
    pub fn prefer(self, device_id: &str, channels: &[&str]) -> Self {
        self.with(
            device_id,
            DeviceCommPreference {
                preferred_channels: channels.iter().map(|c| c.to_string()).collect(),
                ..DeviceCommPreference::default()
            },
        )
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }
}

#[async_trait]
impl PreferenceSource for StaticPreferences {
    async fn preferences(
        &self,
        device_id: &str,
    ) -> Result<Option<DeviceCommPreference>, OtalinkError> {
        if *lock(&self.failing) {
            return Err(OtalinkError::Internal(
                "preference store unavailable".to_string(),
            ));
        }
        Ok(lock(&self.preferences).get(device_id).cloned())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
