// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::error::OtalinkError;
use crate::types::DeviceCommPreference;

/// Read-only access to per-device communication preferences.
#[async_trait]
pub trait PreferenceSource: Send + Sync {
    /// `Ok(None)` when the device has no stored preference.
    async fn preferences(
        &self,
        device_id: &str,
    ) -> Result<Option<DeviceCommPreference>, OtalinkError>;
}
