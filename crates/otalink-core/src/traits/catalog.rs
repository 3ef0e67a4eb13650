// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::error::OtalinkError;
use crate::types::FirmwareArtifact;

/// Read-only access to the firmware catalog.
#[async_trait]
pub trait FirmwareCatalog: Send + Sync {
    /// Looks up an artifact by ID. `Ok(None)` when it does not exist.
    async fn get_firmware(&self, id: &str) -> Result<Option<FirmwareArtifact>, OtalinkError>;
}
