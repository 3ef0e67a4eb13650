// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller-facing entry point that resolves device information over the bus
//! before handing the update to the engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use otalink_bus::{BusEvent, EventBus, EventKind, EventSubscription};
use otalink_config::model::FacadeConfig;
use otalink_core::{DeviceInfo, OtalinkError, UpdateOptions, UpdateStatus};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::UpdateEngine;

type InfoCache = Arc<Mutex<HashMap<String, DeviceInfo>>>;

/// Summary returned to callers that start an update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTicket {
    pub id: String,
    pub status: UpdateStatus,
    pub started_at: DateTime<Utc>,
    pub expected_duration_ms: u64,
}

/// Starts updates by device ID.
///
/// Device information comes from a local cache filled by
/// `device.info.response` events. A background listener keeps the cache
/// current and stops when the manager is dropped.
pub struct UpdateManager {
    engine: UpdateEngine,
    bus: EventBus,
    config: FacadeConfig,
    cache: InfoCache,
    cancel: CancellationToken,
}

impl UpdateManager {
    /// Must be called inside a tokio runtime.
    pub fn new(engine: UpdateEngine, bus: EventBus, config: FacadeConfig) -> Self {
        let cache: InfoCache = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();
        let events = bus.subscribe_filtered(
            None,
            &[EventKind::DeviceInfoResponse, EventKind::UpdateCompleted],
        );
        tokio::spawn(listen(events, cache.clone(), cancel.clone()));

        Self {
            engine,
            bus,
            config,
            cache,
            cancel,
        }
    }

    pub fn engine(&self) -> &UpdateEngine {
        &self.engine
    }

    /// Resolves the device and starts a firmware update on it.
    pub async fn start_firmware_update(
        &self,
        device_id: &str,
        firmware_id: &str,
        options: UpdateOptions,
    ) -> Result<UpdateTicket, OtalinkError> {
        let device = self.resolve_device_info(device_id).await;
        let session = self
            .engine
            .start_firmware_update(&device, firmware_id, options)
            .await?;
        Ok(UpdateTicket {
            id: session.id,
            status: session.status,
            started_at: session.started_at,
            expected_duration_ms: session.expected_duration_ms,
        })
    }

    /// Cache first, then a `device.info.requested` round trip over the bus.
    /// Falls back to the configured generic device when nobody answers.
    pub async fn resolve_device_info(&self, device_id: &str) -> DeviceInfo {
        if let Some(info) = self.cached_device_info(device_id) {
            return info;
        }

        let mut responses =
            self.bus
                .subscribe_filtered(Some(device_id), &[EventKind::DeviceInfoResponse]);
        self.bus.publish(BusEvent::DeviceInfoRequested {
            device_id: device_id.to_string(),
        });

        let wait = Duration::from_secs(self.config.device_info_timeout_secs);
        match tokio::time::timeout(wait, next_info(&mut responses)).await {
            Ok(Some(info)) => {
                self.cache_device_info(info.clone());
                info
            }
            Ok(None) => {
                warn!(device_id, "device registry has no info for device, using fallback");
                self.fallback(device_id)
            }
            Err(_) => {
                warn!(
                    device_id,
                    timeout_secs = self.config.device_info_timeout_secs,
                    "device info request timed out, using fallback"
                );
                self.fallback(device_id)
            }
        }
    }

    pub fn cache_device_info(&self, info: DeviceInfo) {
        lock(&self.cache).insert(info.id.clone(), info);
    }

    pub fn cached_device_info(&self, device_id: &str) -> Option<DeviceInfo> {
        lock(&self.cache).get(device_id).cloned()
    }

    fn fallback(&self, device_id: &str) -> DeviceInfo {
        DeviceInfo {
            id: device_id.to_string(),
            device_type: self.config.fallback_device_type.clone(),
            firmware_version: self.config.fallback_firmware_version.clone(),
        }
    }
}

impl Drop for UpdateManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn next_info(responses: &mut EventSubscription) -> Option<DeviceInfo> {
    while let Some(event) = responses.recv().await {
        if let BusEvent::DeviceInfoResponse { info, .. } = event {
            return info;
        }
    }
    None
}

async fn listen(mut events: EventSubscription, cache: InfoCache, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            BusEvent::DeviceInfoResponse {
                device_id,
                info: Some(info),
            } => {
                debug!(%device_id, device_type = %info.device_type, "device info cached");
                lock(&cache).insert(device_id, info);
            }
            BusEvent::UpdateCompleted {
                device_id,
                new_firmware_version: Some(version),
                ..
            } => {
                if let Some(cached) = lock(&cache).get_mut(&device_id) {
                    info!(%device_id, from = %cached.firmware_version, to = %version, "firmware version bumped");
                    cached.firmware_version = version;
                }
            }
            _ => {}
        }
    }
}

fn lock(cache: &InfoCache) -> MutexGuard<'_, HashMap<String, DeviceInfo>> {
    cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
