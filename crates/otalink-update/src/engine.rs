// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Update session engine: validates new updates, spawns one actor per
//! session and routes device reports to it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::Utc;
use otalink_bus::{BusEvent, EventBus, EventKind, EventSubscription};
use otalink_config::model::UpdateConfig;
use otalink_core::{
    DeviceInfo, DeviceMessage, FirmwareCatalog, HealthCheckResult, MessageType, OtalinkError,
    SessionOptions, StorageAdapter, UpdateKind, UpdateOptions, UpdateSession, UpdateStatus,
    UpdateStatusReport,
};
use otalink_dispatch::{ChannelDispatcher, DeviceSubscription};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actor::{SessionActor, SessionInput};
use crate::chunk::{chunk_count, estimate_duration_ms};

struct SessionHandle {
    device_id: String,
    inbox: mpsc::UnboundedSender<SessionInput>,
}

struct EngineInner {
    dispatcher: Arc<ChannelDispatcher>,
    catalog: Arc<dyn FirmwareCatalog>,
    storage: Arc<dyn StorageAdapter>,
    bus: EventBus,
    config: UpdateConfig,
    sessions: Mutex<HashMap<String, SessionHandle>>,
    /// Device ID to the session that receives its reports.
    routes: Mutex<HashMap<String, String>>,
    shutdown: CancellationToken,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Drives firmware and configuration updates.
///
/// Cheap to clone. Each started session runs on its own tokio task; the
/// engine only keeps a handle to each running actor's inbox. Must be
/// created inside a tokio runtime.
#[derive(Clone)]
pub struct UpdateEngine {
    inner: Arc<EngineInner>,
}

impl UpdateEngine {
    pub fn new(
        dispatcher: Arc<ChannelDispatcher>,
        catalog: Arc<dyn FirmwareCatalog>,
        storage: Arc<dyn StorageAdapter>,
        bus: EventBus,
        config: UpdateConfig,
    ) -> Self {
        // Subscribe before returning so no report published after `new`
        // can be missed.
        let messages = dispatcher.register_for_messages(&[MessageType::DeviceStatus]);
        let health = bus.subscribe_filtered(None, &[EventKind::DeviceHealthCheckCompleted]);

        let inner = Arc::new(EngineInner {
            dispatcher: dispatcher.clone(),
            catalog,
            storage,
            bus,
            config,
            sessions: Mutex::new(HashMap::new()),
            routes: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(pump(
            Arc::downgrade(&inner),
            dispatcher,
            inner.shutdown.clone(),
            messages,
            health,
        ));

        Self { inner }
    }

    /// Validates and starts a firmware update for `device`.
    ///
    /// Errors are returned only before a session exists. Everything that
    /// goes wrong afterwards ends the session in a terminal state and is
    /// published on the bus.
    pub async fn start_firmware_update(
        &self,
        device: &DeviceInfo,
        firmware_id: &str,
        options: UpdateOptions,
    ) -> Result<UpdateSession, OtalinkError> {
        let inner = &self.inner;
        let artifact = inner
            .catalog
            .get_firmware(firmware_id)
            .await?
            .ok_or_else(|| OtalinkError::FirmwareNotFound {
                id: firmware_id.to_string(),
            })?;

        if artifact.device_type != device.device_type {
            return Err(OtalinkError::IncompatibleFirmware {
                firmware_id: artifact.id,
                firmware_device_type: artifact.device_type,
                device_type: device.device_type.clone(),
            });
        }

        let chunk_size = options.chunk_size.unwrap_or(inner.config.default_chunk_size);
        if chunk_size == 0 {
            return Err(OtalinkError::InvalidOptions(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        let chunk_size_u32 = u32::try_from(chunk_size).map_err(|_| {
            OtalinkError::InvalidOptions(format!("chunk size {chunk_size} is too large"))
        })?;
        let total_chunks = u32::try_from(chunk_count(artifact.size(), chunk_size)).map_err(|_| {
            OtalinkError::InvalidOptions(format!(
                "artifact of {} bytes needs too many chunks of {chunk_size} bytes",
                artifact.size()
            ))
        })?;

        let now = Utc::now();
        let session = UpdateSession {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device.id.clone(),
            kind: UpdateKind::Firmware,
            status: UpdateStatus::Initiated,
            source_artifact_id: artifact.id.clone(),
            version: artifact.version.clone(),
            checksum: artifact.checksum.clone(),
            chunk_size: chunk_size_u32,
            total_chunks,
            sent_chunks: 0,
            acknowledged_chunks: 0,
            options: SessionOptions {
                force_update: options.force_update.unwrap_or(false),
                skip_verification: options.skip_verification.unwrap_or(false),
                update_timeout_ms: options
                    .update_timeout_ms
                    .unwrap_or(inner.config.default_update_timeout_ms),
            },
            expected_duration_ms: estimate_duration_ms(
                total_chunks,
                inner.config.per_chunk_estimate_ms,
                inner.config.estimate_overhead_ms,
            ),
            error: None,
            started_at: now,
            last_activity_at: now,
            completed_at: None,
        };

        inner.storage.create_session(&session).await?;
        info!(
            session_id = %session.id,
            device_id = %session.device_id,
            firmware_id,
            version = %session.version,
            total_chunks,
            "firmware update initiated"
        );
        inner.bus.publish(BusEvent::UpdateInitiated {
            session_id: session.id.clone(),
            device_id: session.device_id.clone(),
            kind: session.kind,
            version: session.version.clone(),
            total_chunks,
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let actor = SessionActor::new(
            session.clone(),
            Arc::new(artifact.data),
            inner.dispatcher.clone(),
            inner.storage.clone(),
            inner.bus.clone(),
            inner.config.clone(),
            rx,
            inner.shutdown.child_token(),
        );

        // Register before spawning so the actor's exit always finds its entry.
        inner.lock_sessions().insert(
            session.id.clone(),
            SessionHandle {
                device_id: session.device_id.clone(),
                inbox: tx,
            },
        );
        if let Some(previous) = inner
            .lock_routes()
            .insert(session.device_id.clone(), session.id.clone())
        {
            warn!(
                device_id = %session.device_id,
                previous_session = %previous,
                session_id = %session.id,
                "device already had a running session; reports now go to the new one"
            );
        }

        let weak = Arc::downgrade(inner);
        tokio::spawn(async move {
            let finished = actor.run().await;
            debug!(
                session_id = %finished.id,
                status = %finished.status,
                "session actor exited"
            );
            if let Some(inner) = weak.upgrade() {
                inner.release(&finished.id);
            }
        });

        Ok(session)
    }

    /// Feeds a device's update report to its current session. Returns
    /// `false` when the device has no running session.
    pub fn process_update_status_report(&self, device_id: &str, report: UpdateStatusReport) -> bool {
        self.inner.route(device_id, SessionInput::Report(report))
    }

    /// Feeds a health check result to the device's current session.
    pub fn handle_health_check_result(&self, device_id: &str, result: HealthCheckResult) -> bool {
        self.inner.route(device_id, SessionInput::Health(result))
    }

    pub async fn session(&self, session_id: &str) -> Result<Option<UpdateSession>, OtalinkError> {
        self.inner.storage.get_session(session_id).await
    }

    pub async fn active_session_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<UpdateSession>, OtalinkError> {
        self.inner.storage.active_session_for_device(device_id).await
    }

    pub async fn list_sessions(
        &self,
        device_id: Option<&str>,
    ) -> Result<Vec<UpdateSession>, OtalinkError> {
        self.inner.storage.list_sessions(device_id).await
    }

    /// Number of session actors currently running.
    pub fn running_sessions(&self) -> usize {
        self.inner.lock_sessions().len()
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Stops the report pump and every session actor. Sessions keep their
    /// last persisted state.
    pub fn shutdown(&self) {
        info!(running = self.running_sessions(), "update engine shutting down");
        self.inner.shutdown.cancel();
    }
}

impl EngineInner {
    fn route(&self, device_id: &str, input: SessionInput) -> bool {
        let Some(session_id) = self.lock_routes().get(device_id).cloned() else {
            debug!(device_id, "no running update session for device");
            return false;
        };
        let sessions = self.lock_sessions();
        match sessions.get(&session_id) {
            Some(handle) => handle.inbox.send(input).is_ok(),
            None => false,
        }
    }

    fn route_device_status(&self, message: &DeviceMessage) {
        match UpdateStatusReport::from_payload(&message.payload) {
            None => {}
            Some(Ok(report)) => {
                self.route(&message.device_id, SessionInput::Report(report));
            }
            Some(Err(e)) => {
                warn!(
                    device_id = %message.device_id,
                    message_id = %message.message_id,
                    error = %e,
                    "malformed update status report"
                );
            }
        }
    }

    fn release(&self, session_id: &str) {
        let Some(handle) = self.lock_sessions().remove(session_id) else {
            return;
        };
        let mut routes = self.lock_routes();
        if routes.get(&handle.device_id).map(String::as_str) == Some(session_id) {
            routes.remove(&handle.device_id);
        }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_routes(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Forwards `DEVICE_STATUS` messages and health check results to sessions.
async fn pump(
    inner: Weak<EngineInner>,
    dispatcher: Arc<ChannelDispatcher>,
    shutdown: CancellationToken,
    mut messages: DeviceSubscription,
    mut health: EventSubscription,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            message = messages.recv() => {
                let Some(message) = message else { break };
                let Some(inner) = inner.upgrade() else { break };
                inner.route_device_status(&message);
            }
            event = health.recv() => {
                let Some(event) = event else { break };
                let Some(inner) = inner.upgrade() else { break };
                if let BusEvent::DeviceHealthCheckCompleted { device_id, result } = event {
                    inner.route(&device_id, SessionInput::Health(result));
                }
            }
        }
    }
    dispatcher.unregister(messages.id());
    debug!("update report pump stopped");
}
