// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session actor driving one update through its state graph.
//!
//! The actor owns its [`UpdateSession`]. Device reports, health check
//! results and timer expiry are all handled on the actor's own task, so a
//! session never observes two inputs at once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use otalink_bus::{BusEvent, EventBus};
use otalink_config::model::UpdateConfig;
use otalink_core::{
    DeviceMessage, DeviceReportStatus, HealthCheckResult, StorageAdapter, UpdateKind,
    UpdateSession, UpdateStatus, UpdateStatusReport,
};
use otalink_dispatch::ChannelDispatcher;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chunk::chunk_range;
use crate::protocol;

/// Input delivered to a session actor's inbox.
#[derive(Debug, Clone)]
pub(crate) enum SessionInput {
    Report(UpdateStatusReport),
    Health(HealthCheckResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Ready,
    HealthCheck,
}

/// A timer owned by the session's current state.
#[derive(Debug, Clone, Copy)]
struct ScheduledTask {
    kind: TimerKind,
    deadline: Instant,
}

pub(crate) struct SessionActor {
    session: UpdateSession,
    data: Arc<Vec<u8>>,
    dispatcher: Arc<ChannelDispatcher>,
    storage: Arc<dyn StorageAdapter>,
    bus: EventBus,
    config: UpdateConfig,
    timer: Option<ScheduledTask>,
    /// Set when a session write failed; the run loop fails the session.
    unpersisted: Option<String>,
    inbox: mpsc::UnboundedReceiver<SessionInput>,
    shutdown: CancellationToken,
}

impl SessionActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session: UpdateSession,
        data: Arc<Vec<u8>>,
        dispatcher: Arc<ChannelDispatcher>,
        storage: Arc<dyn StorageAdapter>,
        bus: EventBus,
        config: UpdateConfig,
        inbox: mpsc::UnboundedReceiver<SessionInput>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            session,
            data,
            dispatcher,
            storage,
            bus,
            config,
            timer: None,
            unpersisted: None,
            inbox,
            shutdown,
        }
    }

    /// Drives the session until it reaches a terminal state, the inbox
    /// closes, or the engine shuts down. Returns the final session.
    pub(crate) async fn run(mut self) -> UpdateSession {
        self.begin().await;

        while !self.session.status.is_terminal() {
            if let Some(error) = self.unpersisted.take() {
                self.fail_with_error(error).await;
                continue;
            }
            let deadline = self.timer.map(|t| t.deadline);
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!(session_id = %self.session.id, "session actor stopped by shutdown");
                    break;
                }
                input = self.inbox.recv() => match input {
                    Some(SessionInput::Report(report)) => self.on_report(report).await,
                    Some(SessionInput::Health(result)) => self.on_health_result(result).await,
                    None => break,
                },
                _ = sleep_until(deadline) => self.on_timer().await,
            }
        }

        self.session
    }

    async fn begin(&mut self) {
        if !self.transition(UpdateStatus::Preparing, None).await {
            return;
        }
        let message = protocol::prepare(&self.session, self.data.len(), self.config.control_ttl_ms);
        if let Err(e) = self.send(&message).await {
            self.fail_with_error(format!("Failed to send prepare: {e}")).await;
            return;
        }
        self.arm(
            TimerKind::Ready,
            Duration::from_secs(self.config.prepare_timeout_secs),
        );
    }

    async fn on_report(&mut self, report: UpdateStatusReport) {
        use DeviceReportStatus as R;
        use UpdateStatus as S;

        match (self.session.status, report.status) {
            (_, R::UpdateFailed) => self.on_device_failure(report.error).await,
            (S::Preparing, R::Ready) => self.start_transfer().await,
            (S::Transferring, R::ChunkReceived) => self.on_chunk_ack(report.chunk_id).await,
            (S::Validating, R::ValidationComplete) => {
                self.transition(S::Applying, None).await;
            }
            (S::Applying, R::UpdateApplied) => {
                self.transition(S::Restarting, None).await;
            }
            (S::Restarting, R::RestartComplete) => self.begin_verification().await,
            (S::Verifying, R::VerificationPassed) => self.complete().await,
            (S::RollingBack, R::RollbackComplete) => self.finish_rollback(report.message).await,
            (status, reported) => {
                debug!(
                    session_id = %self.session.id,
                    %status,
                    report = %reported,
                    "report does not apply to current state, ignored"
                );
            }
        }
    }

    async fn on_health_result(&mut self, result: HealthCheckResult) {
        if self.session.status != UpdateStatus::Verifying {
            debug!(
                session_id = %self.session.id,
                status = %self.session.status,
                "health check result outside verification, ignored"
            );
            return;
        }
        if result.healthy {
            self.complete().await;
        } else {
            let reason = result
                .error
                .unwrap_or_else(|| "Health check failed".to_string());
            self.rollback(reason).await;
        }
    }

    async fn on_timer(&mut self) {
        let Some(task) = self.timer.take() else {
            return;
        };
        warn!(session_id = %self.session.id, timer = ?task.kind, "session timer expired");
        match task.kind {
            TimerKind::Ready => self.fail_with_error("Prepare timeout".to_string()).await,
            TimerKind::HealthCheck => self.rollback("Health check timeout".to_string()).await,
        }
    }

    async fn start_transfer(&mut self) {
        if !self.transition(UpdateStatus::Transferring, None).await {
            return;
        }
        if self.session.total_chunks == 0 {
            self.finalize().await;
        } else {
            self.send_chunk(0).await;
        }
    }

    async fn send_chunk(&mut self, index: u32) {
        let chunk_size = self.session.chunk_size as usize;
        let Some(range) = chunk_range(index as usize, self.data.len(), chunk_size) else {
            self.fail_with_error(format!("Chunk {index} out of range")).await;
            return;
        };
        let message = protocol::chunk(
            &self.session,
            index,
            &self.data[range],
            self.config.checksum_algorithm,
            self.config.control_ttl_ms,
        );
        match self.send(&message).await {
            Ok(()) => {
                self.session.sent_chunks = index + 1;
                self.session.last_activity_at = Utc::now();
                self.persist().await;
                debug!(session_id = %self.session.id, chunk = index, "chunk sent");
            }
            Err(e) => {
                self.fail_with_error(format!("Failed to send chunk {index}: {e}"))
                    .await;
            }
        }
    }

    /// Only the acknowledgement of the next expected, already sent chunk
    /// advances the transfer.
    async fn on_chunk_ack(&mut self, chunk_id: Option<u32>) {
        let Some(chunk_id) = chunk_id else {
            debug!(session_id = %self.session.id, "chunk acknowledgement without chunkId, ignored");
            return;
        };
        if chunk_id != self.session.acknowledged_chunks || chunk_id >= self.session.sent_chunks {
            debug!(
                session_id = %self.session.id,
                chunk = chunk_id,
                acknowledged = self.session.acknowledged_chunks,
                sent = self.session.sent_chunks,
                "stale or unexpected chunk acknowledgement, ignored"
            );
            return;
        }

        self.session.acknowledged_chunks = chunk_id + 1;
        self.session.last_activity_at = Utc::now();
        if !self.persist().await {
            return;
        }
        self.bus.publish(BusEvent::UpdateProgress {
            session_id: self.session.id.clone(),
            device_id: self.session.device_id.clone(),
            progress: self.session.progress(),
            chunk_id,
        });

        if self.session.acknowledged_chunks == self.session.total_chunks {
            self.finalize().await;
        } else {
            self.send_chunk(self.session.acknowledged_chunks).await;
        }
    }

    async fn finalize(&mut self) {
        let message = protocol::finalize(&self.session, self.config.control_ttl_ms);
        if let Err(e) = self.send(&message).await {
            self.fail_with_error(format!("Failed to send finalize: {e}"))
                .await;
            return;
        }
        self.transition(UpdateStatus::Validating, None).await;
    }

    async fn begin_verification(&mut self) {
        if !self.transition(UpdateStatus::Verifying, None).await {
            return;
        }
        if self.session.options.skip_verification {
            self.complete().await;
            return;
        }
        self.bus.publish(BusEvent::DeviceHealthCheckRequested {
            device_id: self.session.device_id.clone(),
            session_id: self.session.id.clone(),
        });
        self.arm(
            TimerKind::HealthCheck,
            Duration::from_secs(self.config.health_check_timeout_secs),
        );
    }

    async fn complete(&mut self) {
        if !self.transition(UpdateStatus::Completed, None).await {
            return;
        }
        let finished = self.session.completed_at.unwrap_or_else(Utc::now);
        let duration_ms = (finished - self.session.started_at)
            .num_milliseconds()
            .max(0) as u64;
        info!(
            session_id = %self.session.id,
            device_id = %self.session.device_id,
            version = %self.session.version,
            duration_ms,
            "update completed"
        );
        self.bus.publish(BusEvent::UpdateCompleted {
            session_id: self.session.id.clone(),
            device_id: self.session.device_id.clone(),
            kind: self.session.kind,
            version: self.session.version.clone(),
            duration_ms,
            new_firmware_version: (self.session.kind == UpdateKind::Firmware)
                .then(|| self.session.version.clone()),
        });
    }

    async fn rollback(&mut self, reason: String) {
        if !self
            .transition(UpdateStatus::RollingBack, Some(reason.clone()))
            .await
        {
            return;
        }
        self.bus.publish(BusEvent::UpdateVerificationFailed {
            session_id: self.session.id.clone(),
            device_id: self.session.device_id.clone(),
            error: Some(reason),
        });

        let message = protocol::rollback(&self.session, self.config.rollback_ttl_ms);
        if let Err(e) = self.send(&message).await {
            self.fail_with_error(format!("Failed to send rollback: {e}"))
                .await;
        }
    }

    async fn finish_rollback(&mut self, message: Option<String>) {
        if !self.transition(UpdateStatus::RolledBack, None).await {
            return;
        }
        self.bus.publish(BusEvent::UpdateRolledBack {
            session_id: self.session.id.clone(),
            device_id: self.session.device_id.clone(),
            reason: message.unwrap_or_else(|| "Rollback completed".to_string()),
        });
    }

    async fn on_device_failure(&mut self, error: Option<String>) {
        let error = error.unwrap_or_else(|| "Unknown error".to_string());
        warn!(
            session_id = %self.session.id,
            device_id = %self.session.device_id,
            %error,
            "device reported update failure"
        );
        if self
            .transition(UpdateStatus::Failed, Some(error.clone()))
            .await
        {
            self.bus.publish(BusEvent::UpdateFailed {
                session_id: self.session.id.clone(),
                device_id: self.session.device_id.clone(),
                error,
            });
        }
    }

    /// Single exit for orchestration errors: timer expiry, failed sends,
    /// chunk bookkeeping errors.
    async fn fail_with_error(&mut self, error: String) {
        if self.session.status.is_terminal() {
            return;
        }
        error!(session_id = %self.session.id, %error, "update session failed");
        if self
            .transition(UpdateStatus::Failed, Some(error.clone()))
            .await
        {
            self.publish_error(error);
        }
    }

    fn publish_error(&self, error: String) {
        self.bus.publish(BusEvent::UpdateError {
            session_id: self.session.id.clone(),
            device_id: self.session.device_id.clone(),
            error,
        });
    }

    /// Moves to `next` if the state graph allows it. Drops the current
    /// timer, persists the session and emits `update.status.changed`.
    ///
    /// Returns `false` when the move was refused, or when the session could
    /// not be written and `next` is not terminal.
    async fn transition(&mut self, next: UpdateStatus, error: Option<String>) -> bool {
        let current = self.session.status;
        if !current.can_transition_to(next) {
            warn!(
                session_id = %self.session.id,
                from = %current,
                to = %next,
                "illegal session transition ignored"
            );
            return false;
        }

        self.timer = None;
        let now = Utc::now();
        self.session.status = next;
        if error.is_some() {
            self.session.error = error.clone();
        }
        self.session.last_activity_at = now;
        if next.is_terminal() {
            self.session.completed_at = Some(now);
        }
        let persisted = self.persist().await;

        debug!(session_id = %self.session.id, from = %current, to = %next, "session transition");
        self.bus.publish(BusEvent::UpdateStatusChanged {
            session_id: self.session.id.clone(),
            device_id: self.session.device_id.clone(),
            status: next,
            timestamp: now,
            error,
        });
        persisted || next.is_terminal()
    }

    fn arm(&mut self, kind: TimerKind, after: Duration) {
        self.timer = Some(ScheduledTask {
            kind,
            deadline: Instant::now() + after,
        });
    }

    async fn persist(&mut self) -> bool {
        match self.storage.update_session(&self.session).await {
            Ok(()) => true,
            Err(e) => {
                error!(session_id = %self.session.id, error = %e, "failed to persist update session");
                if !self.session.status.is_terminal() {
                    self.unpersisted = Some(format!("Failed to persist session: {e}"));
                }
                false
            }
        }
    }

    /// A send counts as failed when it errors or when it was neither
    /// delivered nor queued.
    async fn send(&self, message: &DeviceMessage) -> Result<(), String> {
        match self.dispatcher.send_message_to_device(message).await {
            Ok(result) if result.is_accepted() => Ok(()),
            Ok(result) => Err(result
                .error
                .unwrap_or_else(|| "message rejected".to_string())),
            Err(e) => Err(e.to_string()),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
