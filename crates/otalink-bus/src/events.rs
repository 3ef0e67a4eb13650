// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event payloads carried on the bus.

use chrono::{DateTime, Utc};
use otalink_core::{DeviceInfo, DeviceMessage, HealthCheckResult, UpdateKind, UpdateStatus};
use serde::Serialize;
use strum::{Display, EnumString};

/// Discriminant of a [`BusEvent`], rendered with its dotted event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
pub enum EventKind {
    #[strum(serialize = "update.initiated")]
    UpdateInitiated,
    #[strum(serialize = "update.progress")]
    UpdateProgress,
    #[strum(serialize = "update.completed")]
    UpdateCompleted,
    #[strum(serialize = "update.failed")]
    UpdateFailed,
    #[strum(serialize = "update.error")]
    UpdateError,
    #[strum(serialize = "update.rolledback")]
    UpdateRolledBack,
    #[strum(serialize = "update.verification.failed")]
    UpdateVerificationFailed,
    #[strum(serialize = "update.status.changed")]
    UpdateStatusChanged,
    #[strum(serialize = "message.sent")]
    MessageSent,
    #[strum(serialize = "message.queued")]
    MessageQueued,
    #[strum(serialize = "channel.error")]
    ChannelError,
    #[strum(serialize = "device.connected")]
    DeviceConnected,
    #[strum(serialize = "connection.error")]
    ConnectionError,
    #[strum(serialize = "device.message")]
    DeviceMessage,
    #[strum(serialize = "device.info.requested")]
    DeviceInfoRequested,
    #[strum(serialize = "device.info.response")]
    DeviceInfoResponse,
    #[strum(serialize = "device.health.check.requested")]
    DeviceHealthCheckRequested,
    #[strum(serialize = "device.health.check.completed")]
    DeviceHealthCheckCompleted,
}

/// Every event published inside the delivery core.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BusEvent {
    UpdateInitiated {
        session_id: String,
        device_id: String,
        kind: UpdateKind,
        version: String,
        total_chunks: u32,
    },
    UpdateProgress {
        session_id: String,
        device_id: String,
        /// Acknowledged fraction in `[0, 1]`.
        progress: f64,
        chunk_id: u32,
    },
    UpdateCompleted {
        session_id: String,
        device_id: String,
        kind: UpdateKind,
        version: String,
        duration_ms: u64,
        /// Set for firmware updates: the device now runs this version.
        new_firmware_version: Option<String>,
    },
    /// The device reported a failure.
    UpdateFailed {
        session_id: String,
        device_id: String,
        error: String,
    },
    /// An orchestration error (timeout, failed send, ...).
    UpdateError {
        session_id: String,
        device_id: String,
        error: String,
    },
    UpdateRolledBack {
        session_id: String,
        device_id: String,
        reason: String,
    },
    UpdateVerificationFailed {
        session_id: String,
        device_id: String,
        error: Option<String>,
    },
    UpdateStatusChanged {
        session_id: String,
        device_id: String,
        status: UpdateStatus,
        timestamp: DateTime<Utc>,
        error: Option<String>,
    },
    MessageSent {
        device_id: String,
        message_id: String,
        channel: String,
    },
    MessageQueued {
        device_id: String,
        message_id: String,
        error: String,
    },
    ChannelError {
        device_id: String,
        message_id: Option<String>,
        channel: String,
        error: String,
    },
    DeviceConnected {
        device_id: String,
        channel: String,
    },
    ConnectionError {
        device_id: String,
        channel: String,
        error: String,
    },
    /// An inbound message from a device.
    DeviceMessage { message: DeviceMessage },
    DeviceInfoRequested { device_id: String },
    /// Answer from the device registry. `info` is `None` for unknown devices.
    DeviceInfoResponse {
        device_id: String,
        info: Option<DeviceInfo>,
    },
    DeviceHealthCheckRequested {
        device_id: String,
        session_id: String,
    },
    DeviceHealthCheckCompleted {
        device_id: String,
        result: HealthCheckResult,
    },
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::UpdateInitiated { .. } => EventKind::UpdateInitiated,
            BusEvent::UpdateProgress { .. } => EventKind::UpdateProgress,
            BusEvent::UpdateCompleted { .. } => EventKind::UpdateCompleted,
            BusEvent::UpdateFailed { .. } => EventKind::UpdateFailed,
            BusEvent::UpdateError { .. } => EventKind::UpdateError,
            BusEvent::UpdateRolledBack { .. } => EventKind::UpdateRolledBack,
            BusEvent::UpdateVerificationFailed { .. } => EventKind::UpdateVerificationFailed,
            BusEvent::UpdateStatusChanged { .. } => EventKind::UpdateStatusChanged,
            BusEvent::MessageSent { .. } => EventKind::MessageSent,
            BusEvent::MessageQueued { .. } => EventKind::MessageQueued,
            BusEvent::ChannelError { .. } => EventKind::ChannelError,
            BusEvent::DeviceConnected { .. } => EventKind::DeviceConnected,
            BusEvent::ConnectionError { .. } => EventKind::ConnectionError,
            BusEvent::DeviceMessage { .. } => EventKind::DeviceMessage,
            BusEvent::DeviceInfoRequested { .. } => EventKind::DeviceInfoRequested,
            BusEvent::DeviceInfoResponse { .. } => EventKind::DeviceInfoResponse,
            BusEvent::DeviceHealthCheckRequested { .. } => EventKind::DeviceHealthCheckRequested,
            BusEvent::DeviceHealthCheckCompleted { .. } => EventKind::DeviceHealthCheckCompleted,
        }
    }

    /// The device this event concerns.
    pub fn device_id(&self) -> &str {
        match self {
            BusEvent::UpdateInitiated { device_id, .. }
            | BusEvent::UpdateProgress { device_id, .. }
            | BusEvent::UpdateCompleted { device_id, .. }
            | BusEvent::UpdateFailed { device_id, .. }
            | BusEvent::UpdateError { device_id, .. }
            | BusEvent::UpdateRolledBack { device_id, .. }
            | BusEvent::UpdateVerificationFailed { device_id, .. }
            | BusEvent::UpdateStatusChanged { device_id, .. }
            | BusEvent::MessageSent { device_id, .. }
            | BusEvent::MessageQueued { device_id, .. }
            | BusEvent::ChannelError { device_id, .. }
            | BusEvent::DeviceConnected { device_id, .. }
            | BusEvent::ConnectionError { device_id, .. }
            | BusEvent::DeviceInfoRequested { device_id }
            | BusEvent::DeviceInfoResponse { device_id, .. }
            | BusEvent::DeviceHealthCheckRequested { device_id, .. }
            | BusEvent::DeviceHealthCheckCompleted { device_id, .. } => device_id,
            BusEvent::DeviceMessage { message } => &message.device_id,
        }
    }

    /// The update session this event concerns, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            BusEvent::UpdateInitiated { session_id, .. }
            | BusEvent::UpdateProgress { session_id, .. }
            | BusEvent::UpdateCompleted { session_id, .. }
            | BusEvent::UpdateFailed { session_id, .. }
            | BusEvent::UpdateError { session_id, .. }
            | BusEvent::UpdateRolledBack { session_id, .. }
            | BusEvent::UpdateVerificationFailed { session_id, .. }
            | BusEvent::UpdateStatusChanged { session_id, .. }
            | BusEvent::DeviceHealthCheckRequested { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}
