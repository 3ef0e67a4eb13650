// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the dispatcher, the durable queue, and the update
//! state machine.
//!
//! Enum values serialize in `SCREAMING_SNAKE_CASE` both on the device wire
//! protocol and in the database, so a value read back from either place
//! parses with `FromStr`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// --- Device protocol ---

/// Type of a message exchanged with a device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    SensorReading,
    ConfigUpdate,
    UpdatePrepare,
    UpdateChunk,
    UpdateFinalize,
    UpdateRollback,
    DeviceStatus,
    Command,
}

/// Delivery priority of a device message. Ordered from least to most urgent.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MessagePriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Connection state of one channel towards one device.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    ConnectionLost,
}

impl ConnectionState {
    /// How "alive" this state is when aggregating redundant transports.
    ///
    /// CONNECTED > CONNECTING > RECONNECTING > CONNECTION_LOST > DISCONNECTED.
    pub fn liveness(self) -> u8 {
        match self {
            ConnectionState::Connected => 4,
            ConnectionState::Connecting => 3,
            ConnectionState::Reconnecting => 2,
            ConnectionState::ConnectionLost => 1,
            ConnectionState::Disconnected => 0,
        }
    }

    /// Returns the most alive state of the given set, or `Disconnected` for
    /// an empty set.
    pub fn most_alive<I>(states: I) -> ConnectionState
    where
        I: IntoIterator<Item = ConnectionState>,
    {
        states
            .into_iter()
            .max_by_key(|s| s.liveness())
            .unwrap_or(ConnectionState::Disconnected)
    }
}

/// Envelope for every message sent to, or received from, a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMessage {
    pub device_id: String,
    pub message_type: MessageType,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Caller-assigned idempotency key. Receivers deduplicate on it.
    pub message_id: String,
    #[serde(default)]
    pub priority: MessagePriority,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Time-to-live in milliseconds.
    #[serde(rename = "ttl")]
    pub ttl_ms: u64,
}

impl DeviceMessage {
    /// Builds a message stamped with the current time.
    pub fn new(
        device_id: impl Into<String>,
        message_type: MessageType,
        payload: serde_json::Value,
        message_id: impl Into<String>,
        priority: MessagePriority,
        ttl_ms: u64,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            message_type,
            payload,
            message_id: message_id.into(),
            priority,
            timestamp: Utc::now().timestamp_millis(),
            ttl_ms,
        }
    }
}

/// Outcome of a delivery attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub success: bool,
    /// The message was not delivered live but has been queued for retry.
    #[serde(default)]
    pub pending_delivery: bool,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SendResult {
    /// A live delivery.
    pub fn delivered(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            pending_delivery: false,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    /// A failed attempt with no queued fallback.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            pending_delivery: false,
            message_id: None,
            error: Some(error.into()),
        }
    }

    /// Not delivered live, queued for later delivery.
    pub fn pending(message_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            pending_delivery: true,
            message_id: Some(message_id.into()),
            error: Some(error.into()),
        }
    }

    /// True when the message was delivered or is safely queued.
    pub fn is_accepted(&self) -> bool {
        self.success || self.pending_delivery
    }
}

// --- Device collaborators (read-only here) ---

/// Communication preferences of one device, owned by device management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCommPreference {
    /// Transport types to try first, in order.
    #[serde(default)]
    pub preferred_channels: Vec<String>,
    /// Opaque per-transport configuration, keyed by transport type.
    #[serde(default)]
    pub transport_config: HashMap<String, serde_json::Value>,
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl Default for DeviceCommPreference {
    fn default() -> Self {
        Self {
            preferred_channels: Vec::new(),
            transport_config: HashMap::new(),
            connection_timeout_ms: default_connection_timeout_ms(),
            max_retries: default_max_retries(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

fn default_connection_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_interval_ms() -> u64 {
    60_000
}

/// A firmware binary from the firmware catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareArtifact {
    pub id: String,
    pub version: String,
    /// Device type this firmware is built for.
    pub device_type: String,
    pub data: Vec<u8>,
    /// Whole-artifact checksum as published by the catalog.
    pub checksum: String,
}

impl FirmwareArtifact {
    /// Size of the binary payload in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Device metadata needed to start an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub firmware_version: String,
}

/// Result of an external device health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    #[serde(default)]
    pub error: Option<String>,
}

// --- Durable queue ---

/// Lifecycle of a queued message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Queued,
    Processing,
    Sent,
    Failed,
    Expired,
}

impl QueueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueueStatus::Sent | QueueStatus::Failed | QueueStatus::Expired
        )
    }
}

/// A message that could not be delivered live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Storage row ID. Zero until persisted.
    pub id: i64,
    pub device_id: String,
    pub message_id: String,
    pub message_type: MessageType,
    pub payload: serde_json::Value,
    pub priority: MessagePriority,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: u64,
    pub status: QueueStatus,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl QueuedMessage {
    /// Builds a fresh `QUEUED` row from an undeliverable message.
    pub fn from_message(message: &DeviceMessage, error: Option<String>) -> Self {
        Self {
            id: 0,
            device_id: message.device_id.clone(),
            message_id: message.message_id.clone(),
            message_type: message.message_type,
            payload: message.payload.clone(),
            priority: message.priority,
            created_at: Utc::now(),
            ttl_ms: message.ttl_ms,
            status: QueueStatus::Queued,
            retry_count: 0,
            last_retry_at: None,
            error,
        }
    }

    /// Instant after which the message must not be delivered.
    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = i64::try_from(self.ttl_ms).unwrap_or(i64::MAX);
        self.created_at + chrono::Duration::milliseconds(ttl)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Instant before which a `PROCESSING` claim counts as abandoned. Such
    /// rows are claimable and expirable again.
    pub fn stale_claim_cutoff(now: DateTime<Utc>, claim_lease_ms: u64) -> DateTime<Utc> {
        let lease = i64::try_from(claim_lease_ms).unwrap_or(i64::MAX);
        now.checked_sub_signed(chrono::Duration::milliseconds(lease))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Rebuilds the device envelope for a redelivery attempt.
    pub fn to_message(&self) -> DeviceMessage {
        DeviceMessage {
            device_id: self.device_id.clone(),
            message_type: self.message_type,
            payload: self.payload.clone(),
            message_id: self.message_id.clone(),
            priority: self.priority,
            timestamp: self.created_at.timestamp_millis(),
            ttl_ms: self.ttl_ms,
        }
    }
}

// --- Update sessions ---

/// What an update session delivers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateKind {
    Firmware,
    Configuration,
}

/// State of an update session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStatus {
    Initiated,
    Preparing,
    Transferring,
    Validating,
    Applying,
    Restarting,
    Verifying,
    Completed,
    Failed,
    RollingBack,
    RolledBack,
    CriticalFailure,
}

impl UpdateStatus {
    pub const ALL: [UpdateStatus; 12] = [
        UpdateStatus::Initiated,
        UpdateStatus::Preparing,
        UpdateStatus::Transferring,
        UpdateStatus::Validating,
        UpdateStatus::Applying,
        UpdateStatus::Restarting,
        UpdateStatus::Verifying,
        UpdateStatus::Completed,
        UpdateStatus::Failed,
        UpdateStatus::RollingBack,
        UpdateStatus::RolledBack,
        UpdateStatus::CriticalFailure,
    ];

    /// Terminal sessions are immutable.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UpdateStatus::Completed
                | UpdateStatus::Failed
                | UpdateStatus::RolledBack
                | UpdateStatus::CriticalFailure
        )
    }

    /// Whether `next` is an edge of the session state graph.
    pub fn can_transition_to(self, next: UpdateStatus) -> bool {
        use UpdateStatus::*;

        match self {
            Initiated => matches!(next, Preparing | Failed),
            Preparing => matches!(next, Transferring | Failed),
            Transferring => matches!(next, Validating | Failed),
            Validating => matches!(next, Applying | Failed),
            Applying => matches!(next, Restarting | Failed),
            Restarting => matches!(next, Verifying | Failed),
            Verifying => matches!(next, Completed | RollingBack | Failed),
            RollingBack => matches!(next, RolledBack | CriticalFailure | Failed),
            Completed | Failed | RolledBack | CriticalFailure => false,
        }
    }
}

/// Caller-supplied options for a new update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOptions {
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub force_update: Option<bool>,
    #[serde(default)]
    pub skip_verification: Option<bool>,
    #[serde(default)]
    pub update_timeout_ms: Option<u64>,
}

/// Options as resolved and stored on a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    pub force_update: bool,
    pub skip_verification: bool,
    pub update_timeout_ms: u64,
}

/// One rollout attempt of an artifact to one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSession {
    pub id: String,
    pub device_id: String,
    pub kind: UpdateKind,
    pub status: UpdateStatus,
    pub source_artifact_id: String,
    pub version: String,
    pub checksum: String,
    pub chunk_size: u32,
    pub total_chunks: u32,
    pub sent_chunks: u32,
    pub acknowledged_chunks: u32,
    pub options: SessionOptions,
    pub expected_duration_ms: u64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UpdateSession {
    /// `acknowledged ≤ sent ≤ total`.
    pub fn counters_consistent(&self) -> bool {
        self.acknowledged_chunks <= self.sent_chunks && self.sent_chunks <= self.total_chunks
    }

    /// Fraction of chunks acknowledged, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.total_chunks == 0 {
            return 1.0;
        }
        f64::from(self.acknowledged_chunks) / f64::from(self.total_chunks)
    }
}

/// Status value carried in a device's update report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceReportStatus {
    Ready,
    ChunkReceived,
    ValidationComplete,
    UpdateApplied,
    RestartComplete,
    VerificationPassed,
    UpdateFailed,
    RollbackComplete,
}

/// The `updateStatus` object of a `DEVICE_STATUS` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusReport {
    pub status: DeviceReportStatus,
    #[serde(default)]
    pub chunk_id: Option<u32>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl UpdateStatusReport {
    pub fn new(status: DeviceReportStatus) -> Self {
        Self {
            status,
            chunk_id: None,
            progress: None,
            error: None,
            message: None,
        }
    }

    pub fn chunk_received(chunk_id: u32) -> Self {
        Self {
            chunk_id: Some(chunk_id),
            ..Self::new(DeviceReportStatus::ChunkReceived)
        }
    }

    /// Extracts the report from a `DEVICE_STATUS` message payload, if present.
    pub fn from_payload(payload: &serde_json::Value) -> Option<Result<Self, serde_json::Error>> {
        payload
            .get("updateStatus")
            .map(|v| serde_json::from_value(v.clone()))
    }
}
