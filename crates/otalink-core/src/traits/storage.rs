// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the durable queue and update sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::OtalinkError;
use crate::types::{QueueStatus, QueuedMessage, UpdateSession};

/// Persistence backend for queued messages and update sessions.
///
/// Implementations must make [`claim_queued`](Self::claim_queued) atomic:
/// a row is handed to at most one caller.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    // --- Durable queue ---

    /// Persists a `QUEUED` row and returns its row ID.
    async fn enqueue(&self, message: &QueuedMessage) -> Result<i64, OtalinkError>;

    /// Atomically moves up to `limit` unexpired rows to `PROCESSING` and
    /// stamps the claim time, highest priority first, then oldest first.
    ///
    /// Eligible rows are `QUEUED` ones plus `PROCESSING` ones claimed at or
    /// before `stale_before`, whose claimant never reported back.
    async fn claim_queued(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QueuedMessage>, OtalinkError>;

    async fn mark_sent(&self, id: i64) -> Result<(), OtalinkError>;

    /// Records a failed redelivery. The row goes back to `QUEUED`, or to
    /// `FAILED` once `max_retries` attempts have been made. Returns the new
    /// status.
    async fn record_failure(
        &self,
        id: i64,
        error: &str,
        max_retries: u32,
    ) -> Result<QueueStatus, OtalinkError>;

    /// Marks every `QUEUED` row, and every `PROCESSING` row claimed at or
    /// before `stale_before`, whose TTL has elapsed as `EXPIRED`. Returns
    /// the number of rows changed.
    async fn expire_queued(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<u64, OtalinkError>;

    /// Lists queue rows, optionally filtered by device and status.
    async fn list_queued(
        &self,
        device_id: Option<&str>,
        status: Option<QueueStatus>,
    ) -> Result<Vec<QueuedMessage>, OtalinkError>;

    // --- Update sessions ---

    async fn create_session(&self, session: &UpdateSession) -> Result<(), OtalinkError>;

    /// Overwrites the stored session with the same ID.
    async fn update_session(&self, session: &UpdateSession) -> Result<(), OtalinkError>;

    async fn get_session(&self, id: &str) -> Result<Option<UpdateSession>, OtalinkError>;

    /// The most recently started non-terminal session for a device.
    async fn active_session_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<UpdateSession>, OtalinkError>;

    /// Lists sessions, newest first.
    async fn list_sessions(
        &self,
        device_id: Option<&str>,
    ) -> Result<Vec<UpdateSession>, OtalinkError>;

    async fn close(&self) -> Result<(), OtalinkError>;
}
