// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use otalink_config::model::StorageConfig;
use otalink_core::{OtalinkError, QueueStatus, QueuedMessage, StorageAdapter, UpdateSession};
use tracing::debug;

use crate::database::Database;
use crate::queries::{queue, sessions};

/// SQLite-backed storage adapter delegating to the typed query modules.
#[derive(Clone)]
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    /// Opens the database described by `config`.
    pub async fn open(config: &StorageConfig) -> Result<Self, OtalinkError> {
        let db = Database::open_with_options(&config.database_path, config.wal_mode).await?;
        Ok(Self { db })
    }

    /// A throwaway in-memory store.
    pub async fn in_memory() -> Result<Self, OtalinkError> {
        Ok(Self {
            db: Database::open_in_memory().await?,
        })
    }

    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn enqueue(&self, message: &QueuedMessage) -> Result<i64, OtalinkError> {
        let id = queue::enqueue_message(&self.db, message).await?;
        debug!(
            row_id = id,
            device_id = %message.device_id,
            message_id = %message.message_id,
            "message enqueued"
        );
        Ok(id)
    }

    async fn claim_queued(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QueuedMessage>, OtalinkError> {
        queue::claim_queued_messages(&self.db, now, stale_before, limit).await
    }

    async fn mark_sent(&self, id: i64) -> Result<(), OtalinkError> {
        queue::mark_message_sent(&self.db, id).await
    }

    async fn record_failure(
        &self,
        id: i64,
        error: &str,
        max_retries: u32,
    ) -> Result<QueueStatus, OtalinkError> {
        queue::record_delivery_failure(&self.db, id, error, max_retries, Utc::now()).await
    }

    async fn expire_queued(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<u64, OtalinkError> {
        queue::expire_queued_messages(&self.db, now, stale_before).await
    }

    async fn list_queued(
        &self,
        device_id: Option<&str>,
        status: Option<QueueStatus>,
    ) -> Result<Vec<QueuedMessage>, OtalinkError> {
        queue::list_queued_messages(&self.db, device_id, status).await
    }

    async fn create_session(&self, session: &UpdateSession) -> Result<(), OtalinkError> {
        sessions::insert_session(&self.db, session).await
    }

    async fn update_session(&self, session: &UpdateSession) -> Result<(), OtalinkError> {
        sessions::update_session(&self.db, session).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<UpdateSession>, OtalinkError> {
        sessions::get_session(&self.db, id).await
    }

    async fn active_session_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<UpdateSession>, OtalinkError> {
        sessions::find_active_session(&self.db, device_id).await
    }

    async fn list_sessions(
        &self,
        device_id: Option<&str>,
    ) -> Result<Vec<UpdateSession>, OtalinkError> {
        sessions::list_sessions(&self.db, device_id).await
    }

    async fn close(&self) -> Result<(), OtalinkError> {
        self.db.close().await
    }
}
