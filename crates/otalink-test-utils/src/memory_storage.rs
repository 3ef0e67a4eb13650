// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process [`StorageAdapter`].
//!
//! Every call completes on the calling task, so tests running with paused
//! time never see the clock jump while a write is in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use otalink_core::{OtalinkError, QueueStatus, QueuedMessage, StorageAdapter, UpdateSession};

#[derive(Default)]
struct State {
    next_id: i64,
    queue: Vec<QueuedMessage>,
    /// Claim time of every `PROCESSING` row.
    claimed_at: HashMap<i64, DateTime<Utc>>,
    sessions: Vec<UpdateSession>,
    /// Every persisted session snapshot, in write order.
    history: Vec<UpdateSession>,
}

impl State {
    /// `QUEUED`, or `PROCESSING` with a claim at or before `stale_before`.
    fn is_pending(&self, row: &QueuedMessage, stale_before: DateTime<Utc>) -> bool {
        match row.status {
            QueueStatus::Queued => true,
            QueueStatus::Processing => self
                .claimed_at
                .get(&row.id)
                .is_none_or(|claimed| *claimed <= stale_before),
            _ => false,
        }
    }
}

fn storage_error(message: &str) -> OtalinkError {
    OtalinkError::Storage {
        source: message.to_string().into(),
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
    enqueue_failing: AtomicBool,
    session_writes_failing: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every session snapshot written through `create_session` and
    /// `update_session`.
    pub fn session_history(&self, session_id: &str) -> Vec<UpdateSession> {
        self.lock()
            .history
            .iter()
            .filter(|s| s.id == session_id)
            .cloned()
            .collect()
    }

    /// Makes `enqueue` return a storage error.
    pub fn set_enqueue_failing(&self, failing: bool) {
        self.enqueue_failing.store(failing, Ordering::SeqCst);
    }

    /// Makes `update_session` return a storage error.
    pub fn set_session_writes_failing(&self, failing: bool) {
        self.session_writes_failing.store(failing, Ordering::SeqCst);
    }

    /// Simulates a sweep that claimed a row and never reported back.
    pub fn abandon_claim(&self, id: i64, claimed_at: DateTime<Utc>) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(row) = state.queue.iter_mut().find(|r| r.id == id) {
            row.status = QueueStatus::Processing;
            state.claimed_at.insert(id, claimed_at);
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn enqueue(&self, message: &QueuedMessage) -> Result<i64, OtalinkError> {
        if self.enqueue_failing.load(Ordering::SeqCst) {
            return Err(storage_error("queue unavailable"));
        }
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.queue.push(QueuedMessage {
            id,
            status: QueueStatus::Queued,
            ..message.clone()
        });
        Ok(id)
    }

    async fn claim_queued(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QueuedMessage>, OtalinkError> {
        let mut state = self.lock();
        let mut ready: Vec<usize> = state
            .queue
            .iter()
            .enumerate()
            .filter(|(_, row)| state.is_pending(row, stale_before) && !row.is_expired_at(now))
            .map(|(index, _)| index)
            .collect();
        ready.sort_by(|&a, &b| {
            let (a, b) = (&state.queue[a], &state.queue[b]);
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        ready.truncate(limit);

        let mut claimed = Vec::with_capacity(ready.len());
        for index in ready {
            state.queue[index].status = QueueStatus::Processing;
            let id = state.queue[index].id;
            state.claimed_at.insert(id, now);
            claimed.push(state.queue[index].clone());
        }
        Ok(claimed)
    }

    async fn mark_sent(&self, id: i64) -> Result<(), OtalinkError> {
        let mut state = self.lock();
        state.claimed_at.remove(&id);
        if let Some(row) = state.queue.iter_mut().find(|r| r.id == id) {
            row.status = QueueStatus::Sent;
            row.error = None;
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        id: i64,
        error: &str,
        max_retries: u32,
    ) -> Result<QueueStatus, OtalinkError> {
        let mut state = self.lock();
        state.claimed_at.remove(&id);
        let row = state
            .queue
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| OtalinkError::Internal(format!("queued message {id} not found")))?;
        row.retry_count = row.retry_count.saturating_add(1);
        row.last_retry_at = Some(Utc::now());
        row.error = Some(error.to_string());
        row.status = if row.retry_count >= max_retries {
            QueueStatus::Failed
        } else {
            QueueStatus::Queued
        };
        Ok(row.status)
    }

    async fn expire_queued(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<u64, OtalinkError> {
        let mut state = self.lock();
        let stale: Vec<usize> = state
            .queue
            .iter()
            .enumerate()
            .filter(|(_, row)| state.is_pending(row, stale_before) && row.is_expired_at(now))
            .map(|(index, _)| index)
            .collect();
        for &index in &stale {
            state.queue[index].status = QueueStatus::Expired;
            let id = state.queue[index].id;
            state.claimed_at.remove(&id);
        }
        Ok(stale.len() as u64)
    }

    async fn list_queued(
        &self,
        device_id: Option<&str>,
        status: Option<QueueStatus>,
    ) -> Result<Vec<QueuedMessage>, OtalinkError> {
        Ok(self
            .lock()
            .queue
            .iter()
            .filter(|r| device_id.is_none_or(|d| r.device_id == d))
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect())
    }

    async fn create_session(&self, session: &UpdateSession) -> Result<(), OtalinkError> {
        let mut state = self.lock();
        state.sessions.push(session.clone());
        state.history.push(session.clone());
        Ok(())
    }

    async fn update_session(&self, session: &UpdateSession) -> Result<(), OtalinkError> {
        if self.session_writes_failing.load(Ordering::SeqCst) {
            return Err(storage_error("session store unavailable"));
        }
        let mut state = self.lock();
        let slot = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session.id)
            .ok_or_else(|| OtalinkError::SessionNotFound(session.id.clone()))?;
        *slot = session.clone();
        state.history.push(session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<UpdateSession>, OtalinkError> {
        Ok(self.lock().sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn active_session_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<UpdateSession>, OtalinkError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .filter(|s| s.device_id == device_id && !s.status.is_terminal())
            .max_by_key(|s| s.started_at)
            .cloned())
    }

    async fn list_sessions(
        &self,
        device_id: Option<&str>,
    ) -> Result<Vec<UpdateSession>, OtalinkError> {
        let mut sessions: Vec<UpdateSession> = self
            .lock()
            .sessions
            .iter()
            .filter(|s| device_id.is_none_or(|d| s.device_id == d))
            .cloned()
            .collect();
        sessions.reverse();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    async fn close(&self) -> Result<(), OtalinkError> {
        Ok(())
    }
}
