// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable delivery queue operations.
//!
//! Rows move `QUEUED -> PROCESSING -> SENT | QUEUED | FAILED`, or
//! `QUEUED -> EXPIRED` once their TTL has elapsed. A `PROCESSING` row whose
//! claim is older than the lease is treated like a `QUEUED` one. Each
//! operation touches a single row, except the claim which moves a batch in
//! one transaction.

use chrono::{DateTime, Utc};
use otalink_core::{OtalinkError, QueueStatus, QueuedMessage};
use rusqlite::{params, Row};

use super::{
    format_ts, from_sql_int, parse_enum, parse_json, parse_opt_ts, to_json, to_sql_int,
};
use crate::database::{map_tr_err, Database};

const SELECT_COLUMNS: &str = "SELECT id, device_id, message_id, message_type, payload, priority,
        created_at_ms, ttl_ms, status, retry_count, last_retry_at, error
    FROM message_queue";

/// Rows a sweep may pick up or expire. `?2` is the stale-claim cutoff.
const PENDING: &str = "(status = 'QUEUED'
        OR (status = 'PROCESSING' AND (claimed_at_ms IS NULL OR claimed_at_ms <= ?2)))";

/// Higher rank is delivered first.
const PRIORITY_RANK: &str = "CASE priority
        WHEN 'CRITICAL' THEN 3
        WHEN 'HIGH' THEN 2
        WHEN 'MEDIUM' THEN 1
        ELSE 0
    END";

fn row_to_queued(row: &Row<'_>) -> Result<QueuedMessage, rusqlite::Error> {
    let payload: String = row.get(4)?;
    let message_type: String = row.get(3)?;
    let priority: String = row.get(5)?;
    let created_at_ms: i64 = row.get(6)?;
    let ttl_ms: i64 = row.get(7)?;
    let status: String = row.get(8)?;

    Ok(QueuedMessage {
        id: row.get(0)?,
        device_id: row.get(1)?,
        message_id: row.get(2)?,
        message_type: parse_enum(3, &message_type)?,
        payload: parse_json(4, &payload)?,
        priority: parse_enum(5, &priority)?,
        created_at: DateTime::from_timestamp_millis(created_at_ms)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(6, created_at_ms))?,
        ttl_ms: from_sql_int(7, ttl_ms)?,
        status: parse_enum(8, &status)?,
        retry_count: row.get(9)?,
        last_retry_at: parse_opt_ts(10, row.get(10)?)?,
        error: row.get(11)?,
    })
}

/// Persists a new `QUEUED` row. Returns the row ID.
pub async fn enqueue_message(db: &Database, message: &QueuedMessage) -> Result<i64, OtalinkError> {
    let message = message.clone();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO message_queue
                    (device_id, message_id, message_type, payload, priority,
                     created_at_ms, ttl_ms, status, retry_count, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'QUEUED', 0, ?8)",
                params![
                    message.device_id,
                    message.message_id,
                    message.message_type.to_string(),
                    to_json(&message.payload)?,
                    message.priority.to_string(),
                    message.created_at.timestamp_millis(),
                    to_sql_int(message.ttl_ms),
                    message.error,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically claims up to `limit` unexpired pending rows, highest priority
/// first and oldest first within a priority, and marks them `PROCESSING`
/// with the claim time.
pub async fn claim_queued_messages(
    db: &Database,
    now: DateTime<Utc>,
    stale_before: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<QueuedMessage>, OtalinkError> {
    let now_ms = now.timestamp_millis();
    let stale_ms = stale_before.timestamp_millis();
    let limit = to_sql_int(limit as u64);
    db.connection()
        .call(move |conn| -> Result<Vec<QueuedMessage>, rusqlite::Error> {
            let tx = conn.transaction()?;

            let claimed = {
                let sql = format!(
                    "{SELECT_COLUMNS}
                     WHERE {PENDING} AND created_at_ms + ttl_ms > ?1
                     ORDER BY {PRIORITY_RANK} DESC, created_at_ms ASC, id ASC
                     LIMIT ?3"
                );
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt.query_map(params![now_ms, stale_ms, limit], row_to_queued)?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            for entry in &claimed {
                tx.execute(
                    "UPDATE message_queue SET status = 'PROCESSING', claimed_at_ms = ?1
                     WHERE id = ?2",
                    params![now_ms, entry.id],
                )?;
            }
            tx.commit()?;

            Ok(claimed
                .into_iter()
                .map(|entry| QueuedMessage {
                    status: QueueStatus::Processing,
                    ..entry
                })
                .collect())
        })
        .await
        .map_err(map_tr_err)
}

/// Marks a row as delivered.
pub async fn mark_message_sent(db: &Database, id: i64) -> Result<(), OtalinkError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE message_queue SET status = 'SENT', error = NULL, claimed_at_ms = NULL
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Records a failed redelivery attempt.
///
/// Increments `retry_count` and stamps `last_retry_at`. The row returns to
/// `QUEUED`, or becomes `FAILED` once `retry_count` reaches `max_retries`.
pub async fn record_delivery_failure(
    db: &Database,
    id: i64,
    error: &str,
    max_retries: u32,
    now: DateTime<Utc>,
) -> Result<QueueStatus, OtalinkError> {
    let error = error.to_string();
    let now = format_ts(&now);
    db.connection()
        .call(move |conn| -> Result<QueueStatus, rusqlite::Error> {
            let tx = conn.transaction()?;
            let retry_count: u32 = tx.query_row(
                "SELECT retry_count FROM message_queue WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?;

            let retry_count = retry_count.saturating_add(1);
            let status = if retry_count >= max_retries {
                QueueStatus::Failed
            } else {
                QueueStatus::Queued
            };

            tx.execute(
                "UPDATE message_queue
                 SET status = ?1, retry_count = ?2, last_retry_at = ?3, error = ?4,
                     claimed_at_ms = NULL
                 WHERE id = ?5",
                params![status.to_string(), retry_count, now, error, id],
            )?;
            tx.commit()?;
            Ok(status)
        })
        .await
        .map_err(map_tr_err)
}

/// Marks every pending row whose TTL has elapsed as `EXPIRED`. Returns the
/// number of rows changed.
pub async fn expire_queued_messages(
    db: &Database,
    now: DateTime<Utc>,
    stale_before: DateTime<Utc>,
) -> Result<u64, OtalinkError> {
    let now_ms = now.timestamp_millis();
    let stale_ms = stale_before.timestamp_millis();
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let sql = format!(
                "UPDATE message_queue SET status = 'EXPIRED', claimed_at_ms = NULL
                 WHERE {PENDING} AND created_at_ms + ttl_ms <= ?1"
            );
            let changed = conn.execute(&sql, params![now_ms, stale_ms])?;
            Ok(changed as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Lists queue rows, oldest first, optionally filtered by device and status.
pub async fn list_queued_messages(
    db: &Database,
    device_id: Option<&str>,
    status: Option<QueueStatus>,
) -> Result<Vec<QueuedMessage>, OtalinkError> {
    let device_id = device_id.map(str::to_string);
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| -> Result<Vec<QueuedMessage>, rusqlite::Error> {
            let sql = format!(
                "{SELECT_COLUMNS}
                 WHERE (?1 IS NULL OR device_id = ?1) AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at_ms ASC, id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![device_id, status], row_to_queued)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
