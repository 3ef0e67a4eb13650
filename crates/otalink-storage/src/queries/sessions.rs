// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Update session persistence.

use otalink_core::{OtalinkError, UpdateSession};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_ts, from_sql_int, parse_enum, parse_json, parse_opt_ts, parse_ts, to_json, to_sql_int};
use crate::database::{map_tr_err, Database};

const SELECT_COLUMNS: &str = "SELECT id, device_id, kind, status, source_artifact_id, version,
        checksum, chunk_size, total_chunks, sent_chunks, acknowledged_chunks, options,
        expected_duration_ms, error, started_at, last_activity_at, completed_at
    FROM update_sessions";

const NON_TERMINAL: &str =
    "status NOT IN ('COMPLETED', 'FAILED', 'ROLLED_BACK', 'CRITICAL_FAILURE')";

fn row_to_session(row: &Row<'_>) -> Result<UpdateSession, rusqlite::Error> {
    let kind: String = row.get(2)?;
    let status: String = row.get(3)?;
    let options: String = row.get(11)?;
    let expected_duration_ms: i64 = row.get(12)?;
    let started_at: String = row.get(14)?;
    let last_activity_at: String = row.get(15)?;

    Ok(UpdateSession {
        id: row.get(0)?,
        device_id: row.get(1)?,
        kind: parse_enum(2, &kind)?,
        status: parse_enum(3, &status)?,
        source_artifact_id: row.get(4)?,
        version: row.get(5)?,
        checksum: row.get(6)?,
        chunk_size: row.get(7)?,
        total_chunks: row.get(8)?,
        sent_chunks: row.get(9)?,
        acknowledged_chunks: row.get(10)?,
        options: parse_json(11, &options)?,
        expected_duration_ms: from_sql_int(12, expected_duration_ms)?,
        error: row.get(13)?,
        started_at: parse_ts(14, &started_at)?,
        last_activity_at: parse_ts(15, &last_activity_at)?,
        completed_at: parse_opt_ts(16, row.get(16)?)?,
    })
}

/// Inserts a new session row.
pub async fn insert_session(db: &Database, session: &UpdateSession) -> Result<(), OtalinkError> {
    let s = session.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO update_sessions
                    (id, device_id, kind, status, source_artifact_id, version, checksum,
                     chunk_size, total_chunks, sent_chunks, acknowledged_chunks, options,
                     expected_duration_ms, error, started_at, last_activity_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    s.id,
                    s.device_id,
                    s.kind.to_string(),
                    s.status.to_string(),
                    s.source_artifact_id,
                    s.version,
                    s.checksum,
                    s.chunk_size,
                    s.total_chunks,
                    s.sent_chunks,
                    s.acknowledged_chunks,
                    to_json(&s.options)?,
                    to_sql_int(s.expected_duration_ms),
                    s.error,
                    format_ts(&s.started_at),
                    format_ts(&s.last_activity_at),
                    s.completed_at.as_ref().map(format_ts),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Overwrites the mutable fields of an existing session.
///
/// Returns [`OtalinkError::SessionNotFound`] when no row has the session's ID.
pub async fn update_session(db: &Database, session: &UpdateSession) -> Result<(), OtalinkError> {
    let s = session.clone();
    let id = s.id.clone();
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE update_sessions
                 SET status = ?1, sent_chunks = ?2, acknowledged_chunks = ?3, error = ?4,
                     last_activity_at = ?5, completed_at = ?6
                 WHERE id = ?7",
                params![
                    s.status.to_string(),
                    s.sent_chunks,
                    s.acknowledged_chunks,
                    s.error,
                    format_ts(&s.last_activity_at),
                    s.completed_at.as_ref().map(format_ts),
                    s.id,
                ],
            )
        })
        .await
        .map_err(map_tr_err)?;

    if changed == 0 {
        return Err(OtalinkError::SessionNotFound(id));
    }
    Ok(())
}

/// Fetches a session by ID.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<UpdateSession>, OtalinkError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<UpdateSession>, rusqlite::Error> {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                row_to_session,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// The most recently started non-terminal session for a device.
pub async fn find_active_session(
    db: &Database,
    device_id: &str,
) -> Result<Option<UpdateSession>, OtalinkError> {
    let device_id = device_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<UpdateSession>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "{SELECT_COLUMNS} WHERE device_id = ?1 AND {NON_TERMINAL}
                     ORDER BY started_at DESC, rowid DESC LIMIT 1"
                ),
                params![device_id],
                row_to_session,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Lists sessions newest first, optionally for one device.
pub async fn list_sessions(
    db: &Database,
    device_id: Option<&str>,
) -> Result<Vec<UpdateSession>, OtalinkError> {
    let device_id = device_id.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<Vec<UpdateSession>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE (?1 IS NULL OR device_id = ?1)
                 ORDER BY started_at DESC, rowid DESC"
            ))?;
            let rows = stmt.query_map(params![device_id], row_to_session)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use otalink_core::{SessionOptions, UpdateKind, UpdateStatus};

    use super::*;

    fn session(id: &str, device: &str) -> UpdateSession {
        let now = Utc::now();
        UpdateSession {
            id: id.into(),
            device_id: device.into(),
            kind: UpdateKind::Firmware,
            status: UpdateStatus::Initiated,
            source_artifact_id: "fw-1".into(),
            version: "2.0.0".into(),
            checksum: "0001a2b3".into(),
            chunk_size: 4096,
            total_chunks: 3,
            sent_chunks: 0,
            acknowledged_chunks: 0,
            options: SessionOptions {
                force_update: false,
                skip_verification: true,
                update_timeout_ms: 300_000,
            },
            expected_duration_ms: 33_000,
            error: None,
            started_at: now,
            last_activity_at: now,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn insert_get_and_update() {
        let db = Database::open_in_memory().await.unwrap();
        let mut s = session("s1", "dev-1");
        insert_session(&db, &s).await.unwrap();

        let loaded = get_session(&db, "s1").await.unwrap().unwrap();
        assert_eq!(loaded.status, UpdateStatus::Initiated);
        assert!(loaded.options.skip_verification);
        assert_eq!(loaded.total_chunks, 3);

        s.status = UpdateStatus::Failed;
        s.sent_chunks = 2;
        s.acknowledged_chunks = 1;
        s.error = Some("Prepare timeout".into());
        s.completed_at = Some(Utc::now());
        update_session(&db, &s).await.unwrap();

        let loaded = get_session(&db, "s1").await.unwrap().unwrap();
        assert_eq!(loaded.status, UpdateStatus::Failed);
        assert_eq!(loaded.sent_chunks, 2);
        assert_eq!(loaded.acknowledged_chunks, 1);
        assert_eq!(loaded.error.as_deref(), Some("Prepare timeout"));
        assert!(loaded.completed_at.is_some());

        assert!(get_session(&db, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_unknown_session_is_not_found() {
        let db = Database::open_in_memory().await.unwrap();
        let err = update_session(&db, &session("ghost", "dev-1")).await.unwrap_err();
        assert!(matches!(err, OtalinkError::SessionNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn counters_are_checked_by_the_schema() {
        let db = Database::open_in_memory().await.unwrap();
        let mut s = session("s1", "dev-1");
        insert_session(&db, &s).await.unwrap();
        s.acknowledged_chunks = 2;
        s.sent_chunks = 1;
        assert!(update_session(&db, &s).await.is_err());
    }

    #[tokio::test]
    async fn active_session_is_newest_non_terminal() {
        let db = Database::open_in_memory().await.unwrap();
        let mut older = session("older", "dev-1");
        older.started_at -= Duration::minutes(5);
        insert_session(&db, &older).await.unwrap();
        let newer = session("newer", "dev-1");
        insert_session(&db, &newer).await.unwrap();
        let mut done = session("done", "dev-1");
        done.started_at += Duration::minutes(1);
        done.status = UpdateStatus::Completed;
        insert_session(&db, &done).await.unwrap();

        let active = find_active_session(&db, "dev-1").await.unwrap().unwrap();
        assert_eq!(active.id, "newer");
        assert!(find_active_session(&db, "dev-2").await.unwrap().is_none());

        let listed: Vec<_> = list_sessions(&db, Some("dev-1"))
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(listed, ["done", "newer", "older"]);
        assert_eq!(list_sessions(&db, None).await.unwrap().len(), 3);
    }
}
