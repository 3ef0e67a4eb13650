// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `otalink queue` commands.

use std::io::IsTerminal;

use chrono::Utc;
use otalink_core::{OtalinkError, QueueStatus, QueuedMessage, StorageAdapter};
use tracing::info;

pub async fn run_list(
    storage: &dyn StorageAdapter,
    status: Option<QueueStatus>,
    device_id: Option<&str>,
    json: bool,
    plain: bool,
) -> Result<(), OtalinkError> {
    let rows = storage.list_queued(device_id, status).await?;
    if json {
        let rendered = serde_json::to_string_pretty(&rows)
            .map_err(|e| OtalinkError::Internal(e.to_string()))?;
        println!("{rendered}");
        return Ok(());
    }

    if rows.is_empty() {
        println!("queue is empty");
        return Ok(());
    }
    let use_color = !plain && std::io::stdout().is_terminal();
    println!(
        "{:>6}  {:<16}  {:<28}  {:<16}  {:<8}  {:<10}  {:>7}  ERROR",
        "ROW", "DEVICE", "MESSAGE", "TYPE", "PRIORITY", "STATUS", "RETRIES"
    );
    for row in &rows {
        println!("{}", queue_row(row, use_color));
    }
    Ok(())
}

/// Expires every pending row whose TTL has elapsed, including rows an
/// interrupted sweep left claimed for longer than `claim_lease_ms`.
pub async fn run_expire(
    storage: &dyn StorageAdapter,
    claim_lease_ms: u64,
) -> Result<(), OtalinkError> {
    let now = Utc::now();
    let stale_before = QueuedMessage::stale_claim_cutoff(now, claim_lease_ms);
    let expired = storage.expire_queued(now, stale_before).await?;
    info!(expired, "expired stale queued messages");
    println!("expired {expired} message(s)");
    Ok(())
}

fn status_label(status: QueueStatus, use_color: bool) -> String {
    let label = status.to_string();
    if !use_color {
        return label;
    }
    use colored::Colorize;
    match status {
        QueueStatus::Sent => label.green().to_string(),
        QueueStatus::Failed => label.red().to_string(),
        QueueStatus::Expired => label.dimmed().to_string(),
        QueueStatus::Queued | QueueStatus::Processing => label.yellow().to_string(),
    }
}

fn queue_row(row: &QueuedMessage, use_color: bool) -> String {
    format!(
        "{:>6}  {:<16}  {:<28}  {:<16}  {:<8}  {:<10}  {:>7}  {}",
        row.id,
        row.device_id,
        row.message_id,
        row.message_type.to_string(),
        row.priority.to_string(),
        status_label(row.status, use_color),
        row.retry_count,
        row.error.as_deref().unwrap_or("-"),
    )
}
