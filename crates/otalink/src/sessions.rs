// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `otalink sessions` commands.

use std::io::IsTerminal;

use otalink_core::{OtalinkError, StorageAdapter, UpdateSession, UpdateStatus};

pub async fn run_list(
    storage: &dyn StorageAdapter,
    device_id: Option<&str>,
    json: bool,
    plain: bool,
) -> Result<(), OtalinkError> {
    let sessions = storage.list_sessions(device_id).await?;
    if json {
        println!("{}", to_json(&sessions)?);
        return Ok(());
    }

    let use_color = !plain && std::io::stdout().is_terminal();
    if sessions.is_empty() {
        println!("no update sessions");
        return Ok(());
    }
    println!(
        "{:<36}  {:<16}  {:<10}  {:<16}  {:>9}  STARTED",
        "ID", "DEVICE", "VERSION", "STATUS", "PROGRESS"
    );
    for session in &sessions {
        println!("{}", session_row(session, use_color));
    }
    Ok(())
}

pub async fn run_show(
    storage: &dyn StorageAdapter,
    session_id: &str,
    json: bool,
    plain: bool,
) -> Result<(), OtalinkError> {
    let session = storage
        .get_session(session_id)
        .await?
        .ok_or_else(|| OtalinkError::SessionNotFound(session_id.to_string()))?;

    if json {
        println!("{}", to_json(&session)?);
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print!("{}", session_detail(&session, use_color));
    }
    Ok(())
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, OtalinkError> {
    serde_json::to_string_pretty(value).map_err(|e| OtalinkError::Internal(e.to_string()))
}

fn status_label(status: UpdateStatus, use_color: bool) -> String {
    let label = status.to_string();
    if !use_color {
        return label;
    }
    use colored::Colorize;
    match status {
        UpdateStatus::Completed => label.green().to_string(),
        UpdateStatus::Failed | UpdateStatus::CriticalFailure => label.red().to_string(),
        UpdateStatus::RollingBack | UpdateStatus::RolledBack => label.yellow().to_string(),
        _ => label.cyan().to_string(),
    }
}

fn session_row(session: &UpdateSession, use_color: bool) -> String {
    format!(
        "{:<36}  {:<16}  {:<10}  {:<16}  {:>8.1}%  {}",
        session.id,
        session.device_id,
        session.version,
        status_label(session.status, use_color),
        session.progress() * 100.0,
        session.started_at.format("%Y-%m-%d %H:%M:%S"),
    )
}

fn session_detail(session: &UpdateSession, use_color: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n  update session {}\n", session.id));
    out.push_str(&format!("  {}\n", "-".repeat(44)));
    out.push_str(&format!("    Device:    {}\n", session.device_id));
    out.push_str(&format!("    Kind:      {}\n", session.kind));
    out.push_str(&format!(
        "    Status:    {}\n",
        status_label(session.status, use_color)
    ));
    out.push_str(&format!(
        "    Artifact:  {} ({})\n",
        session.source_artifact_id, session.version
    ));
    out.push_str(&format!(
        "    Chunks:    {} acknowledged / {} sent / {} total ({} bytes each)\n",
        session.acknowledged_chunks, session.sent_chunks, session.total_chunks, session.chunk_size
    ));
    out.push_str(&format!("    Checksum:  {}\n", session.checksum));
    out.push_str(&format!("    Started:   {}\n", session.started_at.to_rfc3339()));
    out.push_str(&format!(
        "    Activity:  {}\n",
        session.last_activity_at.to_rfc3339()
    ));
    if let Some(completed) = session.completed_at {
        out.push_str(&format!("    Completed: {}\n", completed.to_rfc3339()));
    }
    if let Some(error) = &session.error {
        out.push_str(&format!("    Error:     {error}\n"));
    }
    out.push('\n');
    out
}
