// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders for the update messages sent to devices.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use otalink_core::{
    ChecksumAlgorithm, DeviceMessage, MessagePriority, MessageType, UpdateSession,
};
use serde_json::json;

/// `UPDATE_PREPARE`: announces the artifact and its geometry.
pub fn prepare(session: &UpdateSession, total_size: usize, ttl_ms: u64) -> DeviceMessage {
    DeviceMessage::new(
        &session.device_id,
        MessageType::UpdatePrepare,
        json!({
            "updateId": session.id,
            "updateType": session.kind,
            "version": session.version,
            "totalSize": total_size,
            "chunkSize": session.chunk_size,
            "totalChunks": session.total_chunks,
            "checksum": session.checksum,
            "forceUpdate": session.options.force_update,
        }),
        format!("prepare_{}", session.id),
        MessagePriority::High,
        ttl_ms,
    )
}

/// `UPDATE_CHUNK`: one base64-encoded slice with its own checksum.
pub fn chunk(
    session: &UpdateSession,
    index: u32,
    data: &[u8],
    algorithm: ChecksumAlgorithm,
    ttl_ms: u64,
) -> DeviceMessage {
    DeviceMessage::new(
        &session.device_id,
        MessageType::UpdateChunk,
        json!({
            "updateId": session.id,
            "chunkIndex": index,
            "totalChunks": session.total_chunks,
            "data": BASE64.encode(data),
            "checksum": algorithm.compute(data),
        }),
        format!("chunk_{}_{index}", session.id),
        MessagePriority::High,
        ttl_ms,
    )
}

/// `UPDATE_FINALIZE`: every chunk was acknowledged.
pub fn finalize(session: &UpdateSession, ttl_ms: u64) -> DeviceMessage {
    DeviceMessage::new(
        &session.device_id,
        MessageType::UpdateFinalize,
        json!({
            "updateId": session.id,
            "checksum": session.checksum,
        }),
        format!("finalize_{}", session.id),
        MessagePriority::High,
        ttl_ms,
    )
}

/// `UPDATE_ROLLBACK`: revert to the previous image.
pub fn rollback(session: &UpdateSession, ttl_ms: u64) -> DeviceMessage {
    DeviceMessage::new(
        &session.device_id,
        MessageType::UpdateRollback,
        json!({ "updateId": session.id }),
        format!("rollback_{}", session.id),
        MessagePriority::Critical,
        ttl_ms,
    )
}
