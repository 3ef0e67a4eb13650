// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport channel trait (MQTT, BLE, HTTP, ...).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::OtalinkError;
use crate::types::{ConnectionState, DeviceMessage, MessagePriority, SendResult};

/// Receives inbound device messages from a listening channel.
pub trait MessageSink: Send + Sync {
    /// Hands one inbound message to the core. Must not block.
    fn deliver(&self, message: DeviceMessage);
}

/// One transport towards devices.
///
/// Several instances of the same transport type may be registered; the
/// dispatcher tries them in registration order.
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    /// Instance name used in events and logs, e.g. `"mqtt-primary"`.
    fn name(&self) -> &str;

    /// Opens a connection to the device. `Ok(false)` means the device was
    /// reachable but refused.
    async fn connect(&self, device_id: &str) -> Result<bool, OtalinkError>;

    async fn disconnect(&self, device_id: &str) -> Result<(), OtalinkError>;

    /// Attempts a single delivery.
    async fn send_message(&self, message: &DeviceMessage) -> Result<SendResult, OtalinkError>;

    /// Starts forwarding inbound messages from `device_id` to `sink`.
    async fn start_listening(
        &self,
        device_id: &str,
        sink: Arc<dyn MessageSink>,
    ) -> Result<(), OtalinkError>;

    /// Current state of this transport towards `device_id`.
    async fn connection_state(&self, device_id: &str) -> ConnectionState;

    /// Whether the transport honors the given priority. Transports that
    /// cannot are skipped for such messages when priority filtering is on.
    fn supports_priority(&self, _priority: MessagePriority) -> bool {
        true
    }
}
