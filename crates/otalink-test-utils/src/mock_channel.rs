// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport for deterministic testing.
//!
//! `MockChannel` implements `DeviceChannel` with a scriptable send outcome,
//! captured outbound messages, per-device connection state, and inbound
//! injection through the sinks handed to `start_listening`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use async_trait::async_trait;
use otalink_core::{
    ConnectionState, DeviceChannel, DeviceMessage, MessagePriority, MessageSink, MessageType,
    OtalinkError, SendResult,
};
use tokio::sync::{Mutex, Notify};

/// What `send_message` does with the next message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendBehavior {
    /// Accept and record the message.
    Deliver,
    /// Return `Ok` with `success = false`.
    Reject(String),
    /// Return `Err`.
    Fail(String),
    /// Never complete.
    Hang,
}

/// A scripted device transport.
///
/// - **sent**: messages accepted by `send_message`, in order
/// - **attempts**: every message passed to `send_message`, accepted or not
pub struct MockChannel {
    name: String,
    behavior: StdMutex<SendBehavior>,
    sent: Mutex<Vec<DeviceMessage>>,
    attempts: Mutex<Vec<DeviceMessage>>,
    notify: Notify,
    states: StdMutex<HashMap<String, ConnectionState>>,
    connect_outcome: StdMutex<Result<bool, String>>,
    unsupported: StdMutex<Vec<MessagePriority>>,
    sinks: StdMutex<HashMap<String, Arc<dyn MessageSink>>>,
}

impl MockChannel {
    /// Create a channel that delivers everything.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behavior: StdMutex::new(SendBehavior::Deliver),
            sent: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
            notify: Notify::new(),
            states: StdMutex::new(HashMap::new()),
            connect_outcome: StdMutex::new(Ok(true)),
            unsupported: StdMutex::new(Vec::new()),
            sinks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn set_behavior(&self, behavior: SendBehavior) {
        *lock(&self.behavior) = behavior;
    }

    pub fn set_connection_state(&self, device_id: &str, state: ConnectionState) {
        lock(&self.states).insert(device_id.to_string(), state);
    }

    /// Outcome of the next `connect` calls: `Ok(bool)` or an error message.
    pub fn set_connect_outcome(&self, outcome: Result<bool, String>) {
        *lock(&self.connect_outcome) = outcome;
    }

    /// Makes `supports_priority` return false for `priority`.
    pub fn without_priority(self, priority: MessagePriority) -> Self {
        lock(&self.unsupported).push(priority);
        self
    }

    /// Delivers `message` through the sink registered for its device.
    /// Returns `false` if nothing is listening for that device.
    pub fn inject(&self, message: DeviceMessage) -> bool {
        let sink = lock(&self.sinks).get(&message.device_id).cloned();
        match sink {
            Some(sink) => {
                sink.deliver(message);
                true
            }
            None => false,
        }
    }

    pub fn is_listening(&self, device_id: &str) -> bool {
        lock(&self.sinks).contains_key(device_id)
    }

    /// Get all messages accepted by `send_message`.
    pub async fn sent_messages(&self) -> Vec<DeviceMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_of_type(&self, message_type: MessageType) -> Vec<DeviceMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.message_type == message_type)
            .cloned()
            .collect()
    }

    /// Get every message passed to `send_message`.
    pub async fn attempted_messages(&self) -> Vec<DeviceMessage> {
        self.attempts.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }

    /// Waits until at least `count` messages of `message_type` were
    /// accepted and returns all of them. Callers bound the wait.
    pub async fn wait_for_sent(&self, message_type: MessageType, count: usize) -> Vec<DeviceMessage> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let matching = self.sent_of_type(message_type).await;
            if matching.len() >= count {
                return matching;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl DeviceChannel for MockChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self, device_id: &str) -> Result<bool, OtalinkError> {
        let outcome = lock(&self.connect_outcome).clone();
        match outcome {
            Ok(true) => {
                self.set_connection_state(device_id, ConnectionState::Connected);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(message) => Err(OtalinkError::channel(message)),
        }
    }

    async fn disconnect(&self, device_id: &str) -> Result<(), OtalinkError> {
        self.set_connection_state(device_id, ConnectionState::Disconnected);
        lock(&self.sinks).remove(device_id);
        Ok(())
    }

    async fn send_message(&self, message: &DeviceMessage) -> Result<SendResult, OtalinkError> {
        self.attempts.lock().await.push(message.clone());
        let behavior = lock(&self.behavior).clone();
        match behavior {
            SendBehavior::Deliver => {
                self.sent.lock().await.push(message.clone());
                self.notify.notify_waiters();
                Ok(SendResult::delivered(message.message_id.clone()))
            }
            SendBehavior::Reject(error) => Ok(SendResult::rejected(error)),
            SendBehavior::Fail(error) => Err(OtalinkError::channel(error)),
            SendBehavior::Hang => std::future::pending().await,
        }
    }

    async fn start_listening(
        &self,
        device_id: &str,
        sink: Arc<dyn MessageSink>,
    ) -> Result<(), OtalinkError> {
        lock(&self.sinks).insert(device_id.to_string(), sink);
        Ok(())
    }

    async fn connection_state(&self, device_id: &str) -> ConnectionState {
        lock(&self.states)
            .get(device_id)
            .copied()
            .unwrap_or(ConnectionState::Disconnected)
    }

    fn supports_priority(&self, priority: MessagePriority) -> bool {
        !lock(&self.unsupported).contains(&priority)
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn message(id: &str) -> DeviceMessage {
        DeviceMessage::new(
            "dev-1",
            MessageType::Command,
            json!({ "op": "reboot" }),
            id,
            MessagePriority::Medium,
            60_000,
        )
    }

    struct Collect(std::sync::Mutex<Vec<DeviceMessage>>);

    impl MessageSink for Collect {
        fn deliver(&self, message: DeviceMessage) {
            self.0.lock().unwrap().push(message);
        }
    }

    #[tokio::test]
    async fn deliver_captures_outbound_messages() {
        let channel = MockChannel::new("mock");
        let result = channel.send_message(&message("m1")).await.unwrap();
        assert!(result.success);
        assert_eq!(result.message_id.as_deref(), Some("m1"));
        assert_eq!(channel.sent_count().await, 1);
    }

    #[tokio::test]
    async fn reject_and_fail_are_not_recorded_as_sent() {
        let channel = MockChannel::new("mock");
        channel.set_behavior(SendBehavior::Reject("busy".into()));
        let result = channel.send_message(&message("m1")).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("busy"));

        channel.set_behavior(SendBehavior::Fail("down".into()));
        assert!(channel.send_message(&message("m2")).await.is_err());

        assert_eq!(channel.sent_count().await, 0);
        assert_eq!(channel.attempted_messages().await.len(), 2);
    }

    #[tokio::test]
    async fn connect_marks_device_connected() {
        let channel = MockChannel::new("mock");
        assert_eq!(
            channel.connection_state("dev-1").await,
            ConnectionState::Disconnected
        );
        assert!(channel.connect("dev-1").await.unwrap());
        assert_eq!(channel.connection_state("dev-1").await, ConnectionState::Connected);

        channel.set_connect_outcome(Err("refused".into()));
        assert!(channel.connect("dev-2").await.is_err());
    }

    #[tokio::test]
    async fn inject_goes_through_registered_sink() {
        let channel = MockChannel::new("mock");
        assert!(!channel.inject(message("in-1")));

        let sink = Arc::new(Collect(std::sync::Mutex::new(Vec::new())));
        channel.start_listening("dev-1", sink.clone()).await.unwrap();
        assert!(channel.inject(message("in-1")));
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn wait_for_sent_wakes_on_send() {
        let channel = Arc::new(MockChannel::new("mock"));
        let sender = channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sender.send_message(&message("late")).await.unwrap();
        });

        let sent = tokio::time::timeout(
            Duration::from_secs(2),
            channel.wait_for_sent(MessageType::Command, 1),
        )
        .await
        .expect("wait_for_sent timed out");
        assert_eq!(sent[0].message_id, "late");
    }

    #[test]
    fn priority_support_is_configurable() {
        let channel = MockChannel::new("mock").without_priority(MessagePriority::Critical);
        assert!(!channel.supports_priority(MessagePriority::Critical));
        assert!(channel.supports_priority(MessagePriority::Low));
    }
}
