// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-transport delivery with fallback to the durable queue.

use std::sync::Arc;
use std::time::Duration;

use otalink_bus::{BusEvent, EventBus};
use otalink_config::model::{DispatchConfig, QueueConfig};
use otalink_core::{
    ConnectionState, DeviceChannel, DeviceCommPreference, DeviceMessage, MessagePriority,
    MessageSink, MessageType, OtalinkError, PreferenceSource, QueuedMessage, SendResult,
    StorageAdapter,
};
use tracing::{debug, info, warn};

use crate::registry::{Candidate, ChannelRegistry};
use crate::router::{DeviceSubscription, InboundRouter};

pub(crate) const NO_CHANNELS: &str = "No communication channels available";
pub(crate) const ALL_FAILED: &str = "All channels failed";

/// Routes device messages over registered transports.
///
/// Constructed once per process and shared behind an `Arc`. Registration
/// and teardown of transports go through [`register_channel`] and
/// [`clear_channels`].
///
/// [`register_channel`]: ChannelDispatcher::register_channel
/// [`clear_channels`]: ChannelDispatcher::clear_channels
pub struct ChannelDispatcher {
    registry: ChannelRegistry,
    router: Arc<InboundRouter>,
    preferences: Arc<dyn PreferenceSource>,
    pub(crate) storage: Arc<dyn StorageAdapter>,
    bus: EventBus,
    config: DispatchConfig,
    pub(crate) queue_config: QueueConfig,
}

impl ChannelDispatcher {
    pub fn new(
        preferences: Arc<dyn PreferenceSource>,
        storage: Arc<dyn StorageAdapter>,
        bus: EventBus,
        config: DispatchConfig,
        queue_config: QueueConfig,
    ) -> Self {
        Self {
            registry: ChannelRegistry::new(),
            router: Arc::new(InboundRouter::new(bus.clone())),
            preferences,
            storage,
            bus,
            config,
            queue_config,
        }
    }

    pub fn register_channel(&self, channel_type: &str, channel: Arc<dyn DeviceChannel>) {
        self.registry.register(channel_type, channel);
    }

    pub fn clear_channels(&self) {
        self.registry.clear();
        info!("all channels unregistered");
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// The sink channels should forward inbound messages to.
    pub fn message_sink(&self) -> Arc<dyn MessageSink> {
        self.router.clone()
    }

    /// Loads a device's preference. A missing or unreadable preference is
    /// treated as "no preferred transports".
    async fn preference(&self, device_id: &str) -> DeviceCommPreference {
        let fallback = || DeviceCommPreference {
            connection_timeout_ms: self.config.default_connection_timeout_ms,
            ..DeviceCommPreference::default()
        };
        match self.preferences.preferences(device_id).await {
            Ok(Some(pref)) => pref,
            Ok(None) => fallback(),
            Err(e) => {
                warn!(device_id, error = %e, "failed to load device preferences");
                fallback()
            }
        }
    }

    pub(crate) async fn candidates(
        &self,
        device_id: &str,
        priority: Option<MessagePriority>,
    ) -> Vec<Candidate> {
        let pref = self.preference(device_id).await;
        let candidates = self.registry.candidates(&pref.preferred_channels);
        match priority {
            Some(priority) if self.config.prefer_priority_support => {
                // Stable: order within each group is kept.
                let (capable, rest): (Vec<_>, Vec<_>) = candidates
                    .into_iter()
                    .partition(|c| c.channel.supports_priority(priority));
                capable.into_iter().chain(rest).collect()
            }
            _ => candidates,
        }
    }

    /// Delivers `message` over the first transport that accepts it.
    ///
    /// Returns `Err` only for malformed messages or a storage failure. When
    /// no transport delivers, the message is queued and the result carries
    /// `pending_delivery = true`.
    pub async fn send_message_to_device(
        &self,
        message: &DeviceMessage,
    ) -> Result<SendResult, OtalinkError> {
        if message.device_id.is_empty() || message.message_id.is_empty() {
            return Err(OtalinkError::InvalidMessage(
                "Invalid message format".to_string(),
            ));
        }

        let candidates = self
            .candidates(&message.device_id, Some(message.priority))
            .await;
        let error = match self.attempt_delivery(message, &candidates).await {
            Ok(result) => return Ok(result),
            Err(error) => error,
        };

        let mut row = QueuedMessage::from_message(message, Some(error.clone()));
        if row.ttl_ms == 0 {
            row.ttl_ms = self.queue_config.default_ttl_ms;
        }
        self.storage.enqueue(&row).await?;
        info!(
            device_id = %message.device_id,
            message_id = %message.message_id,
            error = %error,
            "message queued for later delivery"
        );
        self.bus.publish(BusEvent::MessageQueued {
            device_id: message.device_id.clone(),
            message_id: message.message_id.clone(),
            error: error.clone(),
        });

        Ok(SendResult::pending(message.message_id.clone(), error))
    }

    /// Tries each candidate in turn. Returns the first successful result, or
    /// the reason nothing was delivered.
    pub(crate) async fn attempt_delivery(
        &self,
        message: &DeviceMessage,
        candidates: &[Candidate],
    ) -> Result<SendResult, String> {
        if candidates.is_empty() {
            debug!(device_id = %message.device_id, "no candidate channels");
            return Err(NO_CHANNELS.to_string());
        }

        let send_timeout = Duration::from_millis(self.config.send_timeout_ms);
        for candidate in candidates {
            let channel = candidate.channel.name();
            let error = match tokio::time::timeout(
                send_timeout,
                candidate.channel.send_message(message),
            )
            .await
            {
                Ok(Ok(result)) if result.success => {
                    debug!(
                        device_id = %message.device_id,
                        message_id = %message.message_id,
                        channel,
                        "message delivered"
                    );
                    self.bus.publish(BusEvent::MessageSent {
                        device_id: message.device_id.clone(),
                        message_id: message.message_id.clone(),
                        channel: channel.to_string(),
                    });
                    return Ok(SendResult {
                        message_id: result
                            .message_id
                            .or_else(|| Some(message.message_id.clone())),
                        ..result
                    });
                }
                Ok(Ok(result)) => result
                    .error
                    .unwrap_or_else(|| "channel rejected message".to_string()),
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("send timed out after {}ms", self.config.send_timeout_ms),
            };

            warn!(
                device_id = %message.device_id,
                message_id = %message.message_id,
                channel,
                channel_type = %candidate.channel_type,
                error = %error,
                "channel delivery failed"
            );
            self.bus.publish(BusEvent::ChannelError {
                device_id: message.device_id.clone(),
                message_id: Some(message.message_id.clone()),
                channel: channel.to_string(),
                error,
            });
        }

        Err(ALL_FAILED.to_string())
    }

    /// Connects to `device_id` over the first transport that succeeds and
    /// starts listening on it. Returns `false` if no transport connected.
    pub async fn establish_connection(&self, device_id: &str) -> Result<bool, OtalinkError> {
        if device_id.is_empty() {
            return Err(OtalinkError::InvalidMessage(
                "device id must not be empty".to_string(),
            ));
        }

        let pref = self.preference(device_id).await;
        let connect_timeout = Duration::from_millis(pref.connection_timeout_ms);
        for candidate in self.registry.candidates(&pref.preferred_channels) {
            let channel = candidate.channel.name();
            let error =
                match tokio::time::timeout(connect_timeout, candidate.channel.connect(device_id))
                    .await
                {
                    Ok(Ok(true)) => {
                        info!(device_id, channel, "device connected");
                        self.bus.publish(BusEvent::DeviceConnected {
                            device_id: device_id.to_string(),
                            channel: channel.to_string(),
                        });
                        if let Err(e) = candidate
                            .channel
                            .start_listening(device_id, self.message_sink())
                            .await
                        {
                            warn!(device_id, channel, error = %e, "failed to start listening");
                        }
                        return Ok(true);
                    }
                    Ok(Ok(false)) => "connection refused".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => format!("connect timed out after {}ms", pref.connection_timeout_ms),
                };

            warn!(device_id, channel, error = %error, "connection attempt failed");
            self.bus.publish(BusEvent::ConnectionError {
                device_id: device_id.to_string(),
                channel: channel.to_string(),
                error,
            });
        }

        Ok(false)
    }

    /// Asks every candidate transport to forward inbound messages from
    /// `device_id`. Returns how many transports are listening.
    pub async fn start_listening(&self, device_id: &str) -> usize {
        let mut listening = 0;
        for candidate in self.candidates(device_id, None).await {
            match candidate
                .channel
                .start_listening(device_id, self.message_sink())
                .await
            {
                Ok(()) => listening += 1,
                Err(e) => warn!(
                    device_id,
                    channel = candidate.channel.name(),
                    error = %e,
                    "failed to start listening"
                ),
            }
        }
        listening
    }

    /// Aggregated connection state across every candidate transport.
    pub async fn get_device_connection_state(&self, device_id: &str) -> ConnectionState {
        let mut states = Vec::new();
        for candidate in self.candidates(device_id, None).await {
            states.push(candidate.channel.connection_state(device_id).await);
        }
        ConnectionState::most_alive(states)
    }

    /// Subscribes to inbound messages of the given types from one device.
    pub fn register_for_device_messages(
        &self,
        device_id: &str,
        message_types: &[MessageType],
    ) -> DeviceSubscription {
        self.router.subscribe(Some(device_id), message_types)
    }

    /// Subscribes to inbound messages of the given types from any device.
    pub fn register_for_messages(&self, message_types: &[MessageType]) -> DeviceSubscription {
        self.router.subscribe(None, message_types)
    }

    pub fn unregister(&self, subscription_id: u64) -> bool {
        self.router.unregister(subscription_id)
    }
}
