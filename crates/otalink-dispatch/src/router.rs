// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound message routing.
//!
//! Channels hand every message they receive to the [`InboundRouter`], which
//! publishes it on the bus and forwards it to each matching subscription.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use otalink_bus::{BusEvent, EventBus};
use otalink_core::{DeviceMessage, MessageSink, MessageType};
use tokio::sync::mpsc;
use tracing::{debug, trace};

struct Subscription {
    id: u64,
    device_id: Option<String>,
    message_types: Vec<MessageType>,
    tx: mpsc::UnboundedSender<DeviceMessage>,
}

impl Subscription {
    fn matches(&self, message: &DeviceMessage) -> bool {
        let device_ok = self
            .device_id
            .as_deref()
            .is_none_or(|d| d == message.device_id);
        let type_ok =
            self.message_types.is_empty() || self.message_types.contains(&message.message_type);
        device_ok && type_ok
    }
}

/// Receiving end of a message subscription.
pub struct DeviceSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<DeviceMessage>,
}

impl DeviceSubscription {
    /// Handle used with [`InboundRouter::unregister`].
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next matching message, or `None` once unregistered.
    pub async fn recv(&mut self) -> Option<DeviceMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<DeviceMessage> {
        self.rx.try_recv().ok()
    }
}

/// Fan-out point for inbound device messages.
pub struct InboundRouter {
    bus: EventBus,
    next_id: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl InboundRouter {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            next_id: AtomicU64::new(1),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Subscribes to inbound messages. `None` matches every device and an
    /// empty `message_types` matches every type.
    pub fn subscribe(
        &self,
        device_id: Option<&str>,
        message_types: &[MessageType],
    ) -> DeviceSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(Subscription {
            id,
            device_id: device_id.map(str::to_string),
            message_types: message_types.to_vec(),
            tx,
        });
        debug!(subscription_id = id, device_id, "message subscription registered");
        DeviceSubscription { id, rx }
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn unregister(&self, id: u64) -> bool {
        let mut subs = self.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        before != subs.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MessageSink for InboundRouter {
    fn deliver(&self, message: DeviceMessage) {
        trace!(
            device_id = %message.device_id,
            message_id = %message.message_id,
            message_type = %message.message_type,
            "inbound device message"
        );

        {
            let mut subs = self.lock();
            // Subscriptions whose receiver is gone are pruned on the way.
            subs.retain(|sub| !sub.matches(&message) || sub.tx.send(message.clone()).is_ok());
        }

        self.bus.publish(BusEvent::DeviceMessage { message });
    }
}
