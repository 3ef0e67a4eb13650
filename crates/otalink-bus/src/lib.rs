// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed internal pub/sub for the otalink update delivery core.
//!
//! Producers publish [`BusEvent`] values; consumers subscribe to everything
//! or to a `(device, kinds)` filter. Each event variant has a fixed payload
//! shape, so producer and consumer agree at compile time.

pub mod events;

pub use events::{BusEvent, EventKind};

use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Broadcast bus for [`BusEvent`]s.
///
/// Cloning is cheap and every clone publishes into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event. Returns the number of subscribers it reached.
    pub fn publish(&self, event: BusEvent) -> usize {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                debug!(event = %kind, "event published with no subscribers");
                0
            }
        }
    }

    /// Subscribes to every event published from now on.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            device_id: None,
            kinds: Vec::new(),
        }
    }

    /// Subscribes to events of the given kinds, optionally restricted to one
    /// device. An empty `kinds` list matches every kind.
    pub fn subscribe_filtered(
        &self,
        device_id: Option<&str>,
        kinds: &[EventKind],
    ) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            device_id: device_id.map(str::to_string),
            kinds: kinds.to_vec(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// A filtered receiving end of the bus.
pub struct EventSubscription {
    rx: broadcast::Receiver<BusEvent>,
    device_id: Option<String>,
    kinds: Vec<EventKind>,
}

impl EventSubscription {
    fn matches(&self, event: &BusEvent) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind()) {
            return false;
        }
        match &self.device_id {
            Some(device) => event.device_id() == device,
            None => true,
        }
    }

    /// Waits for the next matching event. Returns `None` once every
    /// publisher has been dropped.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next matching event already buffered, if any.
    pub fn try_recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, events dropped");
                }
                Err(_) => return None,
            }
        }
    }
}
