// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end update scenarios.
//!
//! `TestHarness` assembles bus, storage, dispatcher, engine and manager with
//! static collaborators. Mock transports are added per test and device
//! reports are fed in through the dispatcher's inbound sink, the same path
//! a real transport uses.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use otalink_bus::{BusEvent, EventBus, EventSubscription};
use otalink_config::model::OtalinkConfig;
use otalink_core::{
    DeviceMessage, FirmwareArtifact, MessagePriority, MessageType, OtalinkError, StorageAdapter,
    UpdateStatusReport,
};
use otalink_dispatch::ChannelDispatcher;
use otalink_storage::SqliteStorage;
use otalink_update::{UpdateEngine, UpdateManager};
use serde_json::json;

use crate::fixtures::{StaticCatalog, StaticPreferences};
use crate::memory_storage::MemoryStorage;
use crate::mock_channel::MockChannel;

/// Upper bound for waiting on an event. Longer than every engine timer so
/// that paused-time tests reach timer expiry before giving up.
pub const EVENT_WAIT: Duration = Duration::from_secs(600);

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: OtalinkConfig,
    catalog: StaticCatalog,
    preferences: StaticPreferences,
    sqlite: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config: OtalinkConfig::default(),
            catalog: StaticCatalog::new(),
            preferences: StaticPreferences::new(),
            sqlite: false,
        }
    }

    pub fn with_config(mut self, config: OtalinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a firmware artifact to the catalog.
    pub fn with_artifact(mut self, artifact: FirmwareArtifact) -> Self {
        self.catalog = self.catalog.with(artifact);
        self
    }

    pub fn with_preferences(mut self, preferences: StaticPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Use an in-memory SQLite database instead of [`MemoryStorage`].
    /// Not suitable for paused-time tests.
    pub fn with_sqlite_storage(mut self) -> Self {
        self.sqlite = true;
        self
    }

    /// Build the harness. Must run inside a tokio runtime.
    pub async fn build(self) -> Result<TestHarness, OtalinkError> {
        let bus = EventBus::new(self.config.bus.capacity);

        let memory = (!self.sqlite).then(|| Arc::new(MemoryStorage::new()));
        let storage: Arc<dyn StorageAdapter> = match &memory {
            Some(memory) => memory.clone(),
            None => Arc::new(SqliteStorage::in_memory().await?),
        };

        let catalog = Arc::new(self.catalog);
        let preferences = Arc::new(self.preferences);

        let dispatcher = Arc::new(ChannelDispatcher::new(
            preferences.clone(),
            storage.clone(),
            bus.clone(),
            self.config.dispatch.clone(),
            self.config.queue.clone(),
        ));
        let engine = UpdateEngine::new(
            dispatcher.clone(),
            catalog.clone(),
            storage.clone(),
            bus.clone(),
            self.config.update.clone(),
        );
        let manager = UpdateManager::new(engine.clone(), bus.clone(), self.config.facade.clone());

        Ok(TestHarness {
            config: self.config,
            bus,
            storage,
            memory,
            catalog,
            preferences,
            dispatcher,
            engine,
            manager,
            report_seq: AtomicU64::new(0),
        })
    }
}

/// A complete delivery core with static collaborators.
pub struct TestHarness {
    pub config: OtalinkConfig,
    pub bus: EventBus,
    pub storage: Arc<dyn StorageAdapter>,
    /// Set unless the harness was built with SQLite storage.
    pub memory: Option<Arc<MemoryStorage>>,
    pub catalog: Arc<StaticCatalog>,
    pub preferences: Arc<StaticPreferences>,
    pub dispatcher: Arc<ChannelDispatcher>,
    pub engine: UpdateEngine,
    pub manager: UpdateManager,
    report_seq: AtomicU64,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A mock transport registered under `channel_type`.
    pub fn add_channel(&self, channel_type: &str, name: &str) -> Arc<MockChannel> {
        let channel = Arc::new(MockChannel::new(name));
        self.dispatcher.register_channel(channel_type, channel.clone());
        channel
    }

    /// Subscribes to every bus event from now on.
    pub fn events(&self) -> EventSubscription {
        self.bus.subscribe()
    }

    /// Feeds a `DEVICE_STATUS` message carrying `report` into the
    /// dispatcher's inbound path, as if a transport had received it.
    pub fn device_reports(&self, device_id: &str, report: UpdateStatusReport) {
        let seq = self.report_seq.fetch_add(1, Ordering::Relaxed);
        let message = DeviceMessage::new(
            device_id,
            MessageType::DeviceStatus,
            json!({ "updateStatus": report }),
            format!("status_{seq}"),
            MessagePriority::Medium,
            60_000,
        );
        self.dispatcher.message_sink().deliver(message);
    }
}

/// Waits for the first event matching `predicate`, panicking after
/// [`EVENT_WAIT`].
pub async fn wait_for_event<F>(events: &mut EventSubscription, mut predicate: F) -> BusEvent
where
    F: FnMut(&BusEvent) -> bool,
{
    let found = tokio::time::timeout(EVENT_WAIT, async {
        while let Some(event) = events.recv().await {
            if predicate(&event) {
                return Some(event);
            }
        }
        None
    })
    .await;

    match found {
        Ok(Some(event)) => event,
        Ok(None) => panic!("event bus closed before a matching event arrived"),
        Err(_) => panic!("no matching event within {EVENT_WAIT:?}"),
    }
}
