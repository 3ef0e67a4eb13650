// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only registry of transport channels keyed by transport type.

use std::sync::Arc;

use arc_swap::ArcSwap;
use otalink_core::DeviceChannel;
use tracing::info;

#[derive(Clone)]
struct RegistryEntry {
    channel_type: String,
    channels: Vec<Arc<dyn DeviceChannel>>,
}

/// One channel selected for a delivery attempt.
#[derive(Clone)]
pub struct Candidate {
    pub channel_type: String,
    pub channel: Arc<dyn DeviceChannel>,
}

/// Transport channels grouped by type, in registration order.
///
/// Readers take a lock-free snapshot; registration swaps in a new vector.
pub struct ChannelRegistry {
    entries: ArcSwap<Vec<RegistryEntry>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Appends a channel under `channel_type`. Several channels per type
    /// are allowed and keep their registration order.
    pub fn register(&self, channel_type: &str, channel: Arc<dyn DeviceChannel>) {
        self.entries.rcu(|current| {
            let mut next = Vec::clone(current);
            match next.iter_mut().find(|e| e.channel_type == channel_type) {
                Some(entry) => entry.channels.push(Arc::clone(&channel)),
                None => next.push(RegistryEntry {
                    channel_type: channel_type.to_string(),
                    channels: vec![Arc::clone(&channel)],
                }),
            }
            next
        });
        info!(channel_type, channel = channel.name(), "channel registered");
    }

    /// Drops every registered channel.
    pub fn clear(&self) {
        self.entries.store(Arc::new(Vec::new()));
    }

    /// Registered transport types in registration order.
    pub fn channel_types(&self) -> Vec<String> {
        self.entries
            .load()
            .iter()
            .map(|e| e.channel_type.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.load().iter().map(|e| e.channels.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Orders channels for a device: the preferred types first, in
    /// preference order, then every other type in registration order.
    pub fn candidates(&self, preferred: &[String]) -> Vec<Candidate> {
        let entries = self.entries.load();
        let mut ordered: Vec<&RegistryEntry> = Vec::with_capacity(entries.len());

        for channel_type in preferred {
            if let Some(entry) = entries.iter().find(|e| &e.channel_type == channel_type)
                && !ordered.iter().any(|e| e.channel_type == entry.channel_type)
            {
                ordered.push(entry);
            }
        }
        for entry in entries.iter() {
            if !ordered.iter().any(|e| e.channel_type == entry.channel_type) {
                ordered.push(entry);
            }
        }

        ordered
            .into_iter()
            .flat_map(|entry| {
                entry.channels.iter().map(move |channel| Candidate {
                    channel_type: entry.channel_type.clone(),
                    channel: Arc::clone(channel),
                })
            })
            .collect()
    }
}
