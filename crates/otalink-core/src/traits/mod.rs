// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits at the seams of the delivery core.
//!
//! Transports, the firmware catalog, device preferences, and persistence are
//! all supplied from outside. Every trait uses `#[async_trait]` so it can be
//! held as `Arc<dyn Trait>`.

pub mod catalog;
pub mod channel;
pub mod preferences;
pub mod storage;

pub use catalog::FirmwareCatalog;
pub use channel::{DeviceChannel, MessageSink};
pub use preferences::PreferenceSource;
pub use storage::StorageAdapter;
