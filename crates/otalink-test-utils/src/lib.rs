// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for otalink integration tests.
//!
//! Provides mock collaborators and a harness for fast, deterministic tests
//! without real transports or device registries.
//!
//! # Components
//!
//! - [`MockChannel`] - scripted transport that captures outbound messages
//! - [`StaticCatalog`] / [`StaticPreferences`] - fixed catalog and preference data
//! - [`MemoryStorage`] - in-process storage adapter, safe under paused time
//! - [`TestHarness`] - bus, dispatcher, engine and manager wired together

pub mod fixtures;
pub mod harness;
pub mod memory_storage;
pub mod mock_channel;

pub use fixtures::{StaticCatalog, StaticPreferences, artifact, device};
pub use harness::{EVENT_WAIT, TestHarness, TestHarnessBuilder, wait_for_event};
pub use memory_storage::MemoryStorage;
pub use mock_channel::{MockChannel, SendBehavior};
