// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Update session state machine and update facade.
//!
//! [`UpdateEngine`] owns the per-session actors that walk an update through
//! prepare, chunked transfer, validation, apply, restart, verification and
//! rollback. [`UpdateManager`] sits in front of it and resolves device
//! information over the event bus.

mod actor;
pub mod chunk;
pub mod engine;
pub mod facade;
pub mod protocol;

pub use engine::UpdateEngine;
pub use facade::{UpdateManager, UpdateTicket};
