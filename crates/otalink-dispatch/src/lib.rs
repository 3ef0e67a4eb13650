// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel registry and dispatcher for the otalink update delivery core.
//!
//! The dispatcher picks transports for a device from its communication
//! preferences, falls back across every registered transport, and parks
//! undeliverable messages in the durable queue. Inbound device messages are
//! fanned out to filtered subscriptions and to the event bus.

pub mod dispatcher;
pub mod registry;
pub mod router;
pub mod sweep;

pub use dispatcher::ChannelDispatcher;
pub use registry::ChannelRegistry;
pub use router::{DeviceSubscription, InboundRouter};
pub use sweep::SweepReport;
