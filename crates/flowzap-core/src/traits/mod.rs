// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits at the engine's seams.

pub mod gateway;
pub mod registry;
pub mod snapshot;

pub use gateway::MessageGateway;
pub use registry::FunnelRegistry;
pub use snapshot::SnapshotStore;
