// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opaque persistence hooks for the in-memory authority.

use async_trait::async_trait;

use crate::error::FlowzapError;
use crate::snapshot::SystemSnapshot;

/// Load-at-startup / flush-on-demand persistence of repository contents.
///
/// The engine treats snapshots as opaque: format, layout, and flush
/// scheduling belong to the implementation and the hosting binary.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Loads the last snapshot, or `None` when nothing was persisted yet.
    async fn load(&self) -> Result<Option<SystemSnapshot>, FlowzapError>;

    /// Persists the given snapshot, replacing any previous one.
    async fn flush(&self, snapshot: &SystemSnapshot) -> Result<(), FlowzapError>;
}
