// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Funnel definition lookup.

use crate::funnel::Funnel;

/// Read/write access to funnel definitions.
///
/// The engine itself only ever calls [`get`](FunnelRegistry::get); the
/// editing surface exists for the administrative layer.
pub trait FunnelRegistry: Send + Sync {
    fn get(&self, id: &str) -> Option<Funnel>;

    fn list(&self) -> Vec<Funnel>;

    fn upsert(&self, funnel: Funnel);

    /// Removes a definition; returns whether it existed.
    fn remove(&self, id: &str) -> bool;
}
