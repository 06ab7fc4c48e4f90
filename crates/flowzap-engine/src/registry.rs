// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory funnel registry.

use dashmap::DashMap;

use flowzap_core::funnel::Funnel;
use flowzap_core::traits::FunnelRegistry;

/// Process-local [`FunnelRegistry`] backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryFunnelRegistry {
    funnels: DashMap<String, Funnel>,
}

impl InMemoryFunnelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.funnels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funnels.is_empty()
    }
}

impl FunnelRegistry for InMemoryFunnelRegistry {
    fn get(&self, id: &str) -> Option<Funnel> {
        self.funnels.get(id).map(|f| f.clone())
    }

    fn list(&self) -> Vec<Funnel> {
        let mut all: Vec<Funnel> = self.funnels.iter().map(|f| f.clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    fn upsert(&self, funnel: Funnel) {
        self.funnels.insert(funnel.id.clone(), funnel);
    }

    fn remove(&self, id: &str) -> bool {
        self.funnels.remove(id).is_some()
    }
}
