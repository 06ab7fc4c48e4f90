// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Free-text trigger matching with per-contact cooldown.
//!
//! Phrases are compared in insertion order and the first match wins, so
//! overlapping substring phrases resolve deterministically. A phrase inside
//! its cooldown window is treated as a non-match: externally there is no
//! difference between "no trigger" and "trigger suppressed".

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use flowzap_config::TriggerMatchMode;
use flowzap_core::error::FlowzapError;
use flowzap_core::snapshot::TriggerEntry;
use flowzap_core::types::ContactKey;

use crate::repository::ConversationRepository;

/// Parametrized phrase matcher. One instance serves one trigger class.
pub struct TriggerMatcher {
    entries: Mutex<Vec<TriggerEntry>>,
    repo: Arc<ConversationRepository>,
    mode: TriggerMatchMode,
    cooldown: ChronoDuration,
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

impl TriggerMatcher {
    pub fn new(
        repo: Arc<ConversationRepository>,
        mode: TriggerMatchMode,
        cooldown_secs: u64,
    ) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            repo,
            mode,
            cooldown: ChronoDuration::seconds(cooldown_secs as i64),
        }
    }

    /// Matches inbound text against the registered phrases.
    ///
    /// On a genuine match, records the cooldown timestamp and increments the
    /// phrase's trigger counter before returning its funnel id.
    pub async fn check(&self, key: &ContactKey, text: &str) -> Option<String> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return None;
        }

        let mut entries = self.entries.lock().await;
        for entry in entries.iter_mut() {
            if !entry.active {
                continue;
            }
            let phrase = normalize(&entry.phrase);
            let hit = match self.mode {
                TriggerMatchMode::Exact => normalized == phrase,
                TriggerMatchMode::Contains => normalized.contains(&phrase),
            };
            if !hit {
                continue;
            }

            if let Some(last) = self.repo.cooldown_for(key, &entry.phrase) {
                if chrono::Utc::now() - last < self.cooldown {
                    debug!(contact = %key, phrase = %entry.phrase, "trigger suppressed by cooldown");
                    return None;
                }
            }

            self.repo.set_cooldown(key, &entry.phrase);
            entry.trigger_count += 1;
            info!(
                contact = %key,
                phrase = %entry.phrase,
                funnel = %entry.funnel_id,
                count = entry.trigger_count,
                "trigger phrase matched"
            );
            return Some(entry.funnel_id.clone());
        }

        None
    }

    /// Registers a phrase. Rejects duplicates (after trimming).
    pub async fn add(&self, entry: TriggerEntry) -> Result<(), FlowzapError> {
        let phrase = entry.phrase.trim().to_string();
        if phrase.is_empty() {
            return Err(FlowzapError::Validation("trigger phrase is empty".into()));
        }
        let mut entries = self.entries.lock().await;
        if entries.iter().any(|e| e.phrase == phrase) {
            return Err(FlowzapError::Validation(format!(
                "trigger phrase `{phrase}` already registered"
            )));
        }
        entries.push(TriggerEntry { phrase, ..entry });
        Ok(())
    }

    /// Updates a phrase's funnel and/or active flag; returns whether it exists.
    pub async fn update(
        &self,
        phrase: &str,
        funnel_id: Option<String>,
        active: Option<bool>,
    ) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.iter_mut().find(|e| e.phrase == phrase) else {
            return false;
        };
        if let Some(funnel_id) = funnel_id {
            entry.funnel_id = funnel_id;
        }
        if let Some(active) = active {
            entry.active = active;
        }
        true
    }

    pub async fn remove(&self, phrase: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.phrase != phrase);
        entries.len() != before
    }

    pub async fn list(&self) -> Vec<TriggerEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Replaces all entries, preserving the given order. Used on restore.
    pub async fn replace_all(&self, entries: Vec<TriggerEntry>) {
        *self.entries.lock().await = entries;
    }
}
