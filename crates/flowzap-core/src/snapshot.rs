// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serializable image of the engine's in-memory authority.
//!
//! Cooldown timestamps and pending payment-wait timers are deliberately not
//! part of the snapshot: a restart forfeits running timers and cooldown
//! history, matching the single-process in-memory authority model.

use serde::{Deserialize, Serialize};

use crate::conversation::Conversation;
use crate::funnel::Funnel;
use crate::types::{ChannelId, ContactKey};

/// A registered free-text trigger phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEntry {
    pub phrase: String,
    pub funnel_id: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub trigger_count: u64,
}

fn default_active() -> bool {
    true
}

impl TriggerEntry {
    pub fn new(phrase: impl Into<String>, funnel_id: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            funnel_id: funnel_id.into(),
            active: true,
            trigger_count: 0,
        }
    }
}

/// Everything the snapshot store persists and restores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemSnapshot {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub phone_index: Vec<(String, ContactKey)>,
    #[serde(default)]
    pub sticky_channels: Vec<(ContactKey, ChannelId)>,
    #[serde(default)]
    pub funnels: Vec<Funnel>,
    #[serde(default)]
    pub triggers: Vec<TriggerEntry>,
}
