// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The authoritative in-memory conversation store and its supporting indices.
//!
//! One repository instance owns every process-wide map: conversations keyed
//! by contact, the phone-variant index, sticky channel affinity, and trigger
//! cooldown timestamps. Per-contact mutation is serialized by the engine's
//! contact locks; the maps themselves are sharded for cross-contact access.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use flowzap_core::conversation::{Conversation, Phase};
use flowzap_core::snapshot::SystemSnapshot;
use flowzap_core::types::{ChannelId, ContactKey, COUNTRY_PREFIX};

/// Aggregate conversation counters for the operator surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RepositoryStats {
    pub active: usize,
    pub waiting_reply: usize,
    pub pending_payment: usize,
    pub completed: usize,
    pub canceled: usize,
    pub errored: usize,
    pub sticky_channels: usize,
}

/// Process-wide conversation state, constructed once at startup.
#[derive(Debug, Default)]
pub struct ConversationRepository {
    conversations: DashMap<ContactKey, Conversation>,
    phone_index: DashMap<String, ContactKey>,
    sticky: DashMap<ContactKey, ChannelId>,
    cooldowns: DashMap<(ContactKey, String), DateTime<Utc>>,
}

impl ConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the conversation for its contact.
    pub fn insert(&self, conversation: Conversation) {
        self.conversations
            .insert(conversation.contact_key.clone(), conversation);
    }

    pub fn get(&self, key: &ContactKey) -> Option<Conversation> {
        self.conversations.get(key).map(|c| c.clone())
    }

    /// Applies a mutation to the contact's conversation; returns whether one existed.
    pub fn update(&self, key: &ContactKey, f: impl FnOnce(&mut Conversation)) -> bool {
        match self.conversations.get_mut(key) {
            Some(mut conv) => {
                f(&mut conv);
                true
            }
            None => false,
        }
    }

    /// Registers the textual variants of a phone number for this contact.
    ///
    /// Both the as-received digits and the with/without-country-prefix
    /// variants resolve to the same key afterwards.
    pub fn register_phone(&self, full_phone: &str, key: &ContactKey) {
        let digits: String = full_phone.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return;
        }
        if let Some(national) = digits.strip_prefix(COUNTRY_PREFIX) {
            self.phone_index.insert(national.to_string(), key.clone());
        } else {
            self.phone_index
                .insert(format!("{COUNTRY_PREFIX}{digits}"), key.clone());
        }
        self.phone_index.insert(digits, key.clone());
    }

    pub fn lookup_phone(&self, phone: &str) -> Option<ContactKey> {
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        self.phone_index.get(&digits).map(|k| k.clone())
    }

    pub fn sticky_for(&self, key: &ContactKey) -> Option<ChannelId> {
        self.sticky.get(key).map(|c| c.clone())
    }

    pub fn set_sticky(&self, key: &ContactKey, channel: ChannelId) {
        self.sticky.insert(key.clone(), channel);
    }

    pub fn cooldown_for(&self, key: &ContactKey, phrase: &str) -> Option<DateTime<Utc>> {
        self.cooldowns
            .get(&(key.clone(), phrase.to_string()))
            .map(|t| *t)
    }

    pub fn set_cooldown(&self, key: &ContactKey, phrase: &str) {
        self.cooldowns
            .insert((key.clone(), phrase.to_string()), Utc::now());
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// All conversations, newest first.
    pub fn list(&self) -> Vec<Conversation> {
        let mut all: Vec<Conversation> =
            self.conversations.iter().map(|c| c.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    pub fn stats(&self) -> RepositoryStats {
        let mut stats = RepositoryStats {
            sticky_channels: self.sticky.len(),
            ..Default::default()
        };
        for conv in self.conversations.iter() {
            match conv.phase {
                Phase::Completed { .. } => stats.completed += 1,
                Phase::Canceled { .. } => stats.canceled += 1,
                _ if conv.has_error => stats.errored += 1,
                Phase::WaitingReply => stats.waiting_reply += 1,
                Phase::PendingPayment => stats.pending_payment += 1,
                Phase::Active => stats.active += 1,
            }
        }
        stats
    }

    /// Writes this repository's share of a snapshot.
    pub fn export_into(&self, snapshot: &mut SystemSnapshot) {
        snapshot.conversations = self.conversations.iter().map(|c| c.clone()).collect();
        snapshot.phone_index = self
            .phone_index
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        snapshot.sticky_channels = self
            .sticky
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
    }

    /// Replaces this repository's contents from a snapshot.
    pub fn restore_from(&self, snapshot: &SystemSnapshot) {
        self.conversations.clear();
        for conv in &snapshot.conversations {
            self.conversations
                .insert(conv.contact_key.clone(), conv.clone());
        }
        self.phone_index.clear();
        for (phone, key) in &snapshot.phone_index {
            self.phone_index.insert(phone.clone(), key.clone());
        }
        self.sticky.clear();
        for (key, channel) in &snapshot.sticky_channels {
            self.sticky.insert(key.clone(), channel.clone());
        }
    }
}
