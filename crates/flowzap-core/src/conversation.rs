// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-contact conversation state.
//!
//! The lifecycle is a tagged [`Phase`] enum rather than a set of boolean
//! flags, so illegal combinations (completed *and* canceled, waiting while
//! pending payment) are unrepresentable. The error overlay is orthogonal and
//! observational only: a conversation keeps its phase when a dispatch fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ContactKey, DeliveryTarget};

/// Lifecycle phase of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Created on a provisional payment event; no step has run yet and the
    /// payment-wait timer decides when (or whether) the funnel starts.
    PendingPayment,
    /// Mid-funnel, between steps.
    Active,
    /// Paused on a `wait_for_reply` step until the contact answers.
    WaitingReply,
    /// Terminal: every step ran.
    Completed { at: DateTime<Utc> },
    /// Terminal: superseded or administratively stopped.
    Canceled {
        at: DateTime<Utc>,
        reason: CancelReason,
    },
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed { .. } | Phase::Canceled { .. })
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Phase::Canceled { .. })
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::PendingPayment => write!(f, "pending_payment"),
            Phase::Active => write!(f, "active"),
            Phase::WaitingReply => write!(f, "waiting_reply"),
            Phase::Completed { .. } => write!(f, "completed"),
            Phase::Canceled { .. } => write!(f, "canceled"),
        }
    }
}

/// Why a conversation was canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CancelReason {
    /// Payment approved while a payment-wait funnel was running.
    PaymentApproved,
    /// A newer conversation replaced this one.
    Superseded,
    /// Operator-initiated cancel.
    Administrative,
}

/// How a conversation came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationSource {
    /// Started by a payment-provider event.
    Payment,
    /// Started by an inbound free-text trigger.
    Trigger,
}

/// The authoritative per-contact state record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub contact_key: ContactKey,
    pub target: DeliveryTarget,
    pub funnel_id: String,
    /// Current step index. Meaningful only in `Active`/`WaitingReply`.
    pub step: usize,
    #[serde(flatten)]
    pub phase: Phase,
    pub order_code: String,
    pub customer_name: String,
    pub product_code: String,
    pub amount: String,
    pub source: ConversationSource,
    pub created_at: DateTime<Utc>,
    pub last_system_message: Option<DateTime<Utc>>,
    pub last_reply: Option<DateTime<Utc>>,
    /// Set when this conversation replaced a payment-wait one.
    #[serde(default)]
    pub transferred_from_pending: bool,
    #[serde(default)]
    pub previous_funnel: Option<String>,
    /// Observational error overlay; never blocks a later manual retry.
    #[serde(default)]
    pub has_error: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Construction context shared by the engine's conversation starters.
#[derive(Debug, Clone)]
pub struct ConversationSeed {
    pub contact_key: ContactKey,
    pub target: DeliveryTarget,
    pub funnel_id: String,
    pub order_code: String,
    pub customer_name: String,
    pub product_code: String,
    pub amount: String,
    pub source: ConversationSource,
}

impl Conversation {
    /// New conversation starting at the given step, ready to execute.
    pub fn started(seed: ConversationSeed, step: usize) -> Self {
        Self::build(seed, step, Phase::Active)
    }

    /// New payment-wait conversation; no step runs until the timer fires.
    pub fn pending_payment(seed: ConversationSeed) -> Self {
        Self::build(seed, 0, Phase::PendingPayment)
    }

    fn build(seed: ConversationSeed, step: usize, phase: Phase) -> Self {
        Self {
            contact_key: seed.contact_key,
            target: seed.target,
            funnel_id: seed.funnel_id,
            step,
            phase,
            order_code: seed.order_code,
            customer_name: seed.customer_name,
            product_code: seed.product_code,
            amount: seed.amount,
            source: seed.source,
            created_at: Utc::now(),
            last_system_message: None,
            last_reply: None,
            transferred_from_pending: false,
            previous_funnel: None,
            has_error: false,
            error_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// True when the funnel never left the payment wait, i.e. the contact has
    /// not been messaged yet.
    pub fn never_started(&self) -> bool {
        matches!(self.phase, Phase::PendingPayment)
    }

    /// Marks the conversation canceled. No-op on terminal conversations.
    pub fn cancel(&mut self, reason: CancelReason) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.phase = Phase::Canceled {
            at: Utc::now(),
            reason,
        };
        true
    }

    /// Records a dispatch failure without changing the phase.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.has_error = true;
        self.error_message = Some(message.into());
    }
}
