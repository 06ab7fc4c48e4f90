// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Normalized inbound events and the engine's reported outcomes.
//!
//! Webhook payload parsing lives with the transport layer; the engine only
//! ever sees these shapes.

use serde::{Deserialize, Serialize};

use crate::types::ChannelId;

/// Payment-provider event kinds the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentEventKind {
    /// Settlement confirmed; starts (or transfers to) the approved funnel.
    Approved,
    /// Deferred-settlement code issued; starts the payment wait.
    PixGenerated,
    /// Provider heartbeat while the code is unpaid; observational only.
    PixPending,
}

/// A normalized payment-provider event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub kind: PaymentEventKind,
    pub order_code: String,
    pub full_phone: String,
    pub customer_name: String,
    pub product_code: String,
    pub amount: String,
}

/// A normalized inbound message from a contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub full_phone: String,
    /// Messages authored by the system itself are ignored.
    pub from_me: bool,
    pub text: String,
    /// Channel that received the message, used to seed sticky affinity on
    /// trigger-started funnels.
    pub channel_hint: Option<ChannelId>,
}

/// Transition taken for one payment event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// A payment-wait conversation was replaced by the approved funnel.
    TransferredToApproved {
        funnel_id: String,
        starting_step: usize,
    },
    /// The approved funnel started directly at step 0.
    ApprovedStarted { funnel_id: String },
    /// A payment-wait conversation was created with a running timer.
    PaymentWaitCreated { funnel_id: String },
    /// A non-terminal conversation already exists; nothing was created.
    DuplicatePending,
    /// Event carried no actionable transition.
    Ignored,
}

/// Transition taken for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InboundOutcome {
    /// A trigger phrase matched and its funnel started.
    Triggered { funnel_id: String },
    /// A waiting conversation advanced one step.
    Advanced,
    /// Nothing to do (no trigger, not waiting, or own message).
    NoAction,
}
