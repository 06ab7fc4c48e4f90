// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Flowzap funnel engine.
//!
//! This crate provides the foundational trait definitions, error types, and
//! domain types used throughout the Flowzap workspace. The engine, gateway,
//! and storage crates all build on the seams defined here.

pub mod conversation;
pub mod error;
pub mod event;
pub mod funnel;
pub mod snapshot;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use conversation::{CancelReason, Conversation, ConversationSeed, ConversationSource, Phase};
pub use error::FlowzapError;
pub use event::{InboundMessage, InboundOutcome, PaymentEvent, PaymentEventKind, PaymentOutcome};
pub use funnel::{Funnel, Step, StepKind};
pub use snapshot::{SystemSnapshot, TriggerEntry};
pub use traits::{FunnelRegistry, MessageGateway, SnapshotStore};
pub use types::{
    AudioSource, ChannelId, ContactKey, DeliveryTarget, GatewayReceipt, MediaKind, OutboundPayload,
};
