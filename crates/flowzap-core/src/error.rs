// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Flowzap funnel engine.

use thiserror::Error;

/// The primary error type used across all Flowzap adapter traits and core operations.
#[derive(Debug, Error)]
pub enum FlowzapError {
    /// Input validation errors (malformed contact key, unmapped product).
    #[error("validation error: {0}")]
    Validation(String),

    /// A funnel referenced by an event or conversation does not exist.
    #[error("funnel not found: {id}")]
    FunnelNotFound { id: String },

    /// Every channel/attempt combination was exhausted for one dispatch.
    ///
    /// The engine converts this into the conversation's error overlay; it is
    /// never surfaced to webhook callers as a request failure.
    #[error("delivery failed across {channels} channel(s): {last_error}")]
    Delivery { channels: usize, last_error: String },

    /// The per-contact lock could not be acquired within the configured bound.
    ///
    /// Transient: callers are expected to redeliver the triggering event.
    #[error("contact lock not acquired within {duration:?}")]
    LockTimeout { duration: std::time::Duration },

    /// Messaging-gateway errors (HTTP failure, non-success response).
    #[error("gateway error: {message}")]
    Gateway {
        message: String,
        status: Option<u16>,
    },

    /// Snapshot storage errors (read/write/serialize failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors (invalid TOML, missing required fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FlowzapError {
    /// True for errors the caller may safely retry by redelivering the event.
    pub fn is_transient(&self) -> bool {
        matches!(self, FlowzapError::LockTimeout { .. })
    }
}
