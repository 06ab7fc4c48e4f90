// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pending payment-wait timers.
//!
//! Each timer is a cancellation token paired with the order code it guards.
//! The sleeping task itself is spawned by the engine; this registry only
//! answers the two questions that must never race: "was I canceled?" at fire
//! time (under the contact lock) and "is there anything to cancel?" on
//! approval. Cancel-before-fire removes the timer; cancel-after-fire and
//! double-cancel are no-ops.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use flowzap_core::types::ContactKey;

/// State of one armed payment-wait timer.
#[derive(Debug)]
pub struct PendingTimer {
    pub order_code: String,
    pub created_at: DateTime<Utc>,
    token: CancellationToken,
}

/// Registry of armed payment-wait timers, keyed by contact.
#[derive(Debug, Default)]
pub struct PaymentTimers {
    inner: DashMap<ContactKey, PendingTimer>,
}

impl PaymentTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a timer for the contact, replacing (and canceling) any previous one.
    ///
    /// Returns the token the sleeping task must select on.
    pub fn arm(&self, key: ContactKey, order_code: String) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self.inner.insert(
            key,
            PendingTimer {
                order_code,
                created_at: Utc::now(),
                token: token.clone(),
            },
        );
        if let Some(old) = previous {
            old.token.cancel();
        }
        token
    }

    /// Cancels the contact's timer, if one is armed. Idempotent.
    pub fn cancel(&self, key: &ContactKey) -> bool {
        match self.inner.remove(key) {
            Some((_, timer)) => {
                timer.token.cancel();
                debug!(contact = %key, order = %timer.order_code, "payment-wait timer canceled");
                true
            }
            None => false,
        }
    }

    /// Consumes the timer at fire time.
    ///
    /// Returns `true` only when the armed timer still belongs to the given
    /// order and was not canceled in the window between the sleep elapsing
    /// and the contact lock being acquired. A `false` return means the fire
    /// is stale and must have no effect.
    pub fn confirm_fire(&self, key: &ContactKey, order_code: &str) -> bool {
        let stale = match self.inner.get(key) {
            Some(timer) => timer.order_code != order_code || timer.token.is_cancelled(),
            None => true,
        };
        if stale {
            return false;
        }
        self.inner.remove(key).is_some()
    }

    pub fn contains(&self, key: &ContactKey) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
