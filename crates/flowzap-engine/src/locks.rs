// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-contact concurrency guard.
//!
//! Serializes all event-driven mutation of a single contact's conversation:
//! webhook intake and the payment-wait timer fire path acquire the same lock,
//! and hold it for the entire read-modify-write span of one event. Waiters
//! suspend on the mutex; there is no polling.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use flowzap_core::error::FlowzapError;
use flowzap_core::types::ContactKey;

/// Guard held for the duration of one contact event.
pub type ContactGuard = OwnedMutexGuard<()>;

/// One async mutex per contact key, created lazily and never reclaimed.
///
/// The map grows with the distinct-contact count, which is bounded by the
/// conversation repository itself.
#[derive(Debug, Default)]
pub struct ContactLocks {
    locks: DashMap<ContactKey, Arc<Mutex<()>>>,
}

impl ContactLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the contact's lock, waiting up to `timeout`.
    ///
    /// On timeout the error is returned without any state change; webhook
    /// callers are expected to redeliver the event.
    pub async fn acquire(
        &self,
        key: &ContactKey,
        timeout: Duration,
    ) -> Result<ContactGuard, FlowzapError> {
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => {
                debug!(contact = %key, "contact lock acquired");
                Ok(guard)
            }
            Err(_) => Err(FlowzapError::LockTimeout { duration: timeout }),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(phone: &str) -> ContactKey {
        ContactKey::from_phone(phone).unwrap()
    }

    #[tokio::test]
    async fn acquire_is_reentrant_after_release() {
        let locks = ContactLocks::new();
        let k = key("11988887777");

        let guard = locks.acquire(&k, Duration::from_secs(1)).await.unwrap();
        drop(guard);
        let _guard = locks.acquire(&k, Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn second_acquire_times_out_while_held() {
        let locks = ContactLocks::new();
        let k = key("11988887777");

        let _held = locks.acquire(&k, Duration::from_secs(1)).await.unwrap();
        let err = locks.acquire(&k, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, FlowzapError::LockTimeout { .. }));
    }

    #[tokio::test]
    async fn distinct_contacts_do_not_contend() {
        let locks = ContactLocks::new();
        let _a = locks
            .acquire(&key("11911110001"), Duration::from_secs(1))
            .await
            .unwrap();
        let _b = locks
            .acquire(&key("11911110002"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn waiter_proceeds_when_holder_releases() {
        let locks = Arc::new(ContactLocks::new());
        let k = key("11988887777");

        let guard = locks.acquire(&k, Duration::from_secs(1)).await.unwrap();

        let locks2 = locks.clone();
        let k2 = k.clone();
        let waiter = tokio::spawn(async move {
            locks2.acquire(&k2, Duration::from_secs(5)).await.is_ok()
        });

        // Give the waiter a chance to park on the mutex, then release.
        tokio::task::yield_now().await;
        drop(guard);

        assert!(waiter.await.unwrap());
    }
}
