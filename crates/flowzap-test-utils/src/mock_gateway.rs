// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging gateway for deterministic testing.
//!
//! `MockGateway` implements [`MessageGateway`] with scriptable per-channel
//! failures and captured outbound calls for assertion in tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use flowzap_core::error::FlowzapError;
use flowzap_core::traits::MessageGateway;
use flowzap_core::types::{ChannelId, DeliveryTarget, GatewayReceipt, OutboundPayload};

/// One recorded `send()` call, successful or not.
#[derive(Debug, Clone)]
pub struct RecordedSend {
    pub channel: ChannelId,
    pub target: DeliveryTarget,
    pub payload: OutboundPayload,
    pub ok: bool,
}

/// Remaining failure budget for one channel.
enum FailureMode {
    Always,
    Times(u32),
}

/// A mock messaging gateway.
///
/// By default every send succeeds and every media fetch returns a small
/// byte payload. Channels can be scripted to fail forever or a fixed number
/// of times; every call is captured and retrievable via [`calls`](Self::calls).
pub struct MockGateway {
    calls: Mutex<Vec<RecordedSend>>,
    failures: DashMap<ChannelId, FailureMode>,
    media_results: Mutex<VecDeque<Result<Vec<u8>, String>>>,
    media_fetches: Mutex<u32>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: DashMap::new(),
            media_results: Mutex::new(VecDeque::new()),
            media_fetches: Mutex::new(0),
        }
    }

    /// Scripts a channel to fail every send.
    pub fn fail_channel(&self, channel: impl Into<ChannelId>) {
        self.failures.insert(channel.into(), FailureMode::Always);
    }

    /// Scripts a channel to fail the next `n` sends, then succeed.
    pub fn fail_channel_times(&self, channel: impl Into<ChannelId>, n: u32) {
        self.failures.insert(channel.into(), FailureMode::Times(n));
    }

    /// Clears any scripted failure for a channel.
    pub fn restore_channel(&self, channel: impl Into<ChannelId>) {
        self.failures.remove(&channel.into());
    }

    /// Queues one media-fetch result; defaults to success when the queue is empty.
    pub async fn push_media_result(&self, result: Result<Vec<u8>, String>) {
        self.media_results.lock().await.push_back(result);
    }

    /// All recorded send calls, in order.
    pub async fn calls(&self) -> Vec<RecordedSend> {
        self.calls.lock().await.clone()
    }

    /// Only the successful sends, in order.
    pub async fn delivered(&self) -> Vec<RecordedSend> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.ok)
            .cloned()
            .collect()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub async fn media_fetch_count(&self) -> u32 {
        *self.media_fetches.lock().await
    }

    pub async fn clear(&self) {
        self.calls.lock().await.clear();
    }

    fn should_fail(&self, channel: &ChannelId) -> bool {
        let Some(mut entry) = self.failures.get_mut(channel) else {
            return false;
        };
        match entry.value_mut() {
            FailureMode::Always => true,
            FailureMode::Times(n) => {
                if *n == 0 {
                    false
                } else {
                    *n -= 1;
                    true
                }
            }
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageGateway for MockGateway {
    async fn send(
        &self,
        channel: &ChannelId,
        target: &DeliveryTarget,
        payload: &OutboundPayload,
    ) -> Result<GatewayReceipt, FlowzapError> {
        let fail = self.should_fail(channel);
        self.calls.lock().await.push(RecordedSend {
            channel: channel.clone(),
            target: target.clone(),
            payload: payload.clone(),
            ok: !fail,
        });

        if fail {
            Err(FlowzapError::Gateway {
                message: format!("scripted failure on {channel}"),
                status: Some(503),
            })
        } else {
            Ok(GatewayReceipt {
                raw: serde_json::json!({"status": "sent"}),
            })
        }
    }

    async fn fetch_media(&self, _url: &str) -> Result<Vec<u8>, FlowzapError> {
        *self.media_fetches.lock().await += 1;
        match self.media_results.lock().await.pop_front() {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(msg)) => Err(FlowzapError::Gateway {
                message: msg,
                status: None,
            }),
            None => Ok(b"mock-audio-bytes".to_vec()),
        }
    }
}
