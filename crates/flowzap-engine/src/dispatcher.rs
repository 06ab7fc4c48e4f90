// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel dispatcher: ordering, retry, and affinity over the channel pool.
//!
//! Channel order for one dispatch: the contact's sticky channel first when
//! one exists, then the rest of the pool in order; for a contact's first
//! message without affinity, the pool rotated to start after the global
//! cursor; otherwise plain pool order. Each candidate channel gets a fixed
//! number of attempts with a fixed backoff before the next one is tried.
//!
//! The rotation cursor is an atomic updated without a lock: approximate
//! round-robin fairness is accepted, strict is not required.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use tracing::{info, warn};

use flowzap_core::error::FlowzapError;
use flowzap_core::funnel::{Step, StepKind};
use flowzap_core::traits::MessageGateway;
use flowzap_core::types::{
    AudioSource, ChannelId, ContactKey, DeliveryTarget, GatewayReceipt, MediaKind, OutboundPayload,
};

use crate::repository::ConversationRepository;

/// Sends one step's content through the first channel/attempt that accepts it.
pub struct ChannelDispatcher {
    gateway: Arc<dyn MessageGateway>,
    repo: Arc<ConversationRepository>,
    pool: Vec<ChannelId>,
    /// Index of the last channel a rotation dispatch succeeded on.
    /// `usize::MAX` until the first success, so rotation starts at index 0.
    cursor: AtomicUsize,
    max_attempts: u32,
    backoff: Duration,
}

impl ChannelDispatcher {
    pub fn new(
        gateway: Arc<dyn MessageGateway>,
        repo: Arc<ConversationRepository>,
        pool: Vec<ChannelId>,
        max_attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            gateway,
            repo,
            pool,
            cursor: AtomicUsize::new(usize::MAX),
            max_attempts,
            backoff,
        }
    }

    pub fn pool(&self) -> &[ChannelId] {
        &self.pool
    }

    pub fn pool_contains(&self, channel: &ChannelId) -> bool {
        self.pool.contains(channel)
    }

    /// Dispatches one step to the contact, trying channels in affinity order.
    ///
    /// On success the winning channel becomes the contact's sticky channel;
    /// rotation dispatches (first message, no prior affinity) also advance
    /// the global cursor. On exhaustion every channel failed every attempt
    /// and the last observed error is returned.
    pub async fn dispatch(
        &self,
        key: &ContactKey,
        target: &DeliveryTarget,
        step: &Step,
        first_message: bool,
    ) -> Result<ChannelId, FlowzapError> {
        if self.pool.is_empty() {
            return Err(FlowzapError::Delivery {
                channels: 0,
                last_error: "channel pool is empty".into(),
            });
        }

        let sticky = self.repo.sticky_for(key);
        let rotation_dispatch = sticky.is_none() && first_message;
        let order = self.candidate_order(sticky, first_message);

        let mut last_error = String::from("no attempt made");
        for channel in &order {
            for attempt in 1..=self.max_attempts {
                match self.attempt(channel, target, step).await {
                    Ok(_receipt) => {
                        self.repo.set_sticky(key, channel.clone());
                        if rotation_dispatch {
                            if let Some(idx) = self.pool.iter().position(|c| c == channel) {
                                self.cursor.store(idx, Ordering::Relaxed);
                            }
                        }
                        info!(
                            contact = %key,
                            channel = %channel,
                            kind = %step.kind,
                            attempt,
                            "message dispatched"
                        );
                        return Ok(channel.clone());
                    }
                    Err(e) => {
                        warn!(
                            contact = %key,
                            channel = %channel,
                            attempt,
                            error = %e,
                            "dispatch attempt failed"
                        );
                        last_error = e.to_string();
                        if attempt < self.max_attempts {
                            tokio::time::sleep(self.backoff).await;
                        }
                    }
                }
            }
        }

        Err(FlowzapError::Delivery {
            channels: order.len(),
            last_error,
        })
    }

    fn candidate_order(&self, sticky: Option<ChannelId>, first_message: bool) -> Vec<ChannelId> {
        if let Some(sticky) = sticky {
            let mut order = vec![sticky.clone()];
            order.extend(self.pool.iter().filter(|c| **c != sticky).cloned());
            return order;
        }
        if first_message {
            let start = self.cursor.load(Ordering::Relaxed).wrapping_add(1) % self.pool.len();
            let mut order = self.pool[start..].to_vec();
            order.extend_from_slice(&self.pool[..start]);
            return order;
        }
        self.pool.clone()
    }

    async fn attempt(
        &self,
        channel: &ChannelId,
        target: &DeliveryTarget,
        step: &Step,
    ) -> Result<GatewayReceipt, FlowzapError> {
        match step.kind {
            StepKind::Text => {
                let payload = OutboundPayload::Text {
                    text: step.text.clone().unwrap_or_default(),
                };
                self.gateway.send(channel, target, &payload).await
            }
            StepKind::Image | StepKind::Video => {
                let url = step.media_url.clone().ok_or_else(|| {
                    FlowzapError::Validation(format!("step `{}` has no media url", step.id))
                })?;
                let kind = if step.kind == StepKind::Image {
                    MediaKind::Image
                } else {
                    MediaKind::Video
                };
                let payload = OutboundPayload::Media {
                    kind,
                    url,
                    caption: step.text.clone().unwrap_or_default(),
                };
                self.gateway.send(channel, target, &payload).await
            }
            StepKind::Audio => {
                let url = step.media_url.clone().ok_or_else(|| {
                    FlowzapError::Validation(format!("step `{}` has no media url", step.id))
                })?;
                self.attempt_audio(channel, target, &url).await
            }
            StepKind::Delay => Err(FlowzapError::Internal(
                "delay steps are not dispatchable".into(),
            )),
        }
    }

    /// Audio delivery with a three-tier fallback inside one channel attempt:
    /// encoded voice note, then encoded generic media, then a direct URL
    /// reference when encoding cannot be delivered (or fetched) at all.
    async fn attempt_audio(
        &self,
        channel: &ChannelId,
        target: &DeliveryTarget,
        url: &str,
    ) -> Result<GatewayReceipt, FlowzapError> {
        let encoded = match self.gateway.fetch_media(url).await {
            Ok(bytes) => audio_data_url(&bytes),
            Err(e) => {
                warn!(channel = %channel, error = %e, "audio fetch failed, sending direct reference");
                let payload = OutboundPayload::VoiceNote {
                    audio: AudioSource::Url(url.to_string()),
                };
                return self.gateway.send(channel, target, &payload).await;
            }
        };

        let voice = OutboundPayload::VoiceNote {
            audio: AudioSource::Encoded(encoded.clone()),
        };
        match self.gateway.send(channel, target, &voice).await {
            Ok(receipt) => Ok(receipt),
            Err(first) => {
                warn!(channel = %channel, error = %first, "voice-note send failed, trying media encoding");
                let media = OutboundPayload::AudioMedia { encoded };
                match self.gateway.send(channel, target, &media).await {
                    Ok(receipt) => Ok(receipt),
                    Err(second) => {
                        warn!(channel = %channel, error = %second, "encoded media failed, sending direct reference");
                        let direct = OutboundPayload::VoiceNote {
                            audio: AudioSource::Url(url.to_string()),
                        };
                        self.gateway.send(channel, target, &direct).await
                    }
                }
            }
        }
    }
}

/// Inline data URL for fetched audio bytes.
fn audio_data_url(bytes: &[u8]) -> String {
    format!(
        "data:audio/mpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowzap_test_utils::{media_step, MockGateway};

    fn pool(names: &[&str]) -> Vec<ChannelId> {
        names.iter().map(|n| ChannelId::from(*n)).collect()
    }

    fn key(phone: &str) -> ContactKey {
        ContactKey::from_phone(phone).unwrap()
    }

    fn target() -> DeliveryTarget {
        DeliveryTarget::from_phone("11988887777")
    }

    fn dispatcher(
        gateway: Arc<MockGateway>,
        repo: Arc<ConversationRepository>,
        names: &[&str],
    ) -> ChannelDispatcher {
        ChannelDispatcher::new(gateway, repo, pool(names), 3, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn first_message_rotates_from_cursor() {
        let gateway = Arc::new(MockGateway::new());
        let repo = Arc::new(ConversationRepository::new());
        let d = dispatcher(gateway.clone(), repo.clone(), &["wa01", "wa02", "wa03"]);
        let step = Step::text("s0", "hi");

        // Fresh contact, first message: rotation starts at wa01.
        let used = d
            .dispatch(&key("11911110001"), &target(), &step, true)
            .await
            .unwrap();
        assert_eq!(used, ChannelId::from("wa01"));

        // Next fresh contact starts after the advanced cursor.
        let used = d
            .dispatch(&key("11911110002"), &target(), &step, true)
            .await
            .unwrap();
        assert_eq!(used, ChannelId::from("wa02"));
    }

    #[tokio::test]
    async fn sticky_channel_is_tried_first() {
        let gateway = Arc::new(MockGateway::new());
        let repo = Arc::new(ConversationRepository::new());
        let d = dispatcher(gateway.clone(), repo.clone(), &["wa01", "wa02", "wa03"]);
        let k = key("11911110001");
        repo.set_sticky(&k, "wa03".into());

        let used = d
            .dispatch(&k, &target(), &Step::text("s0", "hi"), true)
            .await
            .unwrap();
        assert_eq!(used, ChannelId::from("wa03"), "sticky wins even on a first message");
    }

    #[tokio::test(start_paused = true)]
    async fn affinity_follows_most_recent_success() {
        let gateway = Arc::new(MockGateway::new());
        let repo = Arc::new(ConversationRepository::new());
        let d = dispatcher(gateway.clone(), repo.clone(), &["wa01", "wa02", "wa03"]);
        let k = key("11911110001");
        let step = Step::text("s0", "hi");

        // First dispatch lands on wa01 and records it as sticky.
        d.dispatch(&k, &target(), &step, true).await.unwrap();
        assert_eq!(repo.sticky_for(&k), Some(ChannelId::from("wa01")));

        // Sticky channel goes down: the next dispatch falls over to wa02,
        // which becomes the new sticky channel.
        gateway.fail_channel("wa01");
        let used = d.dispatch(&k, &target(), &step, false).await.unwrap();
        assert_eq!(used, ChannelId::from("wa02"));
        assert_eq!(repo.sticky_for(&k), Some(ChannelId::from("wa02")));

        // wa01 recovering does not steal affinity back.
        gateway.restore_channel("wa01");
        let used = d.dispatch(&k, &target(), &step, false).await.unwrap();
        assert_eq!(used, ChannelId::from("wa02"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_last_error_after_all_attempts() {
        let gateway = Arc::new(MockGateway::new());
        let repo = Arc::new(ConversationRepository::new());
        let d = dispatcher(gateway.clone(), repo.clone(), &["wa01", "wa02", "wa03"]);
        for ch in ["wa01", "wa02", "wa03"] {
            gateway.fail_channel(ch);
        }

        let err = d
            .dispatch(&key("11911110001"), &target(), &Step::text("s0", "hi"), false)
            .await
            .unwrap_err();
        match err {
            FlowzapError::Delivery { channels, .. } => assert_eq!(channels, 3),
            other => panic!("expected Delivery error, got {other}"),
        }
        // 3 channels x 3 attempts.
        assert_eq!(gateway.call_count().await, 9);
        assert!(repo.sticky_for(&key("11911110001")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_same_channel_before_moving_on() {
        let gateway = Arc::new(MockGateway::new());
        let repo = Arc::new(ConversationRepository::new());
        let d = dispatcher(gateway.clone(), repo.clone(), &["wa01", "wa02"]);
        gateway.fail_channel_times("wa01", 2);

        let used = d
            .dispatch(&key("11911110001"), &target(), &Step::text("s0", "hi"), false)
            .await
            .unwrap();
        // Third attempt on wa01 succeeds; wa02 is never touched.
        assert_eq!(used, ChannelId::from("wa01"));
        assert_eq!(gateway.call_count().await, 3);
    }

    #[tokio::test]
    async fn audio_sends_encoded_voice_note() {
        let gateway = Arc::new(MockGateway::new());
        let repo = Arc::new(ConversationRepository::new());
        let d = dispatcher(gateway.clone(), repo.clone(), &["wa01"]);
        let step = media_step("s0", StepKind::Audio, "http://cdn/a.mp3");

        d.dispatch(&key("11911110001"), &target(), &step, false)
            .await
            .unwrap();

        let calls = gateway.calls().await;
        assert_eq!(calls.len(), 1);
        match &calls[0].payload {
            OutboundPayload::VoiceNote {
                audio: AudioSource::Encoded(data),
            } => assert!(data.starts_with("data:audio/mpeg;base64,")),
            other => panic!("expected encoded voice note, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn audio_fetch_failure_falls_back_to_direct_url() {
        let gateway = Arc::new(MockGateway::new());
        let repo = Arc::new(ConversationRepository::new());
        let d = dispatcher(gateway.clone(), repo.clone(), &["wa01"]);
        gateway.push_media_result(Err("404 not found".into())).await;
        let step = media_step("s0", StepKind::Audio, "http://cdn/a.mp3");

        d.dispatch(&key("11911110001"), &target(), &step, false)
            .await
            .unwrap();

        let calls = gateway.calls().await;
        assert_eq!(calls.len(), 1);
        match &calls[0].payload {
            OutboundPayload::VoiceNote {
                audio: AudioSource::Url(url),
            } => assert_eq!(url, "http://cdn/a.mp3"),
            other => panic!("expected direct url voice note, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_media_url_is_a_validation_error() {
        let gateway = Arc::new(MockGateway::new());
        let repo = Arc::new(ConversationRepository::new());
        let d = dispatcher(gateway.clone(), repo.clone(), &["wa01", "wa02"]);
        let step = Step {
            kind: StepKind::Image,
            ..Step::text("s0", "caption")
        };

        let err = d
            .dispatch(&key("11911110001"), &target(), &step, false)
            .await
            .unwrap_err();
        // The validation error is surfaced as delivery exhaustion with the
        // underlying message preserved.
        match err {
            FlowzapError::Delivery { last_error, .. } => {
                assert!(last_error.contains("no media url"));
            }
            other => panic!("expected Delivery error, got {other}"),
        }
    }
}
