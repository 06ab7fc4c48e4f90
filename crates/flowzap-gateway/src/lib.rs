// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client implementing [`MessageGateway`] against a multi-instance
//! messaging API.
//!
//! Every send is one POST to `{base}/message/{endpoint}/{channel}` with the
//! API key in a header. The channel name selects the instance; payload shape
//! depends on the content kind. Media bytes for inline-encoded audio are
//! fetched with a separate, longer timeout.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use flowzap_core::error::FlowzapError;
use flowzap_core::traits::MessageGateway;
use flowzap_core::types::{
    AudioSource, ChannelId, DeliveryTarget, GatewayReceipt, OutboundPayload,
};

/// Gateway client configuration.
///
/// Mirrors `GatewayConfig` from `flowzap-config` to avoid a dependency on
/// the config crate from the gateway crate.
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// Base URL of the gateway API, without trailing slash.
    pub base_url: String,
    /// API key sent as the `apikey` header.
    pub api_key: String,
    /// Timeout for send requests.
    pub send_timeout: Duration,
    /// Timeout for media downloads.
    pub media_timeout: Duration,
}

/// [`MessageGateway`] over HTTP.
#[derive(Debug)]
pub struct HttpMessageGateway {
    config: HttpGatewayConfig,
    client: reqwest::Client,
    media_client: reqwest::Client,
}

/// Voice notes carry a fixed presence delay, as the upstream API expects.
const VOICE_NOTE_DELAY_MS: u64 = 1200;

impl HttpMessageGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, FlowzapError> {
        if config.base_url.trim().is_empty() {
            return Err(FlowzapError::Config("gateway.base_url is required".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.send_timeout)
            .build()
            .map_err(|e| FlowzapError::Config(format!("gateway client: {e}")))?;
        let media_client = reqwest::Client::builder()
            .timeout(config.media_timeout)
            .user_agent("Mozilla/5.0")
            .build()
            .map_err(|e| FlowzapError::Config(format!("media client: {e}")))?;
        Ok(Self {
            config,
            client,
            media_client,
        })
    }

    async fn post(
        &self,
        endpoint: &str,
        channel: &ChannelId,
        body: serde_json::Value,
    ) -> Result<GatewayReceipt, FlowzapError> {
        let url = format!(
            "{}/message/{endpoint}/{channel}",
            self.config.base_url.trim_end_matches('/')
        );
        debug!(%url, "gateway request");

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| FlowzapError::Gateway {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%url, status = status.as_u16(), "gateway rejected request");
            return Err(FlowzapError::Gateway {
                message: if body.is_empty() {
                    format!("status {status}")
                } else {
                    body
                },
                status: Some(status.as_u16()),
            });
        }

        let raw = response
            .json::<serde_json::Value>()
            .await
            .unwrap_or(serde_json::Value::Null);
        Ok(GatewayReceipt { raw })
    }
}

#[async_trait]
impl MessageGateway for HttpMessageGateway {
    async fn send(
        &self,
        channel: &ChannelId,
        target: &DeliveryTarget,
        payload: &OutboundPayload,
    ) -> Result<GatewayReceipt, FlowzapError> {
        let number = target.number();
        match payload {
            OutboundPayload::Text { text } => {
                self.post(
                    "sendText",
                    channel,
                    serde_json::json!({ "number": number, "text": text }),
                )
                .await
            }
            OutboundPayload::Media { kind, url, caption } => {
                self.post(
                    "sendMedia",
                    channel,
                    serde_json::json!({
                        "number": number,
                        "mediatype": kind.to_string(),
                        "media": url,
                        "caption": caption,
                    }),
                )
                .await
            }
            OutboundPayload::VoiceNote { audio } => {
                let body = match audio {
                    AudioSource::Encoded(data) => serde_json::json!({
                        "number": number,
                        "audio": data,
                        "delay": VOICE_NOTE_DELAY_MS,
                        "encoding": true,
                    }),
                    AudioSource::Url(url) => serde_json::json!({
                        "number": number,
                        "audio": url,
                        "delay": VOICE_NOTE_DELAY_MS,
                    }),
                };
                self.post("sendWhatsAppAudio", channel, body).await
            }
            OutboundPayload::AudioMedia { encoded } => {
                self.post(
                    "sendMedia",
                    channel,
                    serde_json::json!({
                        "number": number,
                        "mediatype": "audio",
                        "media": encoded,
                        "mimetype": "audio/mpeg",
                    }),
                )
                .await
            }
        }
    }

    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, FlowzapError> {
        let response = self
            .media_client
            .get(url)
            .send()
            .await
            .map_err(|e| FlowzapError::Gateway {
                message: format!("media fetch: {e}"),
                status: e.status().map(|s| s.as_u16()),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FlowzapError::Gateway {
                message: format!("media fetch: status {status}"),
                status: Some(status.as_u16()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| FlowzapError::Gateway {
            message: format!("media fetch: {e}"),
            status: None,
        })?;
        debug!(len = bytes.len(), %url, "media fetched");
        Ok(bytes.to_vec())
    }
}
