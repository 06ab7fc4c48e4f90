// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Boundary to the external messaging gateway.

use async_trait::async_trait;

use crate::error::FlowzapError;
use crate::types::{ChannelId, DeliveryTarget, GatewayReceipt, OutboundPayload};

/// One hop to the outbound messaging infrastructure.
///
/// Implementations send a single payload through a single named channel and
/// report success or failure; retry, channel ordering, and affinity are the
/// dispatcher's business, not the gateway's.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Delivers one payload to one target via the given channel.
    async fn send(
        &self,
        channel: &ChannelId,
        target: &DeliveryTarget,
        payload: &OutboundPayload,
    ) -> Result<GatewayReceipt, FlowzapError>;

    /// Fetches remote media bytes for inline-encoded delivery.
    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, FlowzapError>;
}
