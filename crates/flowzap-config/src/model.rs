// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Flowzap funnel engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Flowzap configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FlowzapConfig {
    /// Orchestration engine timings and behavior.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Channel pool and retry policy.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Outbound messaging-gateway client settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Snapshot persistence settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Webhook intake HTTP server settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Product catalog: payment offers mapped to funnel pairs.
    #[serde(default)]
    pub products: Vec<ProductConfig>,
}

/// Orchestration engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds a provisional payment waits before the reminder funnel starts.
    #[serde(default = "default_payment_wait_secs")]
    pub payment_wait_secs: u64,

    /// Per-(contact, phrase) trigger cooldown window in seconds.
    #[serde(default = "default_trigger_cooldown_secs")]
    pub trigger_cooldown_secs: u64,

    /// How trigger phrases are compared against inbound text.
    #[serde(default)]
    pub trigger_match_mode: TriggerMatchMode,

    /// Upper bound on waiting for a contact's event lock.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Duration of the typing-presence simulation before a step dispatch.
    #[serde(default = "default_typing_secs")]
    pub typing_secs: u64,

    /// Duration of a delay step that does not specify one.
    #[serde(default = "default_step_delay_secs")]
    pub default_step_delay_secs: u64,

    /// Starting step of the approved funnel when the contact already
    /// interacted with the payment-wait funnel (the introductory steps are
    /// functionally covered by then).
    #[serde(default = "default_transfer_skip_steps")]
    pub transfer_skip_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            payment_wait_secs: default_payment_wait_secs(),
            trigger_cooldown_secs: default_trigger_cooldown_secs(),
            trigger_match_mode: TriggerMatchMode::default(),
            lock_timeout_secs: default_lock_timeout_secs(),
            typing_secs: default_typing_secs(),
            default_step_delay_secs: default_step_delay_secs(),
            transfer_skip_steps: default_transfer_skip_steps(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_payment_wait_secs() -> u64 {
    7 * 60
}

fn default_trigger_cooldown_secs() -> u64 {
    24 * 60 * 60
}

fn default_lock_timeout_secs() -> u64 {
    10
}

fn default_typing_secs() -> u64 {
    3
}

fn default_step_delay_secs() -> u64 {
    10
}

fn default_transfer_skip_steps() -> usize {
    3
}

/// Phrase comparison mode for the trigger matcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMatchMode {
    /// Normalized text must equal the phrase.
    #[default]
    Exact,
    /// Normalized text must contain the phrase.
    Contains,
}

/// Channel pool and retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Ordered outbound channel pool. Empty pools fail validation for serve.
    #[serde(default)]
    pub channels: Vec<String>,

    /// Attempts per channel before moving to the next one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between attempts on the same channel.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            max_attempts: default_max_attempts(),
            retry_backoff_secs: default_retry_backoff_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_secs() -> u64 {
    2
}

/// Messaging-gateway client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Base URL of the gateway API. Required for serve.
    #[serde(default)]
    pub base_url: Option<String>,

    /// API key sent with every request. Required for serve.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Timeout for send requests.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Timeout for media downloads (audio encoding path).
    #[serde(default = "default_media_timeout_secs")]
    pub media_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            send_timeout_secs: default_send_timeout_secs(),
            media_timeout_secs: default_media_timeout_secs(),
        }
    }
}

fn default_send_timeout_secs() -> u64 {
    15
}

fn default_media_timeout_secs() -> u64 {
    30
}

/// Snapshot persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding the JSON snapshot files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Interval between periodic snapshot flushes.
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_snapshot_interval_secs() -> u64 {
    30
}

/// Webhook intake HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Bind address for the intake server.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Bind port for the intake server.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// One product: the payment-provider offers that identify it and the funnel
/// pair its events route to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProductConfig {
    /// Short product code used in conversations and logs.
    pub code: String,

    /// Payment-provider offer identifiers mapping to this product.
    #[serde(default)]
    pub offer_ids: Vec<String>,

    /// Funnel started on approved payments.
    pub approved_funnel: String,

    /// Funnel armed on provisional (deferred-settlement) payments.
    pub pending_funnel: String,
}
