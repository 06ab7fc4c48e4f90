// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./flowzap.toml` > `~/.config/flowzap/flowzap.toml`
//! > `/etc/flowzap/flowzap.toml` with environment variable overrides via the
//! `FLOWZAP_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::FlowzapConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/flowzap/flowzap.toml` (system-wide)
/// 3. `~/.config/flowzap/flowzap.toml` (user XDG config)
/// 4. `./flowzap.toml` (local directory)
/// 5. `FLOWZAP_*` environment variables
pub fn load_config() -> Result<FlowzapConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(FlowzapConfig::default()))
        .merge(Toml::file("/etc/flowzap/flowzap.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("flowzap/flowzap.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("flowzap.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<FlowzapConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(FlowzapConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<FlowzapConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(FlowzapConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `FLOWZAP_GATEWAY_API_KEY` must map to
/// `gateway.api_key`, not `gateway.api.key`.
fn env_provider() -> Env {
    Env::prefixed("FLOWZAP_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("engine_", "engine.", 1)
            .replacen("dispatch_", "dispatch.", 1)
            .replacen("gateway_", "gateway.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("http_", "http.", 1);
        mapped.into()
    })
}
