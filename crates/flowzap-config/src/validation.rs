// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as positive durations, distinct product codes, and
//! duplicate channel names.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::FlowzapConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &FlowzapConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.engine.payment_wait_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "engine.payment_wait_secs must be positive".to_string(),
        });
    }

    if config.engine.lock_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "engine.lock_timeout_secs must be positive".to_string(),
        });
    }

    if config.dispatch.max_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch.max_attempts must be at least 1".to_string(),
        });
    }

    // Duplicate channel names would break rotation-index bookkeeping.
    let mut seen_channels = HashSet::new();
    for channel in &config.dispatch.channels {
        if channel.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: "dispatch.channels must not contain empty names".to_string(),
            });
        } else if !seen_channels.insert(channel) {
            errors.push(ConfigError::Validation {
                message: format!("duplicate channel `{channel}` in dispatch.channels"),
            });
        }
    }

    if config.storage.data_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.data_dir must not be empty".to_string(),
        });
    }

    if config.http.bind_address.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "http.bind_address must not be empty".to_string(),
        });
    }

    // Products must have distinct codes and offer ids must not be claimed twice.
    let mut seen_codes = HashSet::new();
    let mut seen_offers = HashSet::new();
    for (i, product) in config.products.iter().enumerate() {
        if product.code.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("products[{i}].code must not be empty"),
            });
        } else if !seen_codes.insert(&product.code) {
            errors.push(ConfigError::Validation {
                message: format!("duplicate product code `{}`", product.code),
            });
        }

        for offer in &product.offer_ids {
            if !seen_offers.insert(offer) {
                errors.push(ConfigError::Validation {
                    message: format!(
                        "offer `{offer}` is mapped to more than one product"
                    ),
                });
            }
        }

        if product.approved_funnel.trim().is_empty() || product.pending_funnel.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!(
                    "products[{i}] must name both approved_funnel and pending_funnel"
                ),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Additional requirements for running `flowzap serve`, beyond what an
/// offline invocation (config check, status) needs.
pub fn validate_for_serve(config: &FlowzapConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.dispatch.channels.is_empty() {
        errors.push(ConfigError::Validation {
            message: "dispatch.channels must list at least one channel for serve".to_string(),
        });
    }

    if config
        .gateway
        .base_url
        .as_deref()
        .unwrap_or("")
        .trim()
        .is_empty()
    {
        errors.push(ConfigError::MissingKey {
            key: "gateway.base_url".to_string(),
        });
    }

    if config
        .gateway
        .api_key
        .as_deref()
        .unwrap_or("")
        .trim()
        .is_empty()
    {
        errors.push(ConfigError::MissingKey {
            key: "gateway.api_key".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
