// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Product catalog: which funnels a payment event routes to.

use std::collections::{HashMap, HashSet};

use flowzap_config::model::ProductConfig;

/// Funnel pair bound to one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunnelBinding {
    /// Started on approved payments.
    pub approved_funnel: String,
    /// Armed on provisional (deferred-settlement) payments.
    pub pending_funnel: String,
}

/// Immutable mapping from product codes and provider offer ids to funnels.
#[derive(Debug, Default)]
pub struct ProductCatalog {
    bindings: HashMap<String, FunnelBinding>,
    offers: HashMap<String, String>,
    pending_funnels: HashSet<String>,
    default_code: Option<String>,
}

impl ProductCatalog {
    pub fn from_config(products: &[ProductConfig]) -> Self {
        let mut catalog = Self {
            default_code: products.first().map(|p| p.code.clone()),
            ..Self::default()
        };
        for product in products {
            catalog.bindings.insert(
                product.code.clone(),
                FunnelBinding {
                    approved_funnel: product.approved_funnel.clone(),
                    pending_funnel: product.pending_funnel.clone(),
                },
            );
            catalog
                .pending_funnels
                .insert(product.pending_funnel.clone());
            for offer in &product.offer_ids {
                catalog.offers.insert(offer.clone(), product.code.clone());
            }
        }
        catalog
    }

    pub fn binding(&self, code: &str) -> Option<&FunnelBinding> {
        self.bindings.get(code)
    }

    /// Product code for a payment-provider offer id.
    pub fn resolve_offer(&self, offer_id: &str) -> Option<&str> {
        self.offers.get(offer_id).map(String::as_str)
    }

    /// Whether a funnel is the payment-wait funnel of any product.
    pub fn is_pending_funnel(&self, funnel_id: &str) -> bool {
        self.pending_funnels.contains(funnel_id)
    }

    /// Fallback product for events whose offers are all unmapped:
    /// the first configured product.
    pub fn default_code(&self) -> Option<&str> {
        self.default_code.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
