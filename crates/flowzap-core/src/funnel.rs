// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Funnel and step definitions.
//!
//! A funnel is an ordered sequence of message steps assigned to a contact.
//! Definitions are lookup-only from the engine's perspective; editing goes
//! through the [`FunnelRegistry`](crate::traits::FunnelRegistry) owner.

use serde::{Deserialize, Serialize};

/// The fixed step vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StepKind {
    Text,
    Image,
    Video,
    Audio,
    /// Pure pause: nothing is dispatched.
    Delay,
}

/// One step of a funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    /// Pause the funnel after this step until the contact replies.
    #[serde(default)]
    pub wait_for_reply: bool,
    /// Simulate typing presence before dispatching.
    #[serde(default)]
    pub show_typing: bool,
    /// Blocking wait before the step body runs.
    #[serde(default)]
    pub delay_before_secs: Option<u64>,
    /// Duration of a `Delay` step.
    #[serde(default)]
    pub delay_secs: Option<u64>,
}

impl Step {
    /// Minimal text step, the most common shape in practice.
    pub fn text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: StepKind::Text,
            text: Some(text.into()),
            media_url: None,
            wait_for_reply: false,
            show_typing: false,
            delay_before_secs: None,
            delay_secs: None,
        }
    }
}

/// An ordered sequence of message steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Funnel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Funnel {
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            steps,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
