// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixture builders shared across integration tests.

use flowzap_core::funnel::{Funnel, Step, StepKind};

/// Plain text step that auto-advances.
pub fn step(id: &str, text: &str) -> Step {
    Step::text(id, text)
}

/// Text step that pauses the funnel until the contact replies.
pub fn waiting_step(id: &str, text: &str) -> Step {
    Step {
        wait_for_reply: true,
        ..Step::text(id, text)
    }
}

/// Funnel from a list of steps, named after its id.
pub fn funnel_of(id: &str, steps: Vec<Step>) -> Funnel {
    Funnel::new(id, id, steps)
}

/// Media step of the given kind.
pub fn media_step(id: &str, kind: StepKind, url: &str) -> Step {
    Step {
        kind,
        text: None,
        media_url: Some(url.to_string()),
        ..Step::text(id, "")
    }
}
