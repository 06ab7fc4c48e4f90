// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end engine scenarios over a mock gateway.
//!
//! Time-dependent paths (payment wait, retry backoff, step delays) run under
//! tokio's paused clock, so waits resolve instantly while preserving order.

use std::sync::Arc;
use std::time::Duration;

use flowzap_config::model::{FlowzapConfig, ProductConfig};
use flowzap_core::conversation::{CancelReason, Phase};
use flowzap_core::event::{
    InboundMessage, InboundOutcome, PaymentEvent, PaymentEventKind, PaymentOutcome,
};
use flowzap_core::snapshot::TriggerEntry;
use flowzap_core::traits::FunnelRegistry;
use flowzap_core::types::ContactKey;
use flowzap_engine::{FunnelEngine, InMemoryFunnelRegistry};
use flowzap_test_utils::{funnel_of, step, waiting_step, MockGateway};

const PHONE: &str = "5511988887777";

struct Harness {
    engine: Arc<FunnelEngine>,
    gateway: Arc<MockGateway>,
    registry: Arc<InMemoryFunnelRegistry>,
}

fn harness() -> Harness {
    let mut config = FlowzapConfig::default();
    config.dispatch.channels = vec!["wa01".into(), "wa02".into(), "wa03".into()];
    config.products = vec![
        ProductConfig {
            code: "CS".into(),
            offer_ids: vec!["offer-cs".into()],
            approved_funnel: "CS_APPROVED".into(),
            pending_funnel: "CS_PIX".into(),
        },
        ProductConfig {
            code: "FB".into(),
            offer_ids: vec!["offer-fb".into()],
            approved_funnel: "FB_APPROVED".into(),
            pending_funnel: "FB_PIX".into(),
        },
    ];

    let gateway = Arc::new(MockGateway::new());
    let registry = Arc::new(InMemoryFunnelRegistry::new());
    let engine = FunnelEngine::new(&config, gateway.clone(), registry.clone());
    Harness {
        engine,
        gateway,
        registry,
    }
}

fn key() -> ContactKey {
    ContactKey::from_phone(PHONE).unwrap()
}

fn payment(kind: PaymentEventKind, order: &str, product: &str) -> PaymentEvent {
    PaymentEvent {
        kind,
        order_code: order.into(),
        full_phone: PHONE.into(),
        customer_name: "Maria".into(),
        product_code: product.into(),
        amount: "R$ 97,00".into(),
    }
}

fn inbound(text: &str) -> InboundMessage {
    InboundMessage {
        full_phone: PHONE.into(),
        from_me: false,
        text: text.into(),
        channel_hint: None,
    }
}

/// Lets spawned timer tasks run to completion under the paused clock.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn scenario_a_trigger_then_reply_completes_funnel() {
    let h = harness();
    h.registry.upsert(funnel_of(
        "F",
        vec![waiting_step("s0", "welcome"), step("s1", "closing")],
    ));
    h.engine
        .triggers()
        .add(TriggerEntry::new("quero", "F"))
        .await
        .unwrap();

    let outcome = h.engine.handle_inbound_message(inbound("quero")).await.unwrap();
    assert_eq!(
        outcome,
        InboundOutcome::Triggered {
            funnel_id: "F".into()
        }
    );

    let conv = h.engine.repository().get(&key()).unwrap();
    assert_eq!(conv.phase, Phase::WaitingReply);
    assert_eq!(conv.step, 0);
    assert_eq!(h.gateway.delivered().await.len(), 1);

    let outcome = h.engine.handle_inbound_message(inbound("ok")).await.unwrap();
    assert_eq!(outcome, InboundOutcome::Advanced);

    let conv = h.engine.repository().get(&key()).unwrap();
    assert!(matches!(conv.phase, Phase::Completed { .. }));
    assert_eq!(conv.step, 1);
    assert_eq!(h.gateway.delivered().await.len(), 2);
    assert!(conv.last_reply.is_some());
}

#[tokio::test(start_paused = true)]
async fn scenario_b_approval_before_timer_fires_starts_at_step_zero() {
    let h = harness();
    h.registry
        .upsert(funnel_of("CS_PIX", vec![step("p0", "pix reminder")]));
    h.registry.upsert(funnel_of(
        "CS_APPROVED",
        vec![step("a0", "thanks"), step("a1", "access")],
    ));

    let outcome = h
        .engine
        .handle_payment_event(payment(PaymentEventKind::PixGenerated, "O42", "CS"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PaymentOutcome::PaymentWaitCreated {
            funnel_id: "CS_PIX".into()
        }
    );
    let conv = h.engine.repository().get(&key()).unwrap();
    assert_eq!(conv.phase, Phase::PendingPayment);
    assert_eq!(h.gateway.delivered().await.len(), 0, "nothing sent while waiting");

    // Approval arrives well before the 7-minute window elapses.
    let outcome = h
        .engine
        .handle_payment_event(payment(PaymentEventKind::Approved, "O42", "CS"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PaymentOutcome::TransferredToApproved {
            funnel_id: "CS_APPROVED".into(),
            starting_step: 0,
        }
    );

    let conv = h.engine.repository().get(&key()).unwrap();
    assert_eq!(conv.funnel_id, "CS_APPROVED");
    assert!(conv.transferred_from_pending);
    assert_eq!(conv.previous_funnel.as_deref(), Some("CS_PIX"));
    assert!(matches!(conv.phase, Phase::Completed { .. }));
    let delivered = h.gateway.delivered().await;
    assert_eq!(delivered.len(), 2, "both approved steps sent");

    // The canceled timer must never fire: advance past the wait window and
    // confirm no payment-wait reminder goes out.
    tokio::time::sleep(Duration::from_secs(8 * 60)).await;
    settle().await;
    assert_eq!(h.gateway.delivered().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn payment_wait_timer_fires_and_starts_funnel() {
    let h = harness();
    h.registry
        .upsert(funnel_of("CS_PIX", vec![step("p0", "pix reminder")]));

    h.engine
        .handle_payment_event(payment(PaymentEventKind::PixGenerated, "O42", "CS"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(7 * 60 + 1)).await;
    settle().await;

    let conv = h.engine.repository().get(&key()).unwrap();
    assert!(matches!(conv.phase, Phase::Completed { .. }));
    assert_eq!(h.gateway.delivered().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn transfer_after_interaction_skips_intro_steps() {
    let h = harness();
    h.registry.upsert(funnel_of(
        "CS_PIX",
        vec![waiting_step("p0", "pix reminder")],
    ));
    h.registry.upsert(funnel_of(
        "CS_APPROVED",
        vec![
            step("a0", "intro"),
            step("a1", "intro 2"),
            step("a2", "intro 3"),
            waiting_step("a3", "main content"),
        ],
    ));

    h.engine
        .handle_payment_event(payment(PaymentEventKind::PixGenerated, "O42", "CS"))
        .await
        .unwrap();

    // The wait elapses: the payment-wait funnel runs and pauses on its
    // waiting step, so the contact has now been messaged.
    tokio::time::sleep(Duration::from_secs(7 * 60 + 1)).await;
    settle().await;
    assert_eq!(h.gateway.delivered().await.len(), 1);

    let outcome = h
        .engine
        .handle_payment_event(payment(PaymentEventKind::Approved, "O42", "CS"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PaymentOutcome::TransferredToApproved {
            funnel_id: "CS_APPROVED".into(),
            starting_step: 3,
        }
    );

    let conv = h.engine.repository().get(&key()).unwrap();
    assert_eq!(conv.step, 3);
    assert_eq!(conv.phase, Phase::WaitingReply);
    // Exactly one more send: the skip-ahead step, none of the intro steps.
    let delivered = h.gateway.delivered().await;
    assert_eq!(delivered.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_exhausted_dispatch_sets_error_overlay() {
    let h = harness();
    h.registry.upsert(funnel_of(
        "CS_APPROVED",
        vec![step("a0", "thanks"), step("a1", "never sent")],
    ));
    for ch in ["wa01", "wa02", "wa03"] {
        h.gateway.fail_channel(ch);
    }

    // Delivery failure does not fail the event intake.
    let outcome = h
        .engine
        .handle_payment_event(payment(PaymentEventKind::Approved, "O1", "CS"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PaymentOutcome::ApprovedStarted {
            funnel_id: "CS_APPROVED".into()
        }
    );

    // 3 channels x 3 attempts, all failed.
    assert_eq!(h.gateway.call_count().await, 9);
    let conv = h.engine.repository().get(&key()).unwrap();
    assert!(conv.has_error);
    assert!(conv.error_message.as_deref().unwrap_or_default().contains("wa03"));
    assert_eq!(conv.phase, Phase::Active, "phase survives the error overlay");
    assert_eq!(conv.step, 0, "no auto-advance after failure");

    // No further automatic retry happens on unrelated inbound traffic.
    let outcome = h.engine.handle_inbound_message(inbound("hello")).await.unwrap();
    assert_eq!(outcome, InboundOutcome::NoAction);
    assert_eq!(h.gateway.call_count().await, 9);
}

#[tokio::test(start_paused = true)]
async fn canceled_conversation_never_dispatches_again() {
    let h = harness();
    h.registry.upsert(funnel_of(
        "F",
        vec![waiting_step("s0", "hi"), step("s1", "bye")],
    ));
    h.engine
        .triggers()
        .add(TriggerEntry::new("quero", "F"))
        .await
        .unwrap();
    h.engine.handle_inbound_message(inbound("quero")).await.unwrap();
    assert_eq!(h.gateway.delivered().await.len(), 1);

    let canceled = h
        .engine
        .cancel_conversation(&key(), CancelReason::Administrative)
        .await
        .unwrap();
    assert!(canceled);

    // A reply that would have advanced the funnel does nothing now.
    let outcome = h.engine.handle_inbound_message(inbound("ok")).await.unwrap();
    assert_eq!(outcome, InboundOutcome::NoAction);
    assert_eq!(h.gateway.delivered().await.len(), 1);

    // Cancel is idempotent on the terminal conversation.
    let canceled_again = h
        .engine
        .cancel_conversation(&key(), CancelReason::Administrative)
        .await
        .unwrap();
    assert!(!canceled_again);
}

#[tokio::test(start_paused = true)]
async fn duplicate_payment_wait_is_rejected() {
    let h = harness();
    h.registry
        .upsert(funnel_of("CS_PIX", vec![step("p0", "pix reminder")]));

    let first = h
        .engine
        .handle_payment_event(payment(PaymentEventKind::PixGenerated, "O42", "CS"))
        .await
        .unwrap();
    assert!(matches!(first, PaymentOutcome::PaymentWaitCreated { .. }));

    let second = h
        .engine
        .handle_payment_event(payment(PaymentEventKind::PixGenerated, "O43", "CS"))
        .await
        .unwrap();
    assert_eq!(second, PaymentOutcome::DuplicatePending);

    // The original order's timer is still the armed one.
    tokio::time::sleep(Duration::from_secs(7 * 60 + 1)).await;
    settle().await;
    let conv = h.engine.repository().get(&key()).unwrap();
    assert_eq!(conv.order_code, "O42");
}

#[tokio::test(start_paused = true)]
async fn pix_pending_is_observational() {
    let h = harness();
    let outcome = h
        .engine
        .handle_payment_event(payment(PaymentEventKind::PixPending, "O42", "CS"))
        .await
        .unwrap();
    assert_eq!(outcome, PaymentOutcome::Ignored);
    assert!(h.engine.repository().get(&key()).is_none());
}

#[tokio::test(start_paused = true)]
async fn unmapped_product_is_a_validation_error() {
    let h = harness();
    let err = h
        .engine
        .handle_payment_event(payment(PaymentEventKind::Approved, "O1", "XX"))
        .await
        .unwrap_err();
    assert!(matches!(err, flowzap_core::FlowzapError::Validation(_)));
}

#[tokio::test(start_paused = true)]
async fn trigger_cooldown_suppresses_second_start() {
    let h = harness();
    h.registry.upsert(funnel_of("F", vec![step("s0", "hi")]));
    h.engine
        .triggers()
        .add(TriggerEntry::new("quero", "F"))
        .await
        .unwrap();

    let first = h.engine.handle_inbound_message(inbound("quero")).await.unwrap();
    assert!(matches!(first, InboundOutcome::Triggered { .. }));
    // The single-step funnel completed, so the contact is idle again --
    // only the cooldown stands in the way.
    let second = h.engine.handle_inbound_message(inbound("quero")).await.unwrap();
    assert_eq!(second, InboundOutcome::NoAction);
    assert_eq!(h.gateway.delivered().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn trigger_hint_seeds_sticky_channel() {
    let h = harness();
    h.registry.upsert(funnel_of("F", vec![step("s0", "hi")]));
    h.engine
        .triggers()
        .add(TriggerEntry::new("quero", "F"))
        .await
        .unwrap();

    let mut message = inbound("quero");
    message.channel_hint = Some("wa02".into());
    h.engine.handle_inbound_message(message).await.unwrap();

    let delivered = h.gateway.delivered().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].channel.as_str(), "wa02");
    assert_eq!(
        h.engine.repository().sticky_for(&key()),
        Some(flowzap_core::ChannelId::from("wa02"))
    );
}

#[tokio::test(start_paused = true)]
async fn empty_triggered_funnel_is_ignored() {
    let h = harness();
    h.registry.upsert(funnel_of("F", vec![]));
    h.engine
        .triggers()
        .add(TriggerEntry::new("quero", "F"))
        .await
        .unwrap();

    let outcome = h.engine.handle_inbound_message(inbound("quero")).await.unwrap();
    assert_eq!(outcome, InboundOutcome::NoAction);
    assert!(h.gateway.delivered().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn own_messages_are_ignored() {
    let h = harness();
    h.registry.upsert(funnel_of("F", vec![step("s0", "hi")]));
    h.engine
        .triggers()
        .add(TriggerEntry::new("quero", "F"))
        .await
        .unwrap();

    let mut message = inbound("quero");
    message.from_me = true;
    let outcome = h.engine.handle_inbound_message(message).await.unwrap();
    assert_eq!(outcome, InboundOutcome::NoAction);
    assert!(h.gateway.delivered().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_event_waits_for_lock_and_times_out() {
    let h = harness();
    // The delay step keeps the first event's lock span open for 30 seconds.
    let mut slow = step("s0", "");
    slow.kind = flowzap_core::StepKind::Delay;
    slow.delay_secs = Some(30);
    h.registry
        .upsert(funnel_of("F", vec![slow, step("s1", "after delay")]));
    h.engine
        .triggers()
        .add(TriggerEntry::new("quero", "F"))
        .await
        .unwrap();

    let engine = h.engine.clone();
    let first = tokio::spawn(async move {
        engine.handle_inbound_message(inbound("quero")).await
    });
    tokio::task::yield_now().await;

    // The second event for the same contact cannot interleave; it waits the
    // full lock timeout (10s < 30s delay) and reports LockTimeout.
    let err = h
        .engine
        .handle_inbound_message(inbound("hello"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        flowzap_core::FlowzapError::LockTimeout { .. }
    ));

    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, InboundOutcome::Triggered { .. }));
}

#[tokio::test(start_paused = true)]
async fn step_index_stays_in_bounds() {
    let h = harness();
    h.registry.upsert(funnel_of(
        "F",
        vec![waiting_step("s0", "a"), step("s1", "b"), step("s2", "c")],
    ));
    h.engine
        .triggers()
        .add(TriggerEntry::new("quero", "F"))
        .await
        .unwrap();

    h.engine.handle_inbound_message(inbound("quero")).await.unwrap();
    let funnel_len = 3;
    let conv = h.engine.repository().get(&key()).unwrap();
    assert!(conv.step < funnel_len);

    h.engine.handle_inbound_message(inbound("ok")).await.unwrap();
    let conv = h.engine.repository().get(&key()).unwrap();
    assert!(conv.step < funnel_len);
    assert!(matches!(conv.phase, Phase::Completed { .. }));
}

#[tokio::test(start_paused = true)]
async fn snapshot_restore_rearms_payment_wait() {
    let h = harness();
    h.registry
        .upsert(funnel_of("CS_PIX", vec![step("p0", "pix reminder")]));
    h.engine
        .handle_payment_event(payment(PaymentEventKind::PixGenerated, "O42", "CS"))
        .await
        .unwrap();

    let snapshot = h.engine.snapshot().await;
    assert_eq!(snapshot.conversations.len(), 1);
    assert_eq!(snapshot.funnels.len(), 1);

    // A fresh engine restored from the snapshot re-arms the wait.
    let restored = harness();
    restored.engine.restore(snapshot).await;
    let conv = restored.engine.repository().get(&key()).unwrap();
    assert_eq!(conv.phase, Phase::PendingPayment);

    tokio::time::sleep(Duration::from_secs(7 * 60 + 1)).await;
    settle().await;
    let conv = restored.engine.repository().get(&key()).unwrap();
    assert!(matches!(conv.phase, Phase::Completed { .. }));
    assert_eq!(restored.gateway.delivered().await.len(), 1);
}
