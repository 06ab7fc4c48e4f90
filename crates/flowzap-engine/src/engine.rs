// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The conversation state machine.
//!
//! One [`FunnelEngine`] instance orchestrates everything: payment events and
//! inbound messages come in through [`handle_payment_event`] and
//! [`handle_inbound_message`], acquire the contact's lock for the whole
//! event span, and drive the conversation through the repository, trigger
//! matcher, payment-wait timers, and channel dispatcher. The payment-wait
//! timer re-enters the engine through the same lock, so a firing timer and a
//! concurrently arriving approval can never both transition the conversation.
//!
//! [`handle_payment_event`]: FunnelEngine::handle_payment_event
//! [`handle_inbound_message`]: FunnelEngine::handle_inbound_message

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use flowzap_config::model::{EngineConfig, FlowzapConfig};
use flowzap_core::conversation::{
    CancelReason, Conversation, ConversationSeed, ConversationSource, Phase,
};
use flowzap_core::error::FlowzapError;
use flowzap_core::event::{
    InboundMessage, InboundOutcome, PaymentEvent, PaymentEventKind, PaymentOutcome,
};
use flowzap_core::funnel::StepKind;
use flowzap_core::snapshot::SystemSnapshot;
use flowzap_core::traits::{FunnelRegistry, MessageGateway};
use flowzap_core::types::{ContactKey, DeliveryTarget};

use crate::catalog::ProductCatalog;
use crate::dispatcher::ChannelDispatcher;
use crate::locks::ContactLocks;
use crate::repository::{ConversationRepository, RepositoryStats};
use crate::timer::PaymentTimers;
use crate::trigger::TriggerMatcher;

/// Why a conversation advanced one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdvanceReason {
    Auto,
    Reply,
}

/// Whether stepping should continue after an index advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    Continue,
    Stop,
}

/// Engine timings, resolved once from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub payment_wait: Duration,
    pub typing: Duration,
    pub default_step_delay: Duration,
    pub lock_timeout: Duration,
    pub transfer_skip_steps: usize,
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            payment_wait: Duration::from_secs(config.payment_wait_secs),
            typing: Duration::from_secs(config.typing_secs),
            default_step_delay: Duration::from_secs(config.default_step_delay_secs),
            lock_timeout: Duration::from_secs(config.lock_timeout_secs),
            transfer_skip_steps: config.transfer_skip_steps,
        }
    }
}

/// Aggregate counters for the operator surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStats {
    #[serde(flatten)]
    pub conversations: RepositoryStats,
    pub pending_timers: usize,
    pub trigger_phrases: usize,
    pub funnels: usize,
}

/// The conversation orchestration engine.
pub struct FunnelEngine {
    repo: Arc<ConversationRepository>,
    locks: ContactLocks,
    timers: PaymentTimers,
    dispatcher: ChannelDispatcher,
    triggers: TriggerMatcher,
    registry: Arc<dyn FunnelRegistry>,
    catalog: ProductCatalog,
    settings: EngineSettings,
    /// Handle to ourselves for the spawned timer tasks.
    weak_self: Weak<FunnelEngine>,
}

impl FunnelEngine {
    pub fn new(
        config: &FlowzapConfig,
        gateway: Arc<dyn MessageGateway>,
        registry: Arc<dyn FunnelRegistry>,
    ) -> Arc<Self> {
        let repo = Arc::new(ConversationRepository::new());
        let dispatcher = ChannelDispatcher::new(
            gateway,
            repo.clone(),
            config
                .dispatch
                .channels
                .iter()
                .map(|c| c.as_str().into())
                .collect(),
            config.dispatch.max_attempts,
            Duration::from_secs(config.dispatch.retry_backoff_secs),
        );
        let triggers = TriggerMatcher::new(
            repo.clone(),
            config.engine.trigger_match_mode,
            config.engine.trigger_cooldown_secs,
        );
        Arc::new_cyclic(|weak_self| Self {
            repo,
            locks: ContactLocks::new(),
            timers: PaymentTimers::new(),
            dispatcher,
            triggers,
            registry,
            catalog: ProductCatalog::from_config(&config.products),
            settings: EngineSettings::from(&config.engine),
            weak_self: weak_self.clone(),
        })
    }

    pub fn repository(&self) -> &Arc<ConversationRepository> {
        &self.repo
    }

    pub fn registry(&self) -> &Arc<dyn FunnelRegistry> {
        &self.registry
    }

    pub fn triggers(&self) -> &TriggerMatcher {
        &self.triggers
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            conversations: self.repo.stats(),
            pending_timers: self.timers.len(),
            trigger_phrases: self.triggers.count().await,
            funnels: self.registry.list().len(),
        }
    }

    /// Applies a payment-provider event and reports the transition taken.
    pub async fn handle_payment_event(
        &self,
        event: PaymentEvent,
    ) -> Result<PaymentOutcome, FlowzapError> {
        let key = ContactKey::from_phone(&event.full_phone)?;
        let target = DeliveryTarget::from_phone(&event.full_phone);
        let binding = self
            .catalog
            .binding(&event.product_code)
            .cloned()
            .ok_or_else(|| {
                FlowzapError::Validation(format!("unmapped product `{}`", event.product_code))
            })?;

        let _guard = self.locks.acquire(&key, self.settings.lock_timeout).await?;
        self.repo.register_phone(&event.full_phone, &key);

        info!(
            contact = %key,
            kind = %event.kind,
            order = %event.order_code,
            product = %event.product_code,
            "payment event received"
        );

        match event.kind {
            PaymentEventKind::Approved => {
                let existing = self.repo.get(&key);
                let in_payment_wait_funnel = existing
                    .as_ref()
                    .map(|c| !c.is_terminal() && self.catalog.is_pending_funnel(&c.funnel_id))
                    .unwrap_or(false);

                if in_payment_wait_funnel {
                    let starting_step = self
                        .transfer_to_approved(&key, &target, &event, &binding.approved_funnel)
                        .await;
                    Ok(PaymentOutcome::TransferredToApproved {
                        funnel_id: binding.approved_funnel,
                        starting_step,
                    })
                } else {
                    // A stray timer can exist when the payment-wait
                    // conversation was already replaced; approval kills it.
                    self.timers.cancel(&key);
                    if existing.map(|c| !c.is_terminal()).unwrap_or(false) {
                        self.repo.update(&key, |c| {
                            c.cancel(CancelReason::Superseded);
                        });
                    }
                    let seed = seed_from_event(&key, &target, &event, &binding.approved_funnel);
                    self.install_and_run(Conversation::started(seed, 0)).await;
                    Ok(PaymentOutcome::ApprovedStarted {
                        funnel_id: binding.approved_funnel,
                    })
                }
            }
            PaymentEventKind::PixGenerated => {
                if let Some(existing) = self.repo.get(&key) {
                    if !existing.is_terminal() {
                        info!(contact = %key, "payment wait skipped, conversation already exists");
                        return Ok(PaymentOutcome::DuplicatePending);
                    }
                }
                let seed = seed_from_event(&key, &target, &event, &binding.pending_funnel);
                self.repo.insert(Conversation::pending_payment(seed));
                self.schedule_payment_wait(&key, &event.order_code);
                info!(
                    contact = %key,
                    order = %event.order_code,
                    wait_secs = self.settings.payment_wait.as_secs(),
                    "payment wait created"
                );
                Ok(PaymentOutcome::PaymentWaitCreated {
                    funnel_id: binding.pending_funnel,
                })
            }
            PaymentEventKind::PixPending => {
                debug!(contact = %key, order = %event.order_code, "pix pending event, no transition");
                Ok(PaymentOutcome::Ignored)
            }
        }
    }

    /// Applies an inbound message: trigger matching for idle contacts,
    /// reply advancement for waiting conversations.
    pub async fn handle_inbound_message(
        &self,
        message: InboundMessage,
    ) -> Result<InboundOutcome, FlowzapError> {
        if message.from_me {
            return Ok(InboundOutcome::NoAction);
        }
        let key = ContactKey::from_phone(&message.full_phone)?;
        let target = DeliveryTarget::from_phone(&message.full_phone);

        let _guard = self.locks.acquire(&key, self.settings.lock_timeout).await?;
        self.repo.register_phone(&message.full_phone, &key);

        let conversation = self.repo.get(&key);
        let in_conversation = conversation
            .as_ref()
            .map(|c| !c.is_terminal())
            .unwrap_or(false);

        if !in_conversation {
            if let Some(funnel_id) = self.triggers.check(&key, &message.text).await {
                return self
                    .start_triggered_funnel(&key, &target, funnel_id, message.channel_hint)
                    .await;
            }
        }

        match conversation {
            Some(c) if c.phase == Phase::WaitingReply => {
                info!(contact = %key, step = c.step, "reply received");
                if self.advance_index(&key, AdvanceReason::Reply) == Advance::Continue {
                    self.run_steps(&key).await;
                }
                Ok(InboundOutcome::Advanced)
            }
            _ => Ok(InboundOutcome::NoAction),
        }
    }

    /// Administrative cancel. Returns whether a non-terminal conversation
    /// was actually canceled.
    pub async fn cancel_conversation(
        &self,
        key: &ContactKey,
        reason: CancelReason,
    ) -> Result<bool, FlowzapError> {
        let _guard = self.locks.acquire(key, self.settings.lock_timeout).await?;
        self.timers.cancel(key);
        let mut changed = false;
        self.repo.update(key, |c| {
            changed = c.cancel(reason);
        });
        if changed {
            info!(contact = %key, reason = %reason, "conversation canceled");
        }
        Ok(changed)
    }

    /// Serializable image of the engine's state.
    pub async fn snapshot(&self) -> SystemSnapshot {
        let mut snapshot = SystemSnapshot {
            funnels: self.registry.list(),
            triggers: self.triggers.list().await,
            ..Default::default()
        };
        self.repo.export_into(&mut snapshot);
        snapshot
    }

    /// Restores engine state from a snapshot.
    ///
    /// Payment-wait conversations get their timers re-armed with a full
    /// wait window, since running timers cannot survive a restart.
    pub async fn restore(&self, snapshot: SystemSnapshot) {
        for funnel in &snapshot.funnels {
            self.registry.upsert(funnel.clone());
        }
        self.triggers.replace_all(snapshot.triggers.clone()).await;
        self.repo.restore_from(&snapshot);

        let mut rearmed = 0usize;
        for conversation in &snapshot.conversations {
            if conversation.phase == Phase::PendingPayment {
                self.schedule_payment_wait(
                    &conversation.contact_key,
                    &conversation.order_code,
                );
                rearmed += 1;
            }
        }
        info!(
            conversations = snapshot.conversations.len(),
            funnels = snapshot.funnels.len(),
            triggers = snapshot.triggers.len(),
            rearmed_timers = rearmed,
            "engine state restored"
        );
    }

    // --- internals; all run with the contact's lock held ---

    async fn start_triggered_funnel(
        &self,
        key: &ContactKey,
        target: &DeliveryTarget,
        funnel_id: String,
        channel_hint: Option<flowzap_core::types::ChannelId>,
    ) -> Result<InboundOutcome, FlowzapError> {
        let Some(funnel) = self.registry.get(&funnel_id) else {
            warn!(contact = %key, funnel = %funnel_id, "triggered funnel does not exist");
            return Ok(InboundOutcome::NoAction);
        };
        if funnel.is_empty() {
            warn!(contact = %key, funnel = %funnel_id, "triggered funnel has no steps");
            return Ok(InboundOutcome::NoAction);
        }

        // Receiving channel becomes the sticky channel before the first send.
        if let Some(hint) = channel_hint {
            if self.dispatcher.pool_contains(&hint) {
                debug!(contact = %key, channel = %hint, "sticky channel seeded from inbound hint");
                self.repo.set_sticky(key, hint);
            }
        }

        let seed = ConversationSeed {
            contact_key: key.clone(),
            target: target.clone(),
            funnel_id: funnel_id.clone(),
            order_code: format!("trigger-{}", uuid::Uuid::new_v4()),
            customer_name: String::new(),
            product_code: "trigger".into(),
            amount: String::new(),
            source: ConversationSource::Trigger,
        };
        self.install_and_run(Conversation::started(seed, 0)).await;
        Ok(InboundOutcome::Triggered { funnel_id })
    }

    /// Cancels the payment-wait conversation and its timer, then starts the
    /// approved funnel. The starting step skips the introductory steps when
    /// the contact already interacted with the payment-wait funnel.
    async fn transfer_to_approved(
        &self,
        key: &ContactKey,
        target: &DeliveryTarget,
        event: &PaymentEvent,
        approved_funnel: &str,
    ) -> usize {
        let prior = self.repo.get(key);
        let never_started = prior.as_ref().map(|c| c.never_started()).unwrap_or(true);
        let previous_funnel = prior.map(|c| c.funnel_id);

        self.repo.update(key, |c| {
            c.cancel(CancelReason::PaymentApproved);
        });
        self.timers.cancel(key);

        let starting_step = if never_started {
            0
        } else {
            self.settings.transfer_skip_steps
        };
        info!(
            contact = %key,
            order = %event.order_code,
            starting_step,
            never_started,
            "transferring to approved funnel"
        );

        let seed = seed_from_event(key, target, event, approved_funnel);
        let mut conversation = Conversation::started(seed, starting_step);
        conversation.transferred_from_pending = true;
        conversation.previous_funnel = previous_funnel;
        self.install_and_run(conversation).await;
        starting_step
    }

    async fn install_and_run(&self, conversation: Conversation) {
        let key = conversation.contact_key.clone();
        info!(
            contact = %key,
            funnel = %conversation.funnel_id,
            step = conversation.step,
            source = %conversation.source,
            "funnel started"
        );
        self.repo.insert(conversation);
        self.run_steps(&key).await;
    }

    /// Arms the payment-wait timer and spawns its sleeping task.
    ///
    /// The task holds only a weak engine reference; if the engine is gone by
    /// fire time, nothing happens.
    fn schedule_payment_wait(&self, key: &ContactKey, order_code: &str) {
        let token = self.timers.arm(key.clone(), order_code.to_string());
        let engine = self.weak_self.clone();
        let key = key.clone();
        let order_code = order_code.to_string();
        let wait = self.settings.payment_wait;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
            let Some(engine) = engine.upgrade() else { return };
            engine.on_payment_wait_elapsed(key, order_code).await;
        });
    }

    /// Timer fire path. Competes for the contact lock like any other event.
    async fn on_payment_wait_elapsed(&self, key: ContactKey, order_code: String) {
        let guard = self.locks.acquire(&key, self.settings.lock_timeout).await;
        let _guard = match guard {
            Ok(guard) => guard,
            Err(e) => {
                error!(contact = %key, error = %e, "payment-wait fire could not acquire contact lock");
                return;
            }
        };

        if !self.timers.confirm_fire(&key, &order_code) {
            debug!(contact = %key, order = %order_code, "stale payment-wait fire ignored");
            return;
        }

        let Some(conversation) = self.repo.get(&key) else {
            return;
        };
        if conversation.phase != Phase::PendingPayment || conversation.order_code != order_code {
            debug!(contact = %key, "conversation moved on before payment wait elapsed");
            return;
        }

        info!(contact = %key, order = %order_code, "payment wait elapsed, starting funnel");
        self.repo.update(&key, |c| {
            c.phase = Phase::Active;
            c.step = 0;
        });
        self.run_steps(&key).await;
    }

    /// Executes the current step and keeps going while steps auto-advance.
    ///
    /// Stops on: terminal/pending phases, missing funnel or step (silent
    /// completion edge), a `wait_for_reply` pause, funnel completion, or a
    /// dispatch failure (which sets the error overlay).
    async fn run_steps(&self, key: &ContactKey) {
        loop {
            let Some(conversation) = self.repo.get(key) else {
                return;
            };
            match conversation.phase {
                Phase::Canceled { .. } => {
                    debug!(contact = %key, "conversation canceled, step skipped");
                    return;
                }
                Phase::PendingPayment => {
                    debug!(contact = %key, "awaiting payment wait, step skipped");
                    return;
                }
                Phase::Completed { .. } => return,
                Phase::Active | Phase::WaitingReply => {}
            }

            let Some(funnel) = self.registry.get(&conversation.funnel_id) else {
                warn!(contact = %key, funnel = %conversation.funnel_id, "funnel vanished mid-conversation");
                return;
            };
            let Some(step) = funnel.steps.get(conversation.step).cloned() else {
                debug!(contact = %key, step = conversation.step, "no step at index, nothing to send");
                return;
            };

            let first_message =
                conversation.step == 0 && conversation.last_system_message.is_none();

            if let Some(delay) = step.delay_before_secs.filter(|d| *d > 0) {
                debug!(contact = %key, delay, "waiting before step");
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
            if step.show_typing && step.kind != StepKind::Delay {
                tokio::time::sleep(self.settings.typing).await;
            }

            let result = if step.kind == StepKind::Delay {
                let delay = step
                    .delay_secs
                    .map(Duration::from_secs)
                    .unwrap_or(self.settings.default_step_delay);
                debug!(contact = %key, secs = delay.as_secs(), "delay step");
                tokio::time::sleep(delay).await;
                Ok(())
            } else {
                self.dispatcher
                    .dispatch(key, &conversation.target, &step, first_message)
                    .await
                    .map(|_| ())
            };

            match result {
                Ok(()) => {
                    self.repo.update(key, |c| {
                        c.last_system_message = Some(Utc::now());
                    });
                    if step.wait_for_reply && step.kind != StepKind::Delay {
                        self.repo.update(key, |c| {
                            c.phase = Phase::WaitingReply;
                        });
                        info!(contact = %key, step = conversation.step, "waiting for reply");
                        return;
                    }
                    if self.advance_index(key, AdvanceReason::Auto) == Advance::Stop {
                        return;
                    }
                }
                Err(e) => {
                    warn!(contact = %key, step = conversation.step, error = %e, "step dispatch failed");
                    self.repo.update(key, |c| {
                        c.record_error(e.to_string());
                    });
                    return;
                }
            }
        }
    }

    /// Moves to the next step or completes the funnel.
    fn advance_index(&self, key: &ContactKey, reason: AdvanceReason) -> Advance {
        let Some(conversation) = self.repo.get(key) else {
            return Advance::Stop;
        };
        if conversation.phase.is_canceled() {
            debug!(contact = %key, "conversation canceled, advance skipped");
            return Advance::Stop;
        }
        let Some(funnel) = self.registry.get(&conversation.funnel_id) else {
            return Advance::Stop;
        };

        let next = conversation.step + 1;
        if next >= funnel.steps.len() {
            self.repo.update(key, |c| {
                c.phase = Phase::Completed { at: Utc::now() };
            });
            info!(contact = %key, funnel = %conversation.funnel_id, "funnel completed");
            return Advance::Stop;
        }

        self.repo.update(key, |c| {
            c.step = next;
            c.phase = Phase::Active;
            if reason == AdvanceReason::Reply {
                c.last_reply = Some(Utc::now());
            }
        });
        debug!(contact = %key, step = next, "advanced to next step");
        Advance::Continue
    }
}

fn seed_from_event(
    key: &ContactKey,
    target: &DeliveryTarget,
    event: &PaymentEvent,
    funnel_id: &str,
) -> ConversationSeed {
    ConversationSeed {
        contact_key: key.clone(),
        target: target.clone(),
        funnel_id: funnel_id.to_string(),
        order_code: event.order_code.clone(),
        customer_name: event.customer_name.clone(),
        product_code: event.product_code.clone(),
        amount: event.amount.clone(),
        source: ConversationSource::Payment,
    }
}
