//! EventReconciler - applies processor lifecycle events to local state.
//!
//! Every update is keyed by the processor's entity id and sets fields rather
//! than incrementing them, so replaying an event is harmless. Status is
//! last-writer-wins: the event's stated status is applied even when it moves
//! a subscription out of a terminal state. Such regressions are logged and
//! flagged in the audit trail. With `reject_stale_events` enabled, an event
//! created before the last applied one is skipped instead.
//!
//! Concurrent events for one subscription race on the stored version. The
//! loser re-reads the record and applies its event again on top of the
//! winner's write.

use std::sync::Arc;

use crate::domain::billing::{
    cycle_end, Actor, BillingError, EntityKind, EventKind, NewSubscription, Payment,
    PaymentStatus, ProcessorEvent, StatusChange, Subscription, SubscriptionStatus,
};
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::ports::{
    CustomerRepository, InvoiceEntity, OrderEntity, PaymentEntity, PaymentRepository,
    SubscriptionEntity, SubscriptionRepository,
};

use super::resolver::{CustomerContext, UpsertResolver};
use super::{write_conflict, MAX_WRITE_ATTEMPTS};

/// One read-modify-write attempt.
enum Attempt {
    Done(ReconcileOutcome),
    /// Another writer got there first; re-read and retry.
    Lost,
}

/// What applying one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    SubscriptionUpdated {
        subscription_id: SubscriptionId,
        change: StatusChange,
    },
    SubscriptionUnchanged {
        subscription_id: SubscriptionId,
    },
    /// Unknown subscription created from the event.
    SubscriptionMaterialized {
        subscription_id: SubscriptionId,
        status: SubscriptionStatus,
    },
    PaymentRecorded {
        razorpay_payment_id: String,
        status: PaymentStatus,
    },
    InvoiceObserved {
        subscription_id: Option<SubscriptionId>,
    },
    /// Older than the last applied event; skipped.
    Stale {
        subscription_id: SubscriptionId,
    },
    Ignored {
        reason: String,
    },
}

impl ReconcileOutcome {
    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        match self {
            ReconcileOutcome::SubscriptionUpdated { subscription_id, .. }
            | ReconcileOutcome::SubscriptionUnchanged { subscription_id }
            | ReconcileOutcome::SubscriptionMaterialized { subscription_id, .. }
            | ReconcileOutcome::Stale { subscription_id } => Some(*subscription_id),
            ReconcileOutcome::InvoiceObserved { subscription_id } => *subscription_id,
            _ => None,
        }
    }

    fn ignored(reason: impl Into<String>) -> Self {
        ReconcileOutcome::Ignored {
            reason: reason.into(),
        }
    }
}

pub struct EventReconciler {
    resolver: Arc<UpsertResolver>,
    customers: Arc<dyn CustomerRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    payments: Arc<dyn PaymentRepository>,
    reject_stale_events: bool,
}

impl EventReconciler {
    pub fn new(
        resolver: Arc<UpsertResolver>,
        customers: Arc<dyn CustomerRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        payments: Arc<dyn PaymentRepository>,
    ) -> Self {
        Self {
            resolver,
            customers,
            subscriptions,
            payments,
            reject_stale_events: false,
        }
    }

    pub fn with_stale_event_rejection(mut self, enabled: bool) -> Self {
        self.reject_stale_events = enabled;
        self
    }

    /// Applies one verified event.
    pub async fn apply(&self, event: &ProcessorEvent) -> Result<ReconcileOutcome, BillingError> {
        let name = event.event.as_str();
        match event.kind() {
            EventKind::PaymentStatus => {
                let payment = required::<PaymentEntity>(event, EntityKind::Payment)?;
                self.record_payment(&payment, name, None).await
            }
            EventKind::SubscriptionStatus => {
                let entity = required::<SubscriptionEntity>(event, EntityKind::Subscription)?;
                self.apply_subscription(&entity, Some(name), Actor::Webhook, event.occurred_at())
                    .await
            }
            EventKind::SubscriptionCharged => {
                if let Some(payment) = optional::<PaymentEntity>(event, EntityKind::Payment)? {
                    self.record_payment(&payment, name, None).await?;
                }
                let entity = required::<SubscriptionEntity>(event, EntityKind::Subscription)?;
                self.apply_subscription(&entity, Some(name), Actor::Webhook, event.occurred_at())
                    .await
            }
            EventKind::OrderPaid => {
                let order = optional::<OrderEntity>(event, EntityKind::Order)?;
                match optional::<PaymentEntity>(event, EntityKind::Payment)? {
                    Some(payment) => {
                        let order_id = order.map(|o| o.id);
                        self.record_payment(&payment, name, order_id).await
                    }
                    None => Ok(ReconcileOutcome::ignored("order.paid without payment entity")),
                }
            }
            EventKind::InvoiceStatus => self.observe_invoice(event).await,
            EventKind::Unknown => {
                tracing::info!(event = name, "Ignoring unhandled processor event");
                Ok(ReconcileOutcome::ignored(format!("unhandled event {}", name)))
            }
        }
    }

    /// Applies a processor subscription entity: status, counters and, for an
    /// unknown id, a self-healing create. Shared by webhooks and polling.
    pub async fn apply_subscription(
        &self,
        entity: &SubscriptionEntity,
        event: Option<&str>,
        actor: Actor,
        occurred_at: Option<Timestamp>,
    ) -> Result<ReconcileOutcome, BillingError> {
        let status = entity.stated_status(event).ok_or_else(|| {
            BillingError::InvalidEvent(format!("subscription {} carries no status", entity.id))
        })?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let result = match self.subscriptions.find_by_razorpay_id(&entity.id).await? {
                Some(existing) => {
                    self.update_existing(existing, entity, status, event, actor, occurred_at)
                        .await?
                }
                None => {
                    self.materialize(entity, status, event, actor, occurred_at)
                        .await?
                }
            };
            match result {
                Attempt::Done(outcome) => return Ok(outcome),
                Attempt::Lost => tracing::debug!(
                    razorpay_subscription_id = %entity.id,
                    event = event.unwrap_or("-"),
                    attempt,
                    "Subscription changed underneath, re-applying"
                ),
            }
        }
        Err(write_conflict(&entity.id))
    }

    async fn update_existing(
        &self,
        mut subscription: Subscription,
        entity: &SubscriptionEntity,
        status: SubscriptionStatus,
        event: Option<&str>,
        actor: Actor,
        occurred_at: Option<Timestamp>,
    ) -> Result<Attempt, BillingError> {
        let subscription_id = subscription.id;

        if let Some(at) = occurred_at {
            if self.reject_stale_events && subscription.is_stale(at) {
                tracing::info!(
                    %subscription_id,
                    event = event.unwrap_or("-"),
                    "Skipping event older than last applied"
                );
                return Ok(Attempt::Done(ReconcileOutcome::Stale { subscription_id }));
            }
        }

        let counters = entity.counters();
        let differs = subscription.status != status || counters.paid_count > subscription.paid_count;
        if actor == Actor::ManualCheck && differs {
            subscription.mark_checked(status);
        }

        let last_event_before = subscription.last_event_at;
        let change = subscription.apply_status(status, actor, event);
        let counters_changed = subscription.sync_counters(counters, actor);
        if let Some(at) = occurred_at {
            subscription.record_event_time(at);
        }

        if let StatusChange::Changed {
            from,
            to,
            regression: true,
        } = change
        {
            tracing::warn!(
                %subscription_id,
                %from,
                %to,
                event = event.unwrap_or("-"),
                "Subscription left a terminal status"
            );
        }

        let dirty = change.is_changed()
            || counters_changed
            || differs
            || subscription.last_event_at != last_event_before;
        if !dirty {
            return Ok(Attempt::Done(ReconcileOutcome::SubscriptionUnchanged {
                subscription_id,
            }));
        }

        match self.subscriptions.update(&subscription).await {
            Ok(()) => {}
            Err(err) if err.is_conflict() => return Ok(Attempt::Lost),
            Err(err) => return Err(err.into()),
        }
        tracing::debug!(%subscription_id, status = %subscription.status, "Subscription reconciled");
        Ok(Attempt::Done(ReconcileOutcome::SubscriptionUpdated {
            subscription_id,
            change,
        }))
    }

    /// Creates the local record for a subscription known only to the
    /// processor, e.g. after a crash between the processor call and the save.
    async fn materialize(
        &self,
        entity: &SubscriptionEntity,
        status: SubscriptionStatus,
        event: Option<&str>,
        actor: Actor,
        occurred_at: Option<Timestamp>,
    ) -> Result<Attempt, BillingError> {
        let plan_id = entity.plan_id.as_deref().ok_or_else(|| {
            BillingError::InvalidEvent(format!("subscription {} has no plan_id", entity.id))
        })?;
        let customer_id = entity.customer_id.as_deref().ok_or_else(|| {
            BillingError::InvalidEvent(format!("subscription {} has no customer_id", entity.id))
        })?;

        let plan = self.resolver.resolve_plan(plan_id).await?;
        let customer = self
            .resolver
            .resolve_customer(customer_id, CustomerContext::default())
            .await?;

        let counters = entity.counters();
        let start_date = [entity.start_at, entity.current_start, entity.created_at]
            .into_iter()
            .flatten()
            .find_map(Timestamp::from_unix_secs)
            .unwrap_or_else(Timestamp::now);
        let total_count = entity
            .total_count
            .filter(|c| *c > 0)
            .unwrap_or_else(|| plan.billing_period.default_total_count());

        let mut subscription = Subscription::create(
            NewSubscription {
                razorpay_subscription_id: entity.id.clone(),
                customer_id: customer.id,
                plan_id: plan.id,
                status,
                start_date,
                end_date: cycle_end(&plan, start_date, total_count)?,
                start_at: entity.start_at.and_then(Timestamp::from_unix_secs),
                charge_at: counters.charge_at,
                total_count,
                paid_count: counters.paid_count,
                billing_period: plan.billing_period,
                is_renewal: false,
                short_url: entity.short_url.clone(),
            },
            Actor::SelfHeal,
        )?;
        subscription.current_start = counters.current_start;
        subscription.current_end = counters.current_end;
        if let Some(at) = occurred_at {
            subscription.record_event_time(at);
        }

        match self.subscriptions.insert(&subscription).await {
            Ok(()) => {
                tracing::warn!(
                    razorpay_subscription_id = %entity.id,
                    subscription_id = %subscription.id,
                    %status,
                    event = event.unwrap_or("-"),
                    "Materialized unknown subscription from processor state"
                );
                Ok(Attempt::Done(ReconcileOutcome::SubscriptionMaterialized {
                    subscription_id: subscription.id,
                    status,
                }))
            }
            Err(err) if err.is_duplicate() => {
                tracing::debug!(
                    razorpay_subscription_id = %entity.id,
                    "Concurrent create won, applying event to stored record"
                );
                Ok(Attempt::Lost)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn record_payment(
        &self,
        entity: &PaymentEntity,
        event: &str,
        order_id: Option<String>,
    ) -> Result<ReconcileOutcome, BillingError> {
        let status = entity
            .payment_status()
            .ok()
            .or_else(|| payment_status_from_event(event))
            .ok_or_else(|| {
                BillingError::InvalidEvent(format!(
                    "payment {} has unknown status {}",
                    entity.id, entity.status
                ))
            })?;

        let mut payment = Payment::new(&entity.id, entity.amount, entity.currency.clone(), status)?;
        payment.razorpay_order_id = order_id.or_else(|| entity.order_id.clone());
        payment.method = entity.method.clone();
        payment.details = serde_json::to_value(entity)
            .map_err(|e| BillingError::InvalidEvent(e.to_string()))?;
        if let Some(customer_id) = entity.customer_id.as_deref() {
            payment.customer_id = self
                .customers
                .find_by_razorpay_id(customer_id)
                .await?
                .map(|c| c.id);
        }

        let stored = self.payments.upsert(&payment).await?;
        tracing::info!(
            razorpay_payment_id = %stored.razorpay_payment_id,
            status = %stored.status,
            event,
            "Payment recorded"
        );
        Ok(ReconcileOutcome::PaymentRecorded {
            razorpay_payment_id: stored.razorpay_payment_id,
            status: stored.status,
        })
    }

    async fn observe_invoice(&self, event: &ProcessorEvent) -> Result<ReconcileOutcome, BillingError> {
        let invoice = required::<InvoiceEntity>(event, EntityKind::Invoice)?;
        if let Some(payment) = optional::<PaymentEntity>(event, EntityKind::Payment)? {
            self.record_payment(&payment, &event.event, None).await?;
        }

        let Some(razorpay_subscription_id) = invoice.subscription_id.as_deref() else {
            return Ok(ReconcileOutcome::InvoiceObserved {
                subscription_id: None,
            });
        };
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let Some(mut subscription) = self
                .subscriptions
                .find_by_razorpay_id(razorpay_subscription_id)
                .await?
            else {
                tracing::info!(
                    invoice_id = %invoice.id,
                    razorpay_subscription_id,
                    "Invoice for unknown subscription, nothing to annotate"
                );
                return Ok(ReconcileOutcome::InvoiceObserved {
                    subscription_id: None,
                });
            };

            subscription.observe_invoice(&event.event, invoice.status.as_deref());
            match self.subscriptions.update(&subscription).await {
                Ok(()) => {
                    return Ok(ReconcileOutcome::InvoiceObserved {
                        subscription_id: Some(subscription.id),
                    })
                }
                Err(err) if err.is_conflict() => tracing::debug!(
                    invoice_id = %invoice.id,
                    attempt,
                    "Subscription changed underneath, re-annotating invoice"
                ),
                Err(err) => return Err(err.into()),
            }
        }
        Err(write_conflict(razorpay_subscription_id))
    }
}

fn payment_status_from_event(event: &str) -> Option<PaymentStatus> {
    match event {
        "payment.authorized" => Some(PaymentStatus::Authorized),
        "payment.captured" | "order.paid" => Some(PaymentStatus::Captured),
        "payment.failed" => Some(PaymentStatus::Failed),
        _ => None,
    }
}

fn optional<T: serde::de::DeserializeOwned>(
    event: &ProcessorEvent,
    kind: EntityKind,
) -> Result<Option<T>, BillingError> {
    event
        .entity(kind)
        .map_err(|e| BillingError::InvalidEvent(format!("{}: {}", event.event, e)))
}

fn required<T: serde::de::DeserializeOwned>(
    event: &ProcessorEvent,
    kind: EntityKind,
) -> Result<T, BillingError> {
    optional(event, kind)?.ok_or_else(|| {
        BillingError::InvalidEvent(format!("{} is missing its {:?} entity", event.event, kind))
    })
}
