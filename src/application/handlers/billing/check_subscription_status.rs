//! CheckSubscriptionStatusHandler - poll path for missed or late webhooks.
//!
//! Fetches the processor's current view of a subscription and feeds it
//! through the same reconciliation logic a webhook would use.

use std::sync::Arc;

use crate::domain::billing::{Actor, BillingError, Subscription, SubscriptionStatus};
use crate::ports::{PaymentProcessor, SubscriptionRepository};

use super::reconcile_event::{EventReconciler, ReconcileOutcome};

#[derive(Debug, Clone)]
pub struct CheckSubscriptionStatusCommand {
    pub razorpay_subscription_id: String,
}

#[derive(Debug, Clone)]
pub struct CheckSubscriptionStatusResult {
    pub subscription: Subscription,
    pub processor_status: SubscriptionStatus,
    /// Local state differed from the processor and was updated.
    pub changed: bool,
}

pub struct CheckSubscriptionStatusHandler {
    processor: Arc<dyn PaymentProcessor>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    reconciler: Arc<EventReconciler>,
}

impl CheckSubscriptionStatusHandler {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        reconciler: Arc<EventReconciler>,
    ) -> Self {
        Self {
            processor,
            subscriptions,
            reconciler,
        }
    }

    pub async fn handle(
        &self,
        cmd: CheckSubscriptionStatusCommand,
    ) -> Result<CheckSubscriptionStatusResult, BillingError> {
        let id = cmd.razorpay_subscription_id.trim();
        if id.is_empty() {
            return Err(BillingError::missing("subscription_id"));
        }

        let entity = self
            .processor
            .fetch_subscription(id)
            .await
            .map_err(|e| BillingError::from_lookup("subscription", id, e))?
            .ok_or_else(|| BillingError::not_found("subscription", id))?;

        let processor_status = entity.stated_status(None).ok_or_else(|| {
            BillingError::InvalidEvent(format!("processor returned subscription {} without status", id))
        })?;

        let outcome = self
            .reconciler
            .apply_subscription(&entity, None, Actor::ManualCheck, None)
            .await?;
        let changed = !matches!(outcome, ReconcileOutcome::SubscriptionUnchanged { .. });

        let subscription = self
            .subscriptions
            .find_by_razorpay_id(id)
            .await?
            .ok_or_else(|| BillingError::not_found("subscription", id))?;

        tracing::info!(
            razorpay_subscription_id = id,
            subscription_id = %subscription.id,
            %processor_status,
            changed,
            "Subscription status checked against processor"
        );

        Ok(CheckSubscriptionStatusResult {
            subscription,
            processor_status,
            changed,
        })
    }
}
