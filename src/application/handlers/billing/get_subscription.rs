//! GetSubscriptionHandler - local snapshot lookup.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Customer, Plan, Subscription};
use crate::domain::foundation::SubscriptionId;
use crate::ports::{CustomerRepository, PlanRepository, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct GetSubscriptionQuery {
    /// Local id or processor id (`sub_...`).
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct SubscriptionView {
    pub subscription: Subscription,
    pub customer: Option<Customer>,
    pub plan: Option<Plan>,
}

pub struct GetSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    customers: Arc<dyn CustomerRepository>,
    plans: Arc<dyn PlanRepository>,
}

impl GetSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        customers: Arc<dyn CustomerRepository>,
        plans: Arc<dyn PlanRepository>,
    ) -> Self {
        Self {
            subscriptions,
            customers,
            plans,
        }
    }

    pub async fn handle(&self, query: GetSubscriptionQuery) -> Result<SubscriptionView, BillingError> {
        let id = query.id.trim();
        let found = match id.parse::<SubscriptionId>() {
            Ok(local) => self.subscriptions.find_by_id(&local).await?,
            Err(_) => self.subscriptions.find_by_razorpay_id(id).await?,
        };
        let subscription = found.ok_or_else(|| BillingError::not_found("subscription", id))?;

        let customer = self.customers.find_by_id(&subscription.customer_id).await?;
        let plan = self.plans.find_by_id(&subscription.plan_id).await?;

        Ok(SubscriptionView {
            subscription,
            customer,
            plan,
        })
    }
}
