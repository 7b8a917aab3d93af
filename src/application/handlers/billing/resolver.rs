//! UpsertResolver - bridges processor-issued ids to local records.
//!
//! Every entry point that receives a processor id goes through here: look the
//! record up locally, and on a miss fetch it from the processor and persist
//! it. The store's uniqueness constraint settles concurrent misses; the
//! losing insert re-reads the winner's record.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Customer, Plan};
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{CustomerRepository, PaymentProcessor, PlanRepository};

/// Local context used when a customer has to be materialized.
#[derive(Debug, Clone, Default)]
pub struct CustomerContext {
    pub user_id: Option<UserId>,
}

pub struct UpsertResolver {
    processor: Arc<dyn PaymentProcessor>,
    customers: Arc<dyn CustomerRepository>,
    plans: Arc<dyn PlanRepository>,
}

impl UpsertResolver {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        customers: Arc<dyn CustomerRepository>,
        plans: Arc<dyn PlanRepository>,
    ) -> Self {
        Self {
            processor,
            customers,
            plans,
        }
    }

    pub async fn resolve_customer(
        &self,
        razorpay_customer_id: &str,
        context: CustomerContext,
    ) -> Result<Customer, BillingError> {
        if razorpay_customer_id.trim().is_empty() {
            return Err(BillingError::missing("customer_id"));
        }
        if let Some(customer) = self.customers.find_by_razorpay_id(razorpay_customer_id).await? {
            return Ok(customer);
        }

        let entity = self
            .processor
            .fetch_customer(razorpay_customer_id)
            .await
            .map_err(|e| BillingError::from_lookup("customer", razorpay_customer_id, e))?
            .ok_or_else(|| BillingError::not_found("customer", razorpay_customer_id))?;

        let customer = Customer::create(
            entity.id,
            entity.name.unwrap_or_default(),
            entity.email,
            entity.contact,
            context.user_id,
        )?;

        match self.customers.insert(&customer).await {
            Ok(()) => {
                tracing::info!(
                    razorpay_customer_id = %customer.razorpay_customer_id,
                    customer_id = %customer.id,
                    "Materialized customer from processor"
                );
                Ok(customer)
            }
            Err(err) if err.is_duplicate() => {
                self.reread_customer(razorpay_customer_id, err).await
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn resolve_plan(&self, razorpay_plan_id: &str) -> Result<Plan, BillingError> {
        if razorpay_plan_id.trim().is_empty() {
            return Err(BillingError::missing("plan_id"));
        }
        if let Some(plan) = self.plans.find_by_razorpay_id(razorpay_plan_id).await? {
            return Ok(plan);
        }

        let entity = self
            .processor
            .fetch_plan(razorpay_plan_id)
            .await
            .map_err(|e| BillingError::from_lookup("plan", razorpay_plan_id, e))?
            .ok_or_else(|| BillingError::not_found("plan", razorpay_plan_id))?;

        let plan = Plan::create(entity.to_new_plan()?)?;

        match self.plans.insert(&plan).await {
            Ok(()) => {
                tracing::info!(
                    razorpay_plan_id = %plan.razorpay_plan_id,
                    billing_period = %plan.billing_period,
                    "Materialized plan from processor"
                );
                Ok(plan)
            }
            Err(err) if err.is_duplicate() => {
                tracing::debug!(razorpay_plan_id, "Lost plan insert race, re-reading");
                self.plans
                    .find_by_razorpay_id(razorpay_plan_id)
                    .await?
                    .ok_or_else(|| BillingError::Persistence(err))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn reread_customer(
        &self,
        razorpay_customer_id: &str,
        err: DomainError,
    ) -> Result<Customer, BillingError> {
        tracing::debug!(razorpay_customer_id, "Lost customer insert race, re-reading");
        self.customers
            .find_by_razorpay_id(razorpay_customer_id)
            .await?
            .ok_or(BillingError::Persistence(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryCustomerRepository, InMemoryPlanRepository};
    use crate::adapters::razorpay::MockPaymentProcessor;
    use crate::domain::billing::{BillingPeriod, ProcessorError};
    use crate::ports::CustomerEntity;

    struct Fixture {
        processor: MockPaymentProcessor,
        customers: Arc<InMemoryCustomerRepository>,
        plans: Arc<InMemoryPlanRepository>,
        resolver: UpsertResolver,
    }

    fn fixture() -> Fixture {
        let processor = MockPaymentProcessor::new()
            .with_plan(MockPaymentProcessor::plan("plan_Q", "monthly", 3, 299_900))
            .with_customer(CustomerEntity {
                id: "cust_A".into(),
                name: Some("A".into()),
                email: Some("a@x.com".into()),
                contact: Some("+911234567890".into()),
                created_at: None,
            });
        let customers = Arc::new(InMemoryCustomerRepository::new());
        let plans = Arc::new(InMemoryPlanRepository::new());
        let resolver =
            UpsertResolver::new(Arc::new(processor.clone()), customers.clone(), plans.clone());
        Fixture {
            processor,
            customers,
            plans,
            resolver,
        }
    }

    #[tokio::test]
    async fn plan_miss_is_fetched_classified_and_stored_once() {
        let f = fixture();

        let plan = f.resolver.resolve_plan("plan_Q").await.unwrap();
        let again = f.resolver.resolve_plan("plan_Q").await.unwrap();

        assert_eq!(plan.billing_period, BillingPeriod::Quarterly);
        assert_eq!(plan.amount, 299_900);
        assert_eq!(plan.id, again.id);
        assert_eq!(f.plans.count().await, 1);
        assert_eq!(f.processor.calls("fetch_plan"), 1);
    }

    #[tokio::test]
    async fn unknown_plan_is_not_found() {
        let f = fixture();
        let err = f.resolver.resolve_plan("plan_nope").await.unwrap_err();
        assert!(matches!(err, BillingError::NotFound { entity: "plan", .. }));
        assert_eq!(f.plans.count().await, 0);
    }

    #[tokio::test]
    async fn customer_miss_carries_user_context() {
        let f = fixture();
        let context = CustomerContext {
            user_id: Some(UserId::new("user-1").unwrap()),
        };

        let customer = f.resolver.resolve_customer("cust_A", context).await.unwrap();

        assert_eq!(customer.email.as_deref(), Some("a@x.com"));
        assert_eq!(customer.user_id.unwrap().as_str(), "user-1");
        assert_eq!(f.customers.count().await, 1);
    }

    #[tokio::test]
    async fn processor_outage_is_not_reported_as_not_found() {
        let f = fixture();
        f.processor
            .fail("fetch_customer", ProcessorError::network("timed out"));
        let err = f
            .resolver
            .resolve_customer("cust_A", CustomerContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Processor(_)));
    }

    #[tokio::test]
    async fn empty_id_fails_validation_without_calls() {
        let f = fixture();
        let err = f.resolver.resolve_plan("  ").await.unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
        assert_eq!(f.processor.calls("fetch_plan"), 0);
    }

    #[tokio::test]
    async fn concurrent_misses_yield_one_plan() {
        let f = fixture();
        let (a, b) = tokio::join!(
            f.resolver.resolve_plan("plan_Q"),
            f.resolver.resolve_plan("plan_Q")
        );
        assert_eq!(a.unwrap().id, b.unwrap().id);
        assert_eq!(f.plans.count().await, 1);
    }
}
