//! CreateSubscriptionHandler - creates a first subscription or schedules a renewal.
//!
//! Dates are computed locally (see [`plan_cycle`]) and never inferred from
//! the processor's response. A processor rejection aborts before any local
//! write.

use std::sync::Arc;

use serde_json::json;

use crate::domain::billing::{
    plan_cycle, Actor, BillingError, Customer, NewSubscription, Plan, Subscription,
    SubscriptionStatus,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{CreateSubscriptionRequest, PaymentProcessor, SubscriptionRepository};

use super::resolver::{CustomerContext, UpsertResolver};
use super::{write_conflict, MAX_WRITE_ATTEMPTS};

#[derive(Debug, Clone, Default)]
pub struct CreateSubscriptionCommand {
    pub razorpay_plan_id: Option<String>,
    pub razorpay_customer_id: Option<String>,
    pub total_count: Option<u32>,
    pub user_id: Option<UserId>,
}

/// Processor-confirmed subscription joined with its local projections.
#[derive(Debug, Clone)]
pub struct SubscriptionSnapshot {
    pub subscription: Subscription,
    pub customer: Customer,
    pub plan: Plan,
    /// Status as the processor reported it on creation.
    pub processor_status: String,
    pub expire_by: Timestamp,
}

pub struct CreateSubscriptionHandler {
    resolver: Arc<UpsertResolver>,
    processor: Arc<dyn PaymentProcessor>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    authentication_window_days: i64,
}

impl CreateSubscriptionHandler {
    pub fn new(
        resolver: Arc<UpsertResolver>,
        processor: Arc<dyn PaymentProcessor>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        authentication_window_days: i64,
    ) -> Self {
        Self {
            resolver,
            processor,
            subscriptions,
            authentication_window_days,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateSubscriptionCommand,
    ) -> Result<SubscriptionSnapshot, BillingError> {
        let plan_id =
            non_empty(cmd.razorpay_plan_id).ok_or_else(|| BillingError::missing("plan_id"))?;
        let customer_id =
            non_empty(cmd.razorpay_customer_id).ok_or_else(|| BillingError::missing("customer_id"))?;

        let customer = self
            .resolver
            .resolve_customer(&customer_id, CustomerContext { user_id: cmd.user_id })
            .await?;
        let plan = self.resolver.resolve_plan(&plan_id).await?;

        let now = Timestamp::now();
        let current = self
            .subscriptions
            .find_active_for(&customer.id, &plan.id)
            .await?;
        let schedule = plan_cycle(
            &plan,
            cmd.total_count,
            current.as_ref(),
            now,
            self.authentication_window_days,
        )?;

        if schedule.is_renewal {
            tracing::info!(
                customer_id = %customer.id,
                plan = %plan.razorpay_plan_id,
                start = %schedule.start_date,
                "Active subscription found, scheduling renewal"
            );
        }

        let notes = json!({
            "local_customer_id": customer.id.to_string(),
            "is_renewal": schedule.is_renewal,
        });
        let request = CreateSubscriptionRequest {
            plan_id: plan.razorpay_plan_id.clone(),
            customer_id: customer.razorpay_customer_id.clone(),
            total_count: schedule.total_count,
            quantity: 1,
            customer_notify: 1,
            start_at: schedule.start_at.map(|t| t.as_unix_secs()),
            expire_by: schedule.expire_by.as_unix_secs(),
            notes: notes.as_object().cloned().unwrap_or_default(),
        };

        let entity = self
            .processor
            .create_subscription(request)
            .await
            .map_err(|err| {
                tracing::warn!(
                    plan = %plan.razorpay_plan_id,
                    code = %err.code,
                    description = %err.description,
                    "Processor rejected subscription creation"
                );
                BillingError::from_creation(&plan.razorpay_plan_id, err)
            })?;

        let processor_status = entity
            .status
            .clone()
            .unwrap_or_else(|| SubscriptionStatus::Created.to_string());
        let status = entity.stated_status(None).unwrap_or(SubscriptionStatus::Created);

        let subscription = Subscription::create(
            NewSubscription {
                razorpay_subscription_id: entity.id.clone(),
                customer_id: customer.id,
                plan_id: plan.id,
                status,
                start_date: schedule.start_date,
                end_date: schedule.end_date,
                start_at: schedule.start_at,
                charge_at: entity.counters().charge_at,
                total_count: schedule.total_count,
                paid_count: 0,
                billing_period: plan.billing_period,
                is_renewal: schedule.is_renewal,
                short_url: entity.short_url.clone(),
            },
            Actor::Api,
        )?;

        let subscription = match self.subscriptions.insert(&subscription).await {
            Ok(()) => subscription,
            Err(err) if err.is_duplicate() => self.adopt_existing(subscription).await?,
            Err(err) => return Err(err.into()),
        };

        tracing::info!(
            subscription_id = %subscription.id,
            razorpay_subscription_id = %subscription.razorpay_subscription_id,
            is_renewal = subscription.is_renewal,
            "Subscription created"
        );

        Ok(SubscriptionSnapshot {
            subscription,
            customer,
            plan,
            processor_status,
            expire_by: schedule.expire_by,
        })
    }

    /// A webhook self-healed the record before this request saved it. Keep
    /// the status it applied, take the locally computed schedule.
    async fn adopt_existing(&self, created: Subscription) -> Result<Subscription, BillingError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut existing = self
                .subscriptions
                .find_by_razorpay_id(&created.razorpay_subscription_id)
                .await?
                .ok_or_else(|| {
                    BillingError::not_found(
                        "subscription",
                        created.razorpay_subscription_id.clone(),
                    )
                })?;

            tracing::debug!(
                razorpay_subscription_id = %existing.razorpay_subscription_id,
                "Subscription already materialized by webhook, merging schedule"
            );
            existing.subscription_start_date = created.subscription_start_date;
            existing.subscription_end_date = created.subscription_end_date;
            existing.start_at = created.start_at;
            existing.is_scheduled = created.is_scheduled;
            existing.is_renewal = created.is_renewal;
            existing.short_url = created.short_url.clone().or(existing.short_url.take());
            match self.subscriptions.update(&existing).await {
                Ok(()) => {
                    existing.version += 1;
                    return Ok(existing);
                }
                Err(err) if err.is_conflict() => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(write_conflict(&created.razorpay_subscription_id))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryCustomerRepository, InMemoryPlanRepository, InMemorySubscriptionRepository,
    };
    use crate::adapters::memory::InMemoryPaymentRepository;
    use crate::adapters::razorpay::MockPaymentProcessor;
    use crate::application::handlers::billing::EventReconciler;
    use crate::domain::billing::{BillingPeriod, ProcessorError, ProcessorErrorKind};
    use crate::ports::{
        AddonEntity, CreateAddonRequest, CreateCustomerRequest, CreateOrderRequest,
        CustomerEntity, OrderEntity, PaymentEntity, PlanEntity, SubscriptionEntity,
    };

    struct Fixture {
        processor: MockPaymentProcessor,
        resolver: Arc<UpsertResolver>,
        customers: Arc<InMemoryCustomerRepository>,
        subscriptions: Arc<InMemorySubscriptionRepository>,
        handler: CreateSubscriptionHandler,
    }

    fn fixture() -> Fixture {
        let processor = MockPaymentProcessor::new()
            .with_plan(MockPaymentProcessor::plan("plan_Q", "monthly", 3, 299_900))
            .with_plan(MockPaymentProcessor::plan("plan_Y", "yearly", 1, 999_900))
            .with_customer(CustomerEntity {
                id: "cust_A".into(),
                name: Some("A".into()),
                email: Some("a@x.com".into()),
                contact: None,
                created_at: None,
            });
        let customers = Arc::new(InMemoryCustomerRepository::new());
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let resolver = Arc::new(UpsertResolver::new(
            Arc::new(processor.clone()),
            customers.clone(),
            Arc::new(InMemoryPlanRepository::new()),
        ));
        let handler = CreateSubscriptionHandler::new(
            resolver.clone(),
            Arc::new(processor.clone()),
            subscriptions.clone(),
            7,
        );
        Fixture {
            processor,
            resolver,
            customers,
            subscriptions,
            handler,
        }
    }

    fn command(plan: &str, total_count: Option<u32>) -> CreateSubscriptionCommand {
        CreateSubscriptionCommand {
            razorpay_plan_id: Some(plan.into()),
            razorpay_customer_id: Some("cust_A".into()),
            total_count,
            user_id: None,
        }
    }

    #[tokio::test]
    async fn first_subscription_starts_now_and_awaits_activation() {
        let f = fixture();
        let before = Timestamp::now();

        let snapshot = f.handler.handle(command("plan_Q", Some(4))).await.unwrap();
        let sub = &snapshot.subscription;

        assert!(!sub.is_renewal);
        assert!(sub.pending_activation);
        assert_eq!(sub.status, SubscriptionStatus::Created);
        assert_eq!(sub.total_count, 4);
        assert_eq!(sub.billing_period, BillingPeriod::Quarterly);
        assert!(sub.subscription_start_date.duration_since(&before).num_seconds() < 5);
        assert_eq!(
            sub.subscription_end_date,
            sub.subscription_start_date.checked_add_months(9).unwrap()
        );
        assert!(sub.short_url.is_some());

        let request = f.processor.last_subscription_request().unwrap();
        assert_eq!(request.start_at, None);
        assert_eq!(request.total_count, 4);
    }

    #[tokio::test]
    async fn missing_plan_id_fails_before_any_call() {
        let f = fixture();
        let err = f
            .handler
            .handle(CreateSubscriptionCommand {
                razorpay_customer_id: Some("cust_A".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
        assert_eq!(f.processor.calls("fetch_customer"), 0);
    }

    #[tokio::test]
    async fn processor_rejection_writes_nothing() {
        let f = fixture();
        f.processor.fail(
            "create_subscription",
            ProcessorError::new(
                ProcessorErrorKind::BadRequest,
                "BAD_REQUEST_ERROR",
                "customer_notify is invalid",
            ),
        );

        let err = f.handler.handle(command("plan_Y", None)).await.unwrap_err();

        assert!(matches!(err, BillingError::SubscriptionCreation(_)));
        assert_eq!(f.subscriptions.count().await, 0);
    }

    #[tokio::test]
    async fn second_request_on_active_pair_is_a_renewal() {
        let f = fixture();
        let first = f.handler.handle(command("plan_Y", None)).await.unwrap();
        let mut active = first.subscription.clone();
        active.apply_status(SubscriptionStatus::Active, Actor::Webhook, None);
        f.subscriptions.update(&active).await.unwrap();

        let renewal = f.handler.handle(command("plan_Y", None)).await.unwrap();
        let sub = &renewal.subscription;

        assert!(sub.is_renewal);
        assert!(sub.is_scheduled);
        assert_eq!(
            sub.subscription_start_date,
            active
                .subscription_end_date
                .checked_add_days(1)
                .unwrap()
                .start_of_day()
        );
        let request = f.processor.last_subscription_request().unwrap();
        assert_eq!(
            request.start_at,
            Some(sub.subscription_start_date.as_unix_secs())
        );
        assert_eq!(f.subscriptions.count().await, 2);
    }

    /// Delivers `subscription.authenticated` for every subscription it
    /// creates before the creating request gets to save it.
    struct WebhookFirst {
        inner: MockPaymentProcessor,
        reconciler: EventReconciler,
    }

    #[async_trait::async_trait]
    impl PaymentProcessor for WebhookFirst {
        async fn create_customer(
            &self,
            request: CreateCustomerRequest,
        ) -> Result<CustomerEntity, ProcessorError> {
            self.inner.create_customer(request).await
        }

        async fn fetch_customer(
            &self,
            customer_id: &str,
        ) -> Result<Option<CustomerEntity>, ProcessorError> {
            self.inner.fetch_customer(customer_id).await
        }

        async fn fetch_plan(&self, plan_id: &str) -> Result<Option<PlanEntity>, ProcessorError> {
            self.inner.fetch_plan(plan_id).await
        }

        async fn create_subscription(
            &self,
            request: CreateSubscriptionRequest,
        ) -> Result<SubscriptionEntity, ProcessorError> {
            let created = self.inner.create_subscription(request).await?;
            let authenticated = SubscriptionEntity {
                status: Some("authenticated".into()),
                ..created.clone()
            };
            self.reconciler
                .apply_subscription(
                    &authenticated,
                    Some("subscription.authenticated"),
                    Actor::Webhook,
                    None,
                )
                .await
                .unwrap();
            Ok(created)
        }

        async fn fetch_subscription(
            &self,
            subscription_id: &str,
        ) -> Result<Option<SubscriptionEntity>, ProcessorError> {
            self.inner.fetch_subscription(subscription_id).await
        }

        async fn create_addon(
            &self,
            subscription_id: &str,
            request: CreateAddonRequest,
        ) -> Result<AddonEntity, ProcessorError> {
            self.inner.create_addon(subscription_id, request).await
        }

        async fn create_order(
            &self,
            request: CreateOrderRequest,
        ) -> Result<OrderEntity, ProcessorError> {
            self.inner.create_order(request).await
        }

        async fn capture_payment(
            &self,
            payment_id: &str,
            amount: i64,
            currency: &str,
        ) -> Result<PaymentEntity, ProcessorError> {
            self.inner.capture_payment(payment_id, amount, currency).await
        }
    }

    #[tokio::test]
    async fn webhook_materialized_renewal_is_adopted_with_local_schedule() {
        let f = fixture();
        let first = f.handler.handle(command("plan_Q", Some(4))).await.unwrap();
        let mut active = first.subscription.clone();
        active.apply_status(SubscriptionStatus::Active, Actor::Webhook, None);
        f.subscriptions.update(&active).await.unwrap();

        let racing = CreateSubscriptionHandler::new(
            f.resolver.clone(),
            Arc::new(WebhookFirst {
                inner: f.processor.clone(),
                reconciler: EventReconciler::new(
                    f.resolver.clone(),
                    f.customers.clone(),
                    f.subscriptions.clone(),
                    Arc::new(InMemoryPaymentRepository::new()),
                ),
            }),
            f.subscriptions.clone(),
            7,
        );

        let renewal = racing.handle(command("plan_Q", Some(4))).await.unwrap();
        let sub = &renewal.subscription;

        assert_eq!(f.subscriptions.count().await, 2);
        let stored = f
            .subscriptions
            .find_by_razorpay_id(&sub.razorpay_subscription_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Authenticated);
        assert!(stored.is_renewal);
        assert!(stored.is_scheduled);
        let expected_start = active
            .subscription_end_date
            .checked_add_days(1)
            .unwrap()
            .start_of_day();
        assert_eq!(stored.subscription_start_date, expected_start);
        assert_eq!(
            stored.subscription_end_date,
            expected_start.checked_add_months(9).unwrap()
        );
        assert_eq!(stored.version, sub.version);
        assert_eq!(sub.status, SubscriptionStatus::Authenticated);
    }
}
