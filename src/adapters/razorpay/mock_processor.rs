//! Scriptable in-process payment processor.
//!
//! Behaves like the Razorpay API closely enough for the reconciliation paths:
//! - entities created through it can be fetched back
//! - `fail_existing = "0"` returns the existing customer for a repeated email
//! - unknown plan ids are rejected on subscription creation
//! - per-method errors can be injected, and calls are counted

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::billing::{ProcessorError, ProcessorErrorKind};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    AddonEntity, CreateAddonRequest, CreateCustomerRequest, CreateOrderRequest,
    CreateSubscriptionRequest, CustomerEntity, LineItem, OrderEntity, PaymentEntity,
    PaymentProcessor, PlanEntity, SubscriptionEntity,
};

#[derive(Default, Clone)]
pub struct MockPaymentProcessor {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    customers: HashMap<String, CustomerEntity>,
    plans: HashMap<String, PlanEntity>,
    subscriptions: HashMap<String, SubscriptionEntity>,
    payments: HashMap<String, PaymentEntity>,
    method_errors: HashMap<&'static str, ProcessorError>,
    calls: HashMap<&'static str, usize>,
    subscription_requests: Vec<CreateSubscriptionRequest>,
    sequence: u64,
}

impl MockState {
    fn record(&mut self, method: &'static str) -> Result<(), ProcessorError> {
        *self.calls.entry(method).or_default() += 1;
        match self.method_errors.get(method) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{}_{:014}", prefix, self.sequence)
    }
}

impl MockPaymentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Catalog plan with a single line item.
    pub fn plan(id: &str, period: &str, interval: u32, amount: i64) -> PlanEntity {
        PlanEntity {
            id: id.to_string(),
            period: period.to_string(),
            interval,
            item: LineItem {
                name: format!("{} plan", id),
                amount,
                currency: "INR".to_string(),
                description: None,
            },
        }
    }

    pub fn with_plan(self, plan: PlanEntity) -> Self {
        self.state().plans.insert(plan.id.clone(), plan);
        self
    }

    pub fn with_customer(self, customer: CustomerEntity) -> Self {
        self.state().customers.insert(customer.id.clone(), customer);
        self
    }

    /// Replaces (or seeds) the processor-side subscription.
    pub fn put_subscription(&self, subscription: SubscriptionEntity) {
        self.state()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    pub fn subscription(&self, id: &str) -> Option<SubscriptionEntity> {
        self.state().subscriptions.get(id).cloned()
    }

    /// Every subsequent call to `method` fails with `error`.
    pub fn fail(&self, method: &'static str, error: ProcessorError) {
        self.state().method_errors.insert(method, error);
    }

    pub fn clear_failures(&self) {
        self.state().method_errors.clear();
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state().calls.get(method).copied().unwrap_or(0)
    }

    pub fn last_subscription_request(&self) -> Option<CreateSubscriptionRequest> {
        self.state().subscription_requests.last().cloned()
    }
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<CustomerEntity, ProcessorError> {
        let mut state = self.state();
        state.record("create_customer")?;

        let existing = state
            .customers
            .values()
            .find(|c| c.email.as_deref() == Some(request.email.as_str()))
            .cloned();
        if let Some(existing) = existing {
            if request.fail_existing == "0" {
                return Ok(existing);
            }
            return Err(ProcessorError::new(
                ProcessorErrorKind::BadRequest,
                "BAD_REQUEST_ERROR",
                "Customer already exists for the merchant",
            ));
        }

        let customer = CustomerEntity {
            id: state.next_id("cust"),
            name: Some(request.name),
            email: Some(request.email),
            contact: request.contact,
            created_at: Some(Timestamp::now().as_unix_secs()),
        };
        state.customers.insert(customer.id.clone(), customer.clone());
        Ok(customer)
    }

    async fn fetch_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<CustomerEntity>, ProcessorError> {
        let mut state = self.state();
        state.record("fetch_customer")?;
        Ok(state.customers.get(customer_id).cloned())
    }

    async fn fetch_plan(&self, plan_id: &str) -> Result<Option<PlanEntity>, ProcessorError> {
        let mut state = self.state();
        state.record("fetch_plan")?;
        Ok(state.plans.get(plan_id).cloned())
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionEntity, ProcessorError> {
        let mut state = self.state();
        state.record("create_subscription")?;
        if !state.plans.contains_key(&request.plan_id) {
            return Err(ProcessorError::new(
                ProcessorErrorKind::BadRequest,
                "BAD_REQUEST_ERROR",
                "The id provided does not exist",
            )
            .with_field("plan_id"));
        }

        let id = state.next_id("sub");
        let subscription = SubscriptionEntity {
            short_url: Some(format!("https://rzp.io/i/{}", id)),
            id,
            plan_id: Some(request.plan_id.clone()),
            customer_id: Some(request.customer_id.clone()),
            status: Some("created".to_string()),
            total_count: Some(request.total_count),
            paid_count: Some(0),
            start_at: request.start_at,
            expire_by: Some(request.expire_by),
            created_at: Some(Timestamp::now().as_unix_secs()),
            ..Default::default()
        };
        state
            .subscriptions
            .insert(subscription.id.clone(), subscription.clone());
        state.subscription_requests.push(request);
        Ok(subscription)
    }

    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionEntity>, ProcessorError> {
        let mut state = self.state();
        state.record("fetch_subscription")?;
        Ok(state.subscriptions.get(subscription_id).cloned())
    }

    async fn create_addon(
        &self,
        subscription_id: &str,
        request: CreateAddonRequest,
    ) -> Result<AddonEntity, ProcessorError> {
        let mut state = self.state();
        state.record("create_addon")?;
        if !state.subscriptions.contains_key(subscription_id) {
            return Err(ProcessorError::not_found("The id provided does not exist"));
        }
        Ok(AddonEntity {
            id: state.next_id("ao"),
            item: request.item,
            quantity: request.quantity,
            subscription_id: Some(subscription_id.to_string()),
        })
    }

    async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderEntity, ProcessorError> {
        let mut state = self.state();
        state.record("create_order")?;
        Ok(OrderEntity {
            id: state.next_id("order"),
            amount: request.amount,
            amount_paid: Some(0),
            currency: request.currency,
            receipt: request.receipt,
            status: "created".to_string(),
            created_at: Some(Timestamp::now().as_unix_secs()),
        })
    }

    async fn capture_payment(
        &self,
        payment_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<PaymentEntity, ProcessorError> {
        let mut state = self.state();
        state.record("capture_payment")?;
        let payment = PaymentEntity {
            id: payment_id.to_string(),
            amount,
            currency: Some(currency.to_string()),
            status: "captured".to_string(),
            order_id: None,
            invoice_id: None,
            customer_id: None,
            method: Some("card".to_string()),
            extra: serde_json::Map::new(),
        };
        state.payments.insert(payment.id.clone(), payment.clone());
        Ok(payment)
    }
}
