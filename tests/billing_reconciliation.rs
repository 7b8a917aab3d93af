//! End-to-end reconciliation flows against the in-memory store and the mock
//! processor: creation, signed webhooks, replays, renewals and polling.

use std::collections::BTreeMap;
use std::sync::Arc;

use secrecy::SecretString;
use serde_json::{json, Value};

use billing_reconciler::adapters::memory::{
    InMemoryCustomerRepository, InMemoryPaymentRepository, InMemoryPlanRepository,
    InMemorySubscriptionRepository,
};
use billing_reconciler::adapters::razorpay::MockPaymentProcessor;
use billing_reconciler::application::{
    CheckSubscriptionStatusCommand, CheckSubscriptionStatusHandler, CreateCustomerCommand,
    CreateCustomerHandler, CreateSubscriptionCommand, CreateSubscriptionHandler, EventReconciler,
    HandleWebhookCommand, HandleWebhookHandler, ReconcileOutcome, UpsertResolver,
};
use billing_reconciler::domain::billing::webhook_verifier::sign;
use billing_reconciler::domain::billing::{
    BillingError, BillingPeriod, PaymentStatus, SubscriptionStatus, WebhookVerifier,
};
use billing_reconciler::ports::{
    CustomerEntity, PaymentRepository, SubscriptionEntity, SubscriptionRepository,
};

const WEBHOOK_SECRET: &str = "whsec_integration";

struct Harness {
    processor: MockPaymentProcessor,
    customers: Arc<InMemoryCustomerRepository>,
    subscriptions: Arc<InMemorySubscriptionRepository>,
    payments: Arc<InMemoryPaymentRepository>,
    create_customer: CreateCustomerHandler,
    create_subscription: CreateSubscriptionHandler,
    webhook: HandleWebhookHandler,
    check_status: CheckSubscriptionStatusHandler,
}

fn harness() -> Harness {
    let processor = MockPaymentProcessor::new()
        .with_plan(MockPaymentProcessor::plan("plan_Q", "monthly", 3, 299_900))
        .with_customer(CustomerEntity {
            id: "cust_EXISTING".into(),
            name: Some("B".into()),
            email: Some("b@x.com".into()),
            contact: None,
            created_at: None,
        });
    let customers = Arc::new(InMemoryCustomerRepository::new());
    let plans = Arc::new(InMemoryPlanRepository::new());
    let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
    let payments = Arc::new(InMemoryPaymentRepository::new());

    let processor_port = Arc::new(processor.clone());
    let resolver = Arc::new(UpsertResolver::new(
        processor_port.clone(),
        customers.clone(),
        plans,
    ));
    let reconciler = Arc::new(EventReconciler::new(
        resolver.clone(),
        customers.clone(),
        subscriptions.clone(),
        payments.clone(),
    ));

    Harness {
        create_customer: CreateCustomerHandler::new(processor_port.clone(), customers.clone()),
        create_subscription: CreateSubscriptionHandler::new(
            resolver,
            processor_port.clone(),
            subscriptions.clone(),
            3,
        ),
        webhook: HandleWebhookHandler::new(
            WebhookVerifier::new(SecretString::new(WEBHOOK_SECRET.to_string())),
            reconciler.clone(),
        ),
        check_status: CheckSubscriptionStatusHandler::new(
            processor_port,
            subscriptions.clone(),
            reconciler,
        ),
        processor,
        customers,
        subscriptions,
        payments,
    }
}

fn signed(body: Value) -> HandleWebhookCommand {
    let payload = body.to_string().into_bytes();
    let signature = sign(&payload, WEBHOOK_SECRET.as_bytes());
    HandleWebhookCommand {
        payload,
        signature: Some(signature),
    }
}

fn subscription_event(name: &str, id: &str, status: &str, paid_count: u32, created_at: i64) -> Value {
    json!({
        "entity": "event",
        "event": name,
        "created_at": created_at,
        "payload": {
            "subscription": { "entity": {
                "id": id,
                "plan_id": "plan_Q",
                "customer_id": "cust_EXISTING",
                "status": status,
                "paid_count": paid_count,
                "total_count": 4,
            }}
        }
    })
}

fn payment_captured(id: &str) -> Value {
    json!({
        "entity": "event",
        "event": "payment.captured",
        "created_at": 1_700_000_500,
        "payload": {
            "payment": { "entity": {
                "id": id,
                "amount": 299_900,
                "currency": "INR",
                "status": "captured",
                "order_id": "order_1",
                "method": "card",
            }}
        }
    })
}

async fn subscribe(h: &Harness, customer: &str) -> String {
    let snapshot = h
        .create_subscription
        .handle(CreateSubscriptionCommand {
            razorpay_plan_id: Some("plan_Q".into()),
            razorpay_customer_id: Some(customer.into()),
            total_count: Some(4),
            user_id: None,
        })
        .await
        .unwrap();
    snapshot.subscription.razorpay_subscription_id
}

#[tokio::test]
async fn new_customer_subscribes_and_is_activated_by_webhook() {
    let h = harness();

    let customer = h
        .create_customer
        .handle(CreateCustomerCommand {
            name: "A".into(),
            email: "a@x.com".into(),
            contact: Some("+911234567890".into()),
            user_id: None,
            notes: BTreeMap::new(),
        })
        .await
        .unwrap();
    assert!(customer.created);

    let snapshot = h
        .create_subscription
        .handle(CreateSubscriptionCommand {
            razorpay_plan_id: Some("plan_Q".into()),
            razorpay_customer_id: Some(customer.customer.razorpay_customer_id.clone()),
            total_count: Some(4),
            user_id: None,
        })
        .await
        .unwrap();
    let created = &snapshot.subscription;
    assert_eq!(created.status, SubscriptionStatus::Created);
    assert!(created.pending_activation);
    assert_eq!(created.billing_period, BillingPeriod::Quarterly);
    assert_eq!(
        created.subscription_end_date,
        created.subscription_start_date.checked_add_months(9).unwrap()
    );

    let outcome = h
        .webhook
        .handle(signed(subscription_event(
            "subscription.activated",
            &created.razorpay_subscription_id,
            "active",
            1,
            1_700_000_100,
        )))
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::SubscriptionUpdated { .. }));

    let stored = h
        .subscriptions
        .find_by_razorpay_id(&created.razorpay_subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Active);
    assert!(!stored.pending_activation);
    assert_eq!(stored.paid_count, 1);
    assert_eq!(h.customers.count().await, 1);
}

#[tokio::test]
async fn repeated_activation_is_idempotent() {
    let h = harness();
    let id = subscribe(&h, "cust_EXISTING").await;
    let event = subscription_event("subscription.activated", &id, "active", 1, 1_700_000_100);

    h.webhook.handle(signed(event.clone())).await.unwrap();
    let audit_len = h
        .subscriptions
        .find_by_razorpay_id(&id)
        .await
        .unwrap()
        .unwrap()
        .audit
        .len();
    let outcome = h.webhook.handle(signed(event)).await.unwrap();

    assert!(matches!(outcome, ReconcileOutcome::SubscriptionUnchanged { .. }));
    let stored = h.subscriptions.find_by_razorpay_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.audit.len(), audit_len);
    assert_eq!(h.subscriptions.count().await, 1);
}

#[tokio::test]
async fn renewal_starts_the_day_after_the_active_term_ends() {
    let h = harness();
    let first = subscribe(&h, "cust_EXISTING").await;
    h.webhook
        .handle(signed(subscription_event(
            "subscription.activated",
            &first,
            "active",
            1,
            1_700_000_100,
        )))
        .await
        .unwrap();
    let active = h.subscriptions.find_by_razorpay_id(&first).await.unwrap().unwrap();

    let renewal_id = subscribe(&h, "cust_EXISTING").await;
    let renewal = h
        .subscriptions
        .find_by_razorpay_id(&renewal_id)
        .await
        .unwrap()
        .unwrap();

    assert!(renewal.is_renewal);
    assert!(renewal.is_scheduled);
    assert_eq!(
        renewal.subscription_start_date,
        active
            .subscription_end_date
            .checked_add_days(1)
            .unwrap()
            .start_of_day()
    );
    assert_eq!(
        renewal.subscription_end_date,
        renewal.subscription_start_date.checked_add_months(9).unwrap()
    );
}

#[tokio::test]
async fn activation_arriving_after_completion_still_applies() {
    let h = harness();
    let id = subscribe(&h, "cust_EXISTING").await;

    h.webhook
        .handle(signed(subscription_event(
            "subscription.completed",
            &id,
            "completed",
            4,
            1_700_000_900,
        )))
        .await
        .unwrap();
    h.webhook
        .handle(signed(subscription_event(
            "subscription.activated",
            &id,
            "active",
            1,
            1_700_000_100,
        )))
        .await
        .unwrap();

    let stored = h.subscriptions.find_by_razorpay_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Active);
    assert_eq!(stored.paid_count, 4);
    assert!(stored.audit.iter().any(|entry| entry.regression));
}

#[tokio::test]
async fn tampered_webhook_is_rejected_without_side_effects() {
    let h = harness();
    let id = subscribe(&h, "cust_EXISTING").await;

    let mut cmd = signed(subscription_event(
        "subscription.cancelled",
        &id,
        "cancelled",
        0,
        1_700_000_100,
    ));
    cmd.payload = subscription_event("subscription.cancelled", &id, "cancelled", 3, 1_700_000_100)
        .to_string()
        .into_bytes();

    let err = h.webhook.handle(cmd).await.unwrap_err();

    assert!(matches!(err, BillingError::InvalidSignature));
    let stored = h.subscriptions.find_by_razorpay_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Created);
}

#[tokio::test]
async fn concurrent_captures_record_a_single_payment() {
    let h = harness();
    let event = payment_captured("pay_CONCURRENT");

    let (first, second) = tokio::join!(
        h.webhook.handle(signed(event.clone())),
        h.webhook.handle(signed(event)),
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(h.payments.count().await, 1);
    let payment = h
        .payments
        .find_by_razorpay_id("pay_CONCURRENT")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Captured);
    assert_eq!(payment.amount, 299_900);
}

#[tokio::test]
async fn polling_materializes_a_subscription_missing_locally() {
    let h = harness();
    h.processor.put_subscription(SubscriptionEntity {
        id: "sub_REMOTE".into(),
        plan_id: Some("plan_Q".into()),
        customer_id: Some("cust_EXISTING".into()),
        status: Some("active".into()),
        total_count: Some(4),
        paid_count: Some(2),
        ..Default::default()
    });

    let result = h
        .check_status
        .handle(CheckSubscriptionStatusCommand {
            razorpay_subscription_id: "sub_REMOTE".into(),
        })
        .await
        .unwrap();

    assert_eq!(result.processor_status, SubscriptionStatus::Active);
    assert_eq!(result.subscription.status, SubscriptionStatus::Active);
    assert_eq!(result.subscription.paid_count, 2);
    assert_eq!(h.subscriptions.count().await, 1);
    assert_eq!(h.customers.count().await, 1);
}

#[tokio::test]
async fn polling_an_unknown_subscription_is_not_found() {
    let h = harness();

    let err = h
        .check_status
        .handle(CheckSubscriptionStatusCommand {
            razorpay_subscription_id: "sub_NOWHERE".into(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::NotFound { .. }));
}
