//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    add_addon, capture_payment, check_subscription, create_customer, create_order,
    create_subscription, get_subscription, handle_webhook, BillingAppState,
};

/// Create the billing API router.
///
/// # Routes
///
/// - `POST /customers` - Register a customer
/// - `POST /create-subscription` - Create a first or renewal subscription
/// - `POST /check-subscription/:id` - Poll the processor and reconcile
/// - `GET /subscriptions/:id` - Read the local snapshot
/// - `POST /subscriptions/:id/addons` - Attach an addon
/// - `POST /create-order` - Create a one-off order
/// - `POST /capture-payment` - Capture an authorized payment
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/customers", post(create_customer))
        .route("/create-subscription", post(create_subscription))
        .route("/check-subscription/:id", post(check_subscription))
        .route("/subscriptions/:id", get(get_subscription))
        .route("/subscriptions/:id/addons", post(add_addon))
        .route("/create-order", post(create_order))
        .route("/capture-payment", post(capture_payment))
}

/// Create the webhook router.
///
/// Kept apart from the API routes: callers are authenticated by signature,
/// not by session.
///
/// # Routes
/// - `POST /webhook` - Razorpay event delivery
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/webhook", post(handle_webhook))
}

/// Create the complete billing router, mounted at `/api`.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/api", billing_routes())
        .merge(webhook_routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::super::handlers::BillingDependencies;
    use crate::adapters::memory::{
        InMemoryCustomerRepository, InMemoryPaymentRepository, InMemoryPlanRepository,
        InMemorySubscriptionRepository,
    };
    use crate::adapters::razorpay::MockPaymentProcessor;
    use crate::domain::billing::WebhookVerifier;
    use crate::ports::CustomerEntity;

    fn app() -> Router {
        let processor = MockPaymentProcessor::new()
            .with_plan(MockPaymentProcessor::plan("plan_Q", "monthly", 3, 299_900))
            .with_customer(CustomerEntity {
                id: "cust_A".into(),
                name: Some("A".into()),
                email: Some("a@x.com".into()),
                contact: Some("+911234567890".into()),
                created_at: None,
            });
        let state = BillingAppState::new(BillingDependencies {
            processor: Arc::new(processor),
            customers: Arc::new(InMemoryCustomerRepository::new()),
            plans: Arc::new(InMemoryPlanRepository::new()),
            subscriptions: Arc::new(InMemorySubscriptionRepository::new()),
            payments: Arc::new(InMemoryPaymentRepository::new()),
            verifier: WebhookVerifier::new(SecretString::new("whsec".to_string())),
            reject_stale_events: false,
            authentication_window_days: 3,
        });
        billing_router().with_state(state)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_subscription_returns_created_snapshot() {
        let response = app()
            .oneshot(post_json(
                "/api/create-subscription",
                json!({ "planId": "plan_Q", "customerId": "cust_A", "totalCount": 4 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["subscription"]["billingPeriod"], "quarterly");
        assert_eq!(body["subscription"]["pendingActivation"], true);
        assert_eq!(body["customer"]["email"], "a@x.com");
    }

    #[tokio::test]
    async fn missing_plan_is_a_bad_request() {
        let response = app()
            .oneshot(post_json(
                "/api/create-subscription",
                json!({ "customerId": "cust_A" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["errorCode"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn unknown_subscription_maps_to_not_found() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/subscriptions/sub_missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn webhook_is_acknowledged_even_with_bad_signature() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("x-razorpay-signature", "deadbeef")
                    .body(Body::from(r#"{"event":"subscription.activated"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));
    }
}
