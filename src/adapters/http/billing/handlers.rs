//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde_json::json;

use crate::application::{
    AddAddonCommand, AddAddonHandler, CapturePaymentCommand, CapturePaymentHandler,
    CheckSubscriptionStatusCommand, CheckSubscriptionStatusHandler, CreateCustomerCommand,
    CreateCustomerHandler, CreateOrderCommand, CreateOrderHandler, CreateSubscriptionCommand,
    CreateSubscriptionHandler, EventReconciler, GetSubscriptionHandler, GetSubscriptionQuery,
    HandleWebhookCommand, HandleWebhookHandler, UpsertResolver,
};
use crate::domain::billing::{BillingError, WebhookVerifier};
use crate::domain::foundation::UserId;
use crate::ports::{
    CustomerRepository, PaymentProcessor, PaymentRepository, PlanRepository,
    SubscriptionRepository,
};

use super::dto::{
    AddAddonRequest, CapturePaymentRequest, CheckSubscriptionResponse, CreateCustomerRequest,
    CreateCustomerResponse, CreateOrderRequest, CreateSubscriptionRequest,
    CreateSubscriptionResponse, ErrorResponse, OrderResponse, PaymentResponse,
    SubscriptionResponse, SubscriptionViewResponse, WebhookAck,
};

/// Signature header set by Razorpay on webhook deliveries.
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";
/// Generic spelling accepted for proxies and replays.
pub const FALLBACK_SIGNATURE_HEADER: &str = "x-signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Collaborators the billing handlers are built from.
#[derive(Clone)]
pub struct BillingDependencies {
    pub processor: Arc<dyn PaymentProcessor>,
    pub customers: Arc<dyn CustomerRepository>,
    pub plans: Arc<dyn PlanRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub verifier: WebhookVerifier,
    pub reject_stale_events: bool,
    pub authentication_window_days: i64,
}

/// Shared state: every handler is built once and shared across requests.
#[derive(Clone)]
pub struct BillingAppState {
    pub create_customer: Arc<CreateCustomerHandler>,
    pub create_subscription: Arc<CreateSubscriptionHandler>,
    pub webhook: Arc<HandleWebhookHandler>,
    pub check_subscription: Arc<CheckSubscriptionStatusHandler>,
    pub get_subscription: Arc<GetSubscriptionHandler>,
    pub add_addon: Arc<AddAddonHandler>,
    pub create_order: Arc<CreateOrderHandler>,
    pub capture_payment: Arc<CapturePaymentHandler>,
}

impl BillingAppState {
    pub fn new(deps: BillingDependencies) -> Self {
        let resolver = Arc::new(UpsertResolver::new(
            deps.processor.clone(),
            deps.customers.clone(),
            deps.plans.clone(),
        ));
        let reconciler = Arc::new(
            EventReconciler::new(
                resolver.clone(),
                deps.customers.clone(),
                deps.subscriptions.clone(),
                deps.payments.clone(),
            )
            .with_stale_event_rejection(deps.reject_stale_events),
        );

        Self {
            create_customer: Arc::new(CreateCustomerHandler::new(
                deps.processor.clone(),
                deps.customers.clone(),
            )),
            create_subscription: Arc::new(CreateSubscriptionHandler::new(
                resolver,
                deps.processor.clone(),
                deps.subscriptions.clone(),
                deps.authentication_window_days,
            )),
            webhook: Arc::new(HandleWebhookHandler::new(deps.verifier, reconciler.clone())),
            check_subscription: Arc::new(CheckSubscriptionStatusHandler::new(
                deps.processor.clone(),
                deps.subscriptions.clone(),
                reconciler,
            )),
            get_subscription: Arc::new(GetSubscriptionHandler::new(
                deps.subscriptions.clone(),
                deps.customers.clone(),
                deps.plans,
            )),
            add_addon: Arc::new(AddAddonHandler::new(
                deps.processor.clone(),
                deps.subscriptions,
            )),
            create_order: Arc::new(CreateOrderHandler::new(deps.processor.clone())),
            capture_payment: Arc::new(CapturePaymentHandler::new(
                deps.processor,
                deps.customers,
                deps.payments,
            )),
        }
    }
}

fn parse_user_id(raw: Option<String>) -> Result<Option<UserId>, BillingError> {
    raw.filter(|s| !s.trim().is_empty())
        .map(UserId::new)
        .transpose()
        .map_err(BillingError::from)
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /customers - Register a customer, idempotent by email
pub async fn create_customer(
    State(state): State<BillingAppState>,
    Json(request): Json<CreateCustomerRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CreateCustomerCommand {
        name: request.name,
        email: request.email,
        contact: request.contact,
        user_id: parse_user_id(request.user_id)?,
        notes: request.notes,
    };

    let result = state.create_customer.handle(cmd).await?;
    let status = if result.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(CreateCustomerResponse::from(result))))
}

/// POST /create-subscription - First subscription or renewal
pub async fn create_subscription(
    State(state): State<BillingAppState>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CreateSubscriptionCommand {
        razorpay_plan_id: request.plan_id,
        razorpay_customer_id: request.customer_id,
        total_count: request.total_count,
        user_id: parse_user_id(request.user_id)?,
    };

    let snapshot = state.create_subscription.handle(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSubscriptionResponse::from(snapshot)),
    ))
}

/// POST /webhook - Razorpay event delivery
///
/// Acknowledged before verification; verification and reconciliation run in
/// the background and report only through logs.
pub async fn handle_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .or_else(|| headers.get(FALLBACK_SIGNATURE_HEADER))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = HandleWebhookCommand {
        payload: body.to_vec(),
        signature,
    };
    let handler = state.webhook.clone();
    tokio::spawn(async move {
        handler.process_acknowledged(cmd).await;
    });

    (StatusCode::OK, Json(WebhookAck { status: "ok" }))
}

/// POST /check-subscription/:id - Poll the processor for current state
pub async fn check_subscription(
    State(state): State<BillingAppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CheckSubscriptionStatusCommand {
        razorpay_subscription_id: id,
    };

    let result = state.check_subscription.handle(cmd).await?;

    Ok(Json(CheckSubscriptionResponse::from(result)))
}

/// POST /subscriptions/:id/addons - Attach a one-off charge
pub async fn add_addon(
    State(state): State<BillingAppState>,
    Path(id): Path<String>,
    Json(request): Json<AddAddonRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = AddAddonCommand {
        razorpay_subscription_id: id,
        name: request.name,
        description: request.description,
        amount: request.amount,
        quantity: request.quantity,
        currency: request.currency,
    };

    let subscription = state.add_addon.handle(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse::from(subscription)),
    ))
}

/// POST /create-order - One-off order
pub async fn create_order(
    State(state): State<BillingAppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CreateOrderCommand {
        amount: request.amount,
        currency: request.currency,
        receipt: request.receipt,
    };

    let order = state.create_order.handle(cmd).await?;

    Ok((StatusCode::CREATED, Json(OrderResponse::from(order))))
}

/// POST /capture-payment - Capture an authorized payment
pub async fn capture_payment(
    State(state): State<BillingAppState>,
    Json(request): Json<CapturePaymentRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CapturePaymentCommand {
        razorpay_payment_id: request.payment_id,
        razorpay_order_id: request.order_id,
        amount: request.amount,
        currency: request.currency,
    };

    let payment = state.capture_payment.handle(cmd).await?;

    Ok(Json(PaymentResponse::from(payment)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /subscriptions/:id - Local snapshot by local or processor id
pub async fn get_subscription(
    State(state): State<BillingAppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let view = state
        .get_subscription
        .handle(GetSubscriptionQuery { id })
        .await?;

    Ok(Json(SubscriptionViewResponse::from(view)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl BillingApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            BillingError::Validation(_) | BillingError::InvalidEvent(_) => StatusCode::BAD_REQUEST,
            BillingError::NotFound { .. } | BillingError::PlanNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            BillingError::InvalidSignature => StatusCode::UNAUTHORIZED,
            BillingError::Processor(_) => StatusCode::BAD_GATEWAY,
            BillingError::SubscriptionCreation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BillingError::Persistence(err) if err.is_conflict() => StatusCode::CONFLICT,
            BillingError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let err = &self.0;

        if status.is_server_error() {
            tracing::error!(error = %err, code = err.code(), "Billing request failed");
        }

        // Storage internals stay out of the response body
        let message = match err {
            BillingError::Persistence(_) => "Internal storage error".to_string(),
            other => other.to_string(),
        };
        let mut body = ErrorResponse::new(err.code(), message);
        if let Some(processor) = err.processor_error() {
            body = body.with_details(json!({
                "processorCode": processor.code,
                "processorDescription": processor.description,
                "field": processor.field,
            }));
        }

        (status, Json(body)).into_response()
    }
}
