//! HTTP DTOs for billing endpoints.
//!
//! Requests and responses use camelCase. Amounts are minor units (paise).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::application::{
    CheckSubscriptionStatusResult, CreateCustomerResult, SubscriptionSnapshot, SubscriptionView,
};
use crate::domain::billing::{
    Addon, AuditEvent, Customer, Discount, Payment, PaymentStatus, Plan, Subscription,
    SubscriptionStatus,
};
use crate::ports::OrderEntity;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default, alias = "user_id")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    /// Processor plan id (`plan_...`).
    #[serde(default, alias = "plan_id")]
    pub plan_id: Option<String>,
    /// Processor customer id (`cust_...`).
    #[serde(default, alias = "customer_id")]
    pub customer_id: Option<String>,
    #[serde(default, alias = "total_count")]
    pub total_count: Option<u32>,
    #[serde(default, alias = "user_id")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAddonRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub amount: i64,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub receipt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturePaymentRequest {
    #[serde(alias = "payment_id")]
    pub payment_id: String,
    #[serde(default, alias = "order_id")]
    pub order_id: Option<String>,
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerResponse {
    pub id: String,
    pub razorpay_customer_id: String,
    pub name: String,
    pub email: Option<String>,
    pub contact: Option<String>,
    pub user_id: Option<String>,
    pub notes: BTreeMap<String, String>,
    pub created_at: String,
}

impl From<Customer> for CustomerResponse {
    fn from(customer: Customer) -> Self {
        Self {
            id: customer.id.to_string(),
            razorpay_customer_id: customer.razorpay_customer_id,
            name: customer.name,
            email: customer.email,
            contact: customer.contact,
            user_id: customer.user_id.map(|u| u.as_str().to_string()),
            notes: customer.notes,
            created_at: customer.created_at.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerResponse {
    pub customer: CustomerResponse,
    pub created: bool,
}

impl From<CreateCustomerResult> for CreateCustomerResponse {
    fn from(result: CreateCustomerResult) -> Self {
        Self {
            customer: result.customer.into(),
            created: result.created,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub id: String,
    pub razorpay_plan_id: String,
    pub name: String,
    pub amount: i64,
    /// `amount` in major units.
    pub amount_major: f64,
    pub currency: String,
    pub interval: String,
    pub interval_count: u32,
    pub billing_period: String,
}

impl From<Plan> for PlanResponse {
    fn from(plan: Plan) -> Self {
        Self {
            amount_major: plan.amount_major(),
            id: plan.id.to_string(),
            razorpay_plan_id: plan.razorpay_plan_id,
            name: plan.name,
            amount: plan.amount,
            currency: plan.currency,
            interval: plan.interval.to_string(),
            interval_count: plan.interval_count,
            billing_period: plan.billing_period.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub id: String,
    pub razorpay_subscription_id: String,
    pub customer_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub subscription_start_date: String,
    pub subscription_end_date: String,
    pub start_at: Option<String>,
    pub charge_at: Option<String>,
    pub current_start: Option<String>,
    pub current_end: Option<String>,
    pub total_count: u32,
    pub paid_count: u32,
    pub billing_period: String,
    pub pending_activation: bool,
    pub is_renewal: bool,
    pub is_scheduled: bool,
    pub short_url: Option<String>,
    pub addons: Vec<Addon>,
    pub discount: Option<Discount>,
    pub audit: Vec<AuditEvent>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(s: Subscription) -> Self {
        Self {
            id: s.id.to_string(),
            razorpay_subscription_id: s.razorpay_subscription_id,
            customer_id: s.customer_id.to_string(),
            plan_id: s.plan_id.to_string(),
            status: s.status,
            subscription_start_date: s.subscription_start_date.to_string(),
            subscription_end_date: s.subscription_end_date.to_string(),
            start_at: s.start_at.map(|t| t.to_string()),
            charge_at: s.charge_at.map(|t| t.to_string()),
            current_start: s.current_start.map(|t| t.to_string()),
            current_end: s.current_end.map(|t| t.to_string()),
            total_count: s.total_count,
            paid_count: s.paid_count,
            billing_period: s.billing_period.to_string(),
            pending_activation: s.pending_activation,
            is_renewal: s.is_renewal,
            is_scheduled: s.is_scheduled,
            short_url: s.short_url,
            addons: s.addons,
            discount: s.discount,
            audit: s.audit,
            created_at: s.created_at.to_string(),
            updated_at: s.updated_at.to_string(),
        }
    }
}

/// Response for `POST /create-subscription`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionResponse {
    pub subscription: SubscriptionResponse,
    pub customer: CustomerResponse,
    pub plan: PlanResponse,
    pub processor_status: String,
    /// Hosted page where the customer authenticates the mandate.
    pub short_url: Option<String>,
    pub expire_by: String,
}

impl From<SubscriptionSnapshot> for CreateSubscriptionResponse {
    fn from(snapshot: SubscriptionSnapshot) -> Self {
        Self {
            short_url: snapshot.subscription.short_url.clone(),
            subscription: snapshot.subscription.into(),
            customer: snapshot.customer.into(),
            plan: snapshot.plan.into(),
            processor_status: snapshot.processor_status,
            expire_by: snapshot.expire_by.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSubscriptionResponse {
    pub subscription: SubscriptionResponse,
    pub processor_status: SubscriptionStatus,
    pub changed: bool,
}

impl From<CheckSubscriptionStatusResult> for CheckSubscriptionResponse {
    fn from(result: CheckSubscriptionStatusResult) -> Self {
        Self {
            subscription: result.subscription.into(),
            processor_status: result.processor_status,
            changed: result.changed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionViewResponse {
    pub subscription: SubscriptionResponse,
    pub customer: Option<CustomerResponse>,
    pub plan: Option<PlanResponse>,
}

impl From<SubscriptionView> for SubscriptionViewResponse {
    fn from(view: SubscriptionView) -> Self {
        Self {
            subscription: view.subscription.into(),
            customer: view.customer.map(Into::into),
            plan: view.plan.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

impl From<OrderEntity> for OrderResponse {
    fn from(order: OrderEntity) -> Self {
        Self {
            id: order.id,
            amount: order.amount,
            currency: order.currency,
            receipt: order.receipt,
            status: order.status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: String,
    pub razorpay_payment_id: String,
    pub razorpay_order_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: Option<String>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id.to_string(),
            razorpay_payment_id: payment.razorpay_payment_id,
            razorpay_order_id: payment.razorpay_order_id,
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            method: payment.method,
        }
    }
}

/// Webhook acknowledgment, sent before verification runs.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

/// Error response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
