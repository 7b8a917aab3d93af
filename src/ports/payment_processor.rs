//! Payment processor port.
//!
//! Contract for the remote billing API (Razorpay). The client is constructed
//! once and injected wherever it is needed, so tests substitute a fake.
//!
//! Amounts cross this boundary in minor units (paise), which is also how
//! the processor speaks. Timestamps are Unix seconds as the processor sends them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{
    BillingInterval, CycleCounters, NewPlan, PaymentStatus, ProcessorError, SubscriptionStatus,
};
use crate::domain::foundation::{Timestamp, ValidationError};

/// Outbound calls to the payment processor.
///
/// `fetch_*` return `Ok(None)` when the processor does not know the id.
/// Transport failures and timeouts are errors, never a presumed success.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<CustomerEntity, ProcessorError>;

    async fn fetch_customer(&self, customer_id: &str)
        -> Result<Option<CustomerEntity>, ProcessorError>;

    async fn fetch_plan(&self, plan_id: &str) -> Result<Option<PlanEntity>, ProcessorError>;

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionEntity, ProcessorError>;

    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionEntity>, ProcessorError>;

    async fn create_addon(
        &self,
        subscription_id: &str,
        request: CreateAddonRequest,
    ) -> Result<AddonEntity, ProcessorError>;

    async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderEntity, ProcessorError>;

    async fn capture_payment(
        &self,
        payment_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<PaymentEntity, ProcessorError>;
}

// ════════════════════════════════════════════════════════════════════════════
// Requests
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    /// `"0"` returns the existing customer for a repeated email instead of failing.
    pub fail_existing: String,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub notes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSubscriptionRequest {
    pub plan_id: String,
    pub customer_id: String,
    pub total_count: u32,
    pub quantity: u32,
    pub customer_notify: u8,
    /// Deferred start, Unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<i64>,
    /// Unix seconds.
    pub expire_by: i64,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub notes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItem {
    pub name: String,
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateAddonRequest {
    pub item: LineItem,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════
// Entities as the processor returns them
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerEntity {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanEntity {
    pub id: String,
    /// `daily|weekly|monthly|yearly`
    pub period: String,
    pub interval: u32,
    pub item: LineItem,
}

impl PlanEntity {
    pub fn to_new_plan(&self) -> Result<NewPlan, ValidationError> {
        Ok(NewPlan {
            razorpay_plan_id: self.id.clone(),
            name: self.item.name.clone(),
            description: self.item.description.clone(),
            amount: self.item.amount,
            currency: self.item.currency.clone(),
            interval: self.period.parse::<BillingInterval>()?,
            interval_count: self.interval,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionEntity {
    pub id: String,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total_count: Option<u32>,
    #[serde(default)]
    pub paid_count: Option<u32>,
    #[serde(default)]
    pub start_at: Option<i64>,
    #[serde(default)]
    pub end_at: Option<i64>,
    #[serde(default)]
    pub charge_at: Option<i64>,
    #[serde(default)]
    pub current_start: Option<i64>,
    #[serde(default)]
    pub current_end: Option<i64>,
    #[serde(default)]
    pub expire_by: Option<i64>,
    #[serde(default)]
    pub short_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl SubscriptionEntity {
    /// Status stated by the entity, falling back to what the event name implies.
    pub fn stated_status(&self, event: Option<&str>) -> Option<SubscriptionStatus> {
        self.status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .or_else(|| event.and_then(SubscriptionStatus::from_event_name))
    }

    pub fn counters(&self) -> CycleCounters {
        CycleCounters {
            paid_count: self.paid_count.unwrap_or(0),
            charge_at: self.charge_at.and_then(Timestamp::from_unix_secs),
            current_start: self.current_start.and_then(Timestamp::from_unix_secs),
            current_end: self.current_end.and_then(Timestamp::from_unix_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentEntity {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    pub status: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    /// Fields not modelled above, kept for the raw detail blob.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PaymentEntity {
    pub fn payment_status(&self) -> Result<PaymentStatus, ValidationError> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderEntity {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_paid: Option<i64>,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceEntity {
    pub id: String,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddonEntity {
    pub id: String,
    pub item: LineItem,
    pub quantity: u32,
    #[serde(default)]
    pub subscription_id: Option<String>,
}
