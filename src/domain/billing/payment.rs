//! Payment records keyed by the processor payment id.

use crate::domain::foundation::{CustomerId, PaymentId, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CURRENCY: &str = "INR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Created,
    Authorized,
    Captured,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Failed => "failed",
        }
    }

    /// Position in the payment lifecycle. An upsert never lowers it, so a
    /// late `payment.authorized` cannot undo a capture.
    pub fn rank(&self) -> i16 {
        match self {
            PaymentStatus::Created => 0,
            PaymentStatus::Authorized => 1,
            PaymentStatus::Captured | PaymentStatus::Failed => 2,
            PaymentStatus::Refunded => 3,
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(PaymentStatus::Created),
            "authorized" => Ok(PaymentStatus::Authorized),
            "captured" => Ok(PaymentStatus::Captured),
            "refunded" => Ok(PaymentStatus::Refunded),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown payment status '{}'", other),
            )),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local payment record. `amount` is in minor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub razorpay_payment_id: String,
    pub razorpay_order_id: Option<String>,
    pub customer_id: Option<CustomerId>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: Option<String>,
    /// Raw processor entity as last received.
    pub details: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Payment {
    pub fn new(
        razorpay_payment_id: impl Into<String>,
        amount: i64,
        currency: Option<String>,
        status: PaymentStatus,
    ) -> Result<Self, ValidationError> {
        let razorpay_payment_id = razorpay_payment_id.into();
        if razorpay_payment_id.trim().is_empty() {
            return Err(ValidationError::empty_field("razorpay_payment_id"));
        }
        if amount < 0 {
            return Err(ValidationError::out_of_range("amount", 0, i64::MAX, amount));
        }
        let now = Timestamp::now();
        Ok(Self {
            id: PaymentId::new(),
            razorpay_payment_id,
            razorpay_order_id: None,
            customer_id: None,
            amount,
            currency: currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            status,
            method: None,
            details: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        })
    }

    /// Folds a newer observation of the same processor payment into this
    /// record. Identity and `created_at` are kept; status only moves forward.
    pub fn merge(&mut self, incoming: Payment) {
        if incoming.status.rank() >= self.status.rank() {
            self.status = incoming.status;
        }
        self.amount = incoming.amount;
        self.currency = incoming.currency;
        self.razorpay_order_id = incoming.razorpay_order_id.or(self.razorpay_order_id.take());
        self.customer_id = incoming.customer_id.or(self.customer_id);
        self.method = incoming.method.or(self.method.take());
        if !incoming.details.is_null() {
            self.details = incoming.details;
        }
        self.updated_at = Timestamp::now();
    }
}
