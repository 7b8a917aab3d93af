//! CapturePaymentHandler - captures an authorized payment and records it.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Payment, PaymentStatus, DEFAULT_CURRENCY};
use crate::domain::foundation::ValidationError;
use crate::ports::{CustomerRepository, PaymentProcessor, PaymentRepository};

#[derive(Debug, Clone, Default)]
pub struct CapturePaymentCommand {
    pub razorpay_payment_id: String,
    pub razorpay_order_id: Option<String>,
    /// Minor units.
    pub amount: i64,
    pub currency: Option<String>,
}

pub struct CapturePaymentHandler {
    processor: Arc<dyn PaymentProcessor>,
    customers: Arc<dyn CustomerRepository>,
    payments: Arc<dyn PaymentRepository>,
}

impl CapturePaymentHandler {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        customers: Arc<dyn CustomerRepository>,
        payments: Arc<dyn PaymentRepository>,
    ) -> Self {
        Self {
            processor,
            customers,
            payments,
        }
    }

    pub async fn handle(&self, cmd: CapturePaymentCommand) -> Result<Payment, BillingError> {
        let payment_id = cmd.razorpay_payment_id.trim();
        if payment_id.is_empty() {
            return Err(BillingError::missing("payment_id"));
        }
        if cmd.amount <= 0 {
            return Err(ValidationError::out_of_range("amount", 1, i64::MAX, cmd.amount).into());
        }
        let currency = cmd.currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        let entity = self
            .processor
            .capture_payment(payment_id, cmd.amount, &currency)
            .await
            .map_err(|e| BillingError::from_lookup("payment", payment_id, e))?;

        let mut payment = Payment::new(
            &entity.id,
            entity.amount,
            entity.currency.clone().or(Some(currency)),
            entity.payment_status().unwrap_or(PaymentStatus::Captured),
        )?;
        payment.razorpay_order_id = entity.order_id.clone().or(cmd.razorpay_order_id);
        payment.method = entity.method.clone();
        payment.details = serde_json::to_value(&entity)
            .map_err(|e| BillingError::InvalidEvent(e.to_string()))?;
        if let Some(customer_id) = entity.customer_id.as_deref() {
            payment.customer_id = self
                .customers
                .find_by_razorpay_id(customer_id)
                .await?
                .map(|c| c.id);
        }

        let stored = self.payments.upsert(&payment).await?;
        tracing::info!(
            razorpay_payment_id = %stored.razorpay_payment_id,
            status = %stored.status,
            "Payment captured"
        );
        Ok(stored)
    }
}
