//! CreateOrderHandler - one-off order for checkout.

use std::sync::Arc;

use crate::domain::billing::{BillingError, DEFAULT_CURRENCY};
use crate::domain::foundation::ValidationError;
use crate::ports::{CreateOrderRequest, OrderEntity, PaymentProcessor};

#[derive(Debug, Clone, Default)]
pub struct CreateOrderCommand {
    /// Minor units.
    pub amount: i64,
    pub currency: Option<String>,
    pub receipt: Option<String>,
}

pub struct CreateOrderHandler {
    processor: Arc<dyn PaymentProcessor>,
}

impl CreateOrderHandler {
    pub fn new(processor: Arc<dyn PaymentProcessor>) -> Self {
        Self { processor }
    }

    pub async fn handle(&self, cmd: CreateOrderCommand) -> Result<OrderEntity, BillingError> {
        if cmd.amount <= 0 {
            return Err(ValidationError::out_of_range("amount", 1, i64::MAX, cmd.amount).into());
        }
        let currency = cmd
            .currency
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        let order = self
            .processor
            .create_order(CreateOrderRequest {
                amount: cmd.amount,
                currency,
                receipt: cmd.receipt.filter(|r| !r.trim().is_empty()),
            })
            .await
            .map_err(BillingError::Processor)?;

        tracing::info!(order_id = %order.id, amount = order.amount, "Order created");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::razorpay::MockPaymentProcessor;

    #[tokio::test]
    async fn currency_defaults_to_inr() {
        let handler = CreateOrderHandler::new(Arc::new(MockPaymentProcessor::new()));
        let order = handler
            .handle(CreateOrderCommand {
                amount: 50_000,
                receipt: Some("rcpt_1".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(order.currency, "INR");
        assert_eq!(order.amount, 50_000);
        assert_eq!(order.receipt.as_deref(), Some("rcpt_1"));
    }

    #[tokio::test]
    async fn zero_amount_never_reaches_processor() {
        let processor = MockPaymentProcessor::new();
        let handler = CreateOrderHandler::new(Arc::new(processor.clone()));
        let err = handler.handle(CreateOrderCommand::default()).await.unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
        assert_eq!(processor.calls("create_order"), 0);
    }
}
