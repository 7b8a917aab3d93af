use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::billing::Payment;
use crate::domain::foundation::DomainError;
use crate::ports::PaymentRepository;

#[derive(Default)]
pub struct InMemoryPaymentRepository {
    payments: Mutex<Vec<Payment>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.payments.lock().await.len()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn upsert(&self, payment: &Payment) -> Result<Payment, DomainError> {
        let mut payments = self.payments.lock().await;
        let position = payments
            .iter()
            .position(|p| p.razorpay_payment_id == payment.razorpay_payment_id);
        match position {
            Some(index) => {
                payments[index].merge(payment.clone());
                Ok(payments[index].clone())
            }
            None => {
                payments.push(payment.clone());
                Ok(payment.clone())
            }
        }
    }

    async fn find_by_razorpay_id(
        &self,
        razorpay_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .payments
            .lock()
            .await
            .iter()
            .find(|p| p.razorpay_payment_id == razorpay_payment_id)
            .cloned())
    }
}
