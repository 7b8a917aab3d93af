//! Payment repository port.

use async_trait::async_trait;

use crate::domain::billing::Payment;
use crate::domain::foundation::DomainError;

/// Persistence for [`Payment`] records keyed by processor payment id.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Inserts, or merges into the existing record with the same
    /// `razorpay_payment_id` (see [`Payment::merge`]). Atomic per processor
    /// payment id: concurrent upserts leave exactly one record.
    ///
    /// Returns the stored record.
    async fn upsert(&self, payment: &Payment) -> Result<Payment, DomainError>;

    async fn find_by_razorpay_id(&self, razorpay_payment_id: &str)
        -> Result<Option<Payment>, DomainError>;
}
