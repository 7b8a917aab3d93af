//! Customer repository port.

use async_trait::async_trait;

use crate::domain::billing::Customer;
use crate::domain::foundation::{CustomerId, DomainError};

/// Persistence for [`Customer`] records.
///
/// `razorpay_customer_id` and `email` are unique. A colliding insert fails
/// with `ErrorCode::DuplicateKey` and writes nothing; callers re-read.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn insert(&self, customer: &Customer) -> Result<(), DomainError>;

    /// Persists a notes change. Identity fields are never rewritten.
    async fn update_notes(&self, customer: &Customer) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, DomainError>;

    async fn find_by_razorpay_id(&self, razorpay_customer_id: &str)
        -> Result<Option<Customer>, DomainError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, DomainError>;
}
