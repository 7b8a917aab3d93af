//! Subscription repository port.

use async_trait::async_trait;

use crate::domain::billing::Subscription;
use crate::domain::foundation::{CustomerId, DomainError, PlanId, SubscriptionId};

/// Persistence for [`Subscription`] aggregates, embedded addons, discount and
/// audit trail included.
///
/// # Errors
///
/// - `DuplicateKey` when `insert` collides on `razorpay_subscription_id`
/// - `SubscriptionNotFound` when `update` targets an unknown id
/// - `ConcurrencyConflict` when `update` carries a version other than the
///   stored one
/// - `DatabaseError` on storage failure
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Replaces the stored record with the same local id, provided its
    /// version still equals `subscription.version`. The stored version becomes
    /// `subscription.version + 1`.
    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    async fn find_by_razorpay_id(
        &self,
        razorpay_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// The `active` subscription for this customer and plan with the latest
    /// end date, if any.
    async fn find_active_for(
        &self,
        customer_id: &CustomerId,
        plan_id: &PlanId,
    ) -> Result<Option<Subscription>, DomainError>;
}
