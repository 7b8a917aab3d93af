use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{Subscription, SubscriptionStatus};
use crate::domain::foundation::{CustomerId, DomainError, ErrorCode, PlanId, SubscriptionId};
use crate::ports::SubscriptionRepository;

#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut subscriptions = self.subscriptions.write().await;
        if subscriptions
            .iter()
            .any(|s| s.razorpay_subscription_id == subscription.razorpay_subscription_id)
        {
            return Err(DomainError::duplicate(
                "razorpay_subscription_id",
                &subscription.razorpay_subscription_id,
            ));
        }
        subscriptions.push(subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut subscriptions = self.subscriptions.write().await;
        let stored = subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
            .ok_or_else(|| {
                DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
                    .with_detail("id", subscription.id.to_string())
            })?;
        if stored.version != subscription.version {
            return Err(DomainError::conflict(
                "Subscription",
                subscription.id.to_string(),
                subscription.version,
            ));
        }
        *stored = subscription.clone();
        stored.version += 1;
        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .iter()
            .find(|s| &s.id == id)
            .cloned())
    }

    async fn find_by_razorpay_id(
        &self,
        razorpay_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .iter()
            .find(|s| s.razorpay_subscription_id == razorpay_subscription_id)
            .cloned())
    }

    async fn find_active_for(
        &self,
        customer_id: &CustomerId,
        plan_id: &PlanId,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .iter()
            .filter(|s| {
                &s.customer_id == customer_id
                    && &s.plan_id == plan_id
                    && s.status == SubscriptionStatus::Active
            })
            .max_by_key(|s| s.subscription_end_date)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::subscription_test_support::new_subscription;

    #[tokio::test]
    async fn duplicate_processor_id_is_rejected() {
        let repo = InMemorySubscriptionRepository::new();
        repo.insert(&new_subscription(SubscriptionStatus::Created))
            .await
            .unwrap();

        let err = repo
            .insert(&new_subscription(SubscriptionStatus::Created))
            .await
            .unwrap_err();

        assert!(err.is_duplicate());
        assert_eq!(repo.count().await, 1);
    }

    #[tokio::test]
    async fn active_lookup_prefers_latest_end_date() {
        let repo = InMemorySubscriptionRepository::new();
        let first = new_subscription(SubscriptionStatus::Active);
        let mut later = new_subscription(SubscriptionStatus::Active);
        later.razorpay_subscription_id = "sub_LATER".to_string();
        later.customer_id = first.customer_id;
        later.plan_id = first.plan_id;
        later.subscription_end_date =
            first.subscription_end_date.checked_add_months(12).unwrap();
        repo.insert(&first).await.unwrap();
        repo.insert(&later).await.unwrap();

        let found = repo
            .find_active_for(&first.customer_id, &first.plan_id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.razorpay_subscription_id, "sub_LATER");
    }

    #[tokio::test]
    async fn update_from_a_stale_read_is_rejected() {
        let repo = InMemorySubscriptionRepository::new();
        let sub = new_subscription(SubscriptionStatus::Created);
        repo.insert(&sub).await.unwrap();

        let mut first = repo.find_by_id(&sub.id).await.unwrap().unwrap();
        let mut second = first.clone();
        first.paid_count = 2;
        repo.update(&first).await.unwrap();
        second.paid_count = 1;
        let err = repo.update(&second).await.unwrap_err();

        assert!(err.is_conflict());
        let stored = repo.find_by_id(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored.paid_count, 2);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn update_of_unknown_subscription_fails() {
        let repo = InMemorySubscriptionRepository::new();
        let result = repo
            .update(&new_subscription(SubscriptionStatus::Active))
            .await;
        assert!(result.is_err());
    }
}
