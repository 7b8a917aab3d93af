//! AddAddonHandler - one-off charge attached to the next invoice.

use std::sync::Arc;

use crate::domain::billing::{Actor, Addon, BillingError, Subscription, DEFAULT_CURRENCY};
use crate::domain::foundation::ValidationError;
use crate::ports::{CreateAddonRequest, LineItem, PaymentProcessor, SubscriptionRepository};

use super::{write_conflict, MAX_WRITE_ATTEMPTS};

#[derive(Debug, Clone, Default)]
pub struct AddAddonCommand {
    pub razorpay_subscription_id: String,
    pub name: String,
    pub description: Option<String>,
    /// Minor units.
    pub amount: i64,
    pub quantity: Option<u32>,
    pub currency: Option<String>,
}

pub struct AddAddonHandler {
    processor: Arc<dyn PaymentProcessor>,
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl AddAddonHandler {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        subscriptions: Arc<dyn SubscriptionRepository>,
    ) -> Self {
        Self {
            processor,
            subscriptions,
        }
    }

    pub async fn handle(&self, cmd: AddAddonCommand) -> Result<Subscription, BillingError> {
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(BillingError::missing("name"));
        }
        if cmd.amount <= 0 {
            return Err(ValidationError::out_of_range("amount", 1, i64::MAX, cmd.amount).into());
        }
        let quantity = cmd.quantity.unwrap_or(1);
        if quantity == 0 {
            return Err(ValidationError::out_of_range("quantity", 1, i64::from(u32::MAX), 0).into());
        }

        let subscription = self
            .subscriptions
            .find_by_razorpay_id(&cmd.razorpay_subscription_id)
            .await?
            .ok_or_else(|| BillingError::not_found("subscription", &cmd.razorpay_subscription_id))?;

        let entity = self
            .processor
            .create_addon(
                &subscription.razorpay_subscription_id,
                CreateAddonRequest {
                    item: LineItem {
                        name: name.to_string(),
                        amount: cmd.amount,
                        currency: cmd
                            .currency
                            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                        description: cmd.description,
                    },
                    quantity,
                },
            )
            .await
            .map_err(|e| {
                BillingError::from_lookup("subscription", &subscription.razorpay_subscription_id, e)
            })?;

        let addon = Addon {
            razorpay_addon_id: entity.id,
            name: entity.item.name,
            amount: entity.item.amount,
            quantity: entity.quantity,
        };

        // The processor already holds the addon; only the local write retries.
        let mut current = subscription;
        for _ in 0..MAX_WRITE_ATTEMPTS {
            current.attach_addon(addon.clone(), Actor::Api);
            match self.subscriptions.update(&current).await {
                Ok(()) => {
                    current.version += 1;
                    tracing::info!(
                        subscription_id = %current.id,
                        addons = current.addons.len(),
                        "Addon attached"
                    );
                    return Ok(current);
                }
                Err(err) if err.is_conflict() => {
                    current = self
                        .subscriptions
                        .find_by_id(&current.id)
                        .await?
                        .ok_or_else(|| {
                            BillingError::not_found("subscription", &cmd.razorpay_subscription_id)
                        })?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(write_conflict(&cmd.razorpay_subscription_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::adapters::razorpay::MockPaymentProcessor;
    use crate::domain::billing::subscription_test_support::new_subscription;
    use crate::domain::billing::{AuditKind, SubscriptionStatus};
    use crate::ports::SubscriptionEntity;

    async fn fixture() -> (AddAddonHandler, MockPaymentProcessor, Arc<InMemorySubscriptionRepository>) {
        let processor = MockPaymentProcessor::new();
        processor.put_subscription(SubscriptionEntity {
            id: "sub_TEST".into(),
            ..Default::default()
        });
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        subscriptions
            .insert(&new_subscription(SubscriptionStatus::Active))
            .await
            .unwrap();
        (
            AddAddonHandler::new(Arc::new(processor.clone()), subscriptions.clone()),
            processor,
            subscriptions,
        )
    }

    fn command(amount: i64) -> AddAddonCommand {
        AddAddonCommand {
            razorpay_subscription_id: "sub_TEST".into(),
            name: "Setup fee".into(),
            amount,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn addon_is_appended_and_audited() {
        let (handler, _, subscriptions) = fixture().await;

        let sub = handler.handle(command(10_000)).await.unwrap();

        assert_eq!(sub.addons.len(), 1);
        assert_eq!(sub.addons[0].amount, 10_000);
        assert_eq!(sub.addons[0].quantity, 1);
        assert_eq!(sub.audit.last().unwrap().kind, AuditKind::AddonAttached);
        let stored = subscriptions.find_by_razorpay_id("sub_TEST").await.unwrap().unwrap();
        assert_eq!(stored.addons, sub.addons);
        assert_eq!(stored.version, sub.version);
    }

    #[tokio::test]
    async fn addons_attached_back_to_back_are_both_kept() {
        let (handler, _, subscriptions) = fixture().await;

        let (first, second) = tokio::join!(
            handler.handle(command(10_000)),
            handler.handle(command(20_000))
        );
        first.unwrap();
        second.unwrap();

        let stored = subscriptions.find_by_razorpay_id("sub_TEST").await.unwrap().unwrap();
        let mut amounts: Vec<i64> = stored.addons.iter().map(|addon| addon.amount).collect();
        amounts.sort_unstable();
        assert_eq!(amounts, vec![10_000, 20_000]);
    }

    #[tokio::test]
    async fn non_positive_amount_is_rejected() {
        let (handler, processor, _) = fixture().await;
        let err = handler.handle(command(0)).await.unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
        assert_eq!(processor.calls("create_addon"), 0);
    }

    #[tokio::test]
    async fn unknown_local_subscription_is_not_found() {
        let (handler, _, _) = fixture().await;
        let mut cmd = command(10_000);
        cmd.razorpay_subscription_id = "sub_OTHER".into();
        let err = handler.handle(cmd).await.unwrap_err();
        assert!(matches!(err, BillingError::NotFound { .. }));
    }
}
