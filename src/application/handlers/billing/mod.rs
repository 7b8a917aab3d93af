//! Billing handlers.
//!
//! ## Commands
//! - Registering customers
//! - Creating subscriptions and renewals
//! - Attaching addons, creating orders, capturing payments
//! - Reconciling processor webhooks
//! - Polling the processor for a subscription's current state
//!
//! ## Queries
//! - Get subscription snapshot

mod add_addon;
mod capture_payment;
mod check_subscription_status;
mod create_customer;
mod create_order;
mod create_subscription;
mod get_subscription;
mod handle_webhook;
mod reconcile_event;
mod resolver;

use crate::domain::billing::BillingError;
use crate::domain::foundation::{DomainError, ErrorCode};

/// Read-modify-write attempts on one subscription before giving up.
const MAX_WRITE_ATTEMPTS: usize = 5;

fn write_conflict(razorpay_subscription_id: &str) -> BillingError {
    BillingError::Persistence(
        DomainError::new(
            ErrorCode::ConcurrencyConflict,
            "Subscription kept changing while being updated",
        )
        .with_detail("razorpay_subscription_id", razorpay_subscription_id),
    )
}

// Shared
pub use reconcile_event::{EventReconciler, ReconcileOutcome};
pub use resolver::{CustomerContext, UpsertResolver};

// Commands
pub use add_addon::{AddAddonCommand, AddAddonHandler};
pub use capture_payment::{CapturePaymentCommand, CapturePaymentHandler};
pub use check_subscription_status::{
    CheckSubscriptionStatusCommand, CheckSubscriptionStatusHandler, CheckSubscriptionStatusResult,
};
pub use create_customer::{CreateCustomerCommand, CreateCustomerHandler, CreateCustomerResult};
pub use create_order::{CreateOrderCommand, CreateOrderHandler};
pub use create_subscription::{
    CreateSubscriptionCommand, CreateSubscriptionHandler, SubscriptionSnapshot,
};
pub use handle_webhook::{HandleWebhookCommand, HandleWebhookHandler};

// Queries
pub use get_subscription::{GetSubscriptionHandler, GetSubscriptionQuery, SubscriptionView};
