//! Billing domain: customers, plans, subscriptions and payments mirrored
//! from the payment processor, plus the policies that keep them in step.

mod audit;
mod customer;
mod errors;
mod event;
mod payment;
mod plan;
mod schedule;
mod status;
mod subscription;
pub mod webhook_verifier;

pub use audit::{Actor, AuditEvent, AuditKind};
pub use customer::{validate_email, Customer};
pub use errors::{BillingError, ProcessorError, ProcessorErrorKind};
pub use event::{EntityKind, EntityWrapper, EventKind, EventPayload, ProcessorEvent};
pub use payment::{Payment, PaymentStatus, DEFAULT_CURRENCY};
pub use plan::{BillingInterval, BillingPeriod, CycleLength, NewPlan, Plan};
pub use schedule::{cycle_end, plan_cycle, CycleSchedule, MAX_TOTAL_COUNT};
pub use status::SubscriptionStatus;
pub use subscription::{
    Addon, CycleCounters, Discount, DiscountKind, NewSubscription, StatusChange, Subscription,
};
pub use webhook_verifier::WebhookVerifier;

#[cfg(test)]
pub(crate) use subscription::test_support as subscription_test_support;
