//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Command handlers (write) and query handlers (read) are kept separate.

pub mod handlers;

pub use handlers::billing::{
    AddAddonCommand, AddAddonHandler, CapturePaymentCommand, CapturePaymentHandler,
    CheckSubscriptionStatusCommand, CheckSubscriptionStatusHandler, CheckSubscriptionStatusResult,
    CreateCustomerCommand, CreateCustomerHandler, CreateCustomerResult, CreateOrderCommand,
    CreateOrderHandler, CreateSubscriptionCommand, CreateSubscriptionHandler, CustomerContext,
    EventReconciler, GetSubscriptionHandler, GetSubscriptionQuery, HandleWebhookCommand,
    HandleWebhookHandler, ReconcileOutcome, SubscriptionSnapshot, SubscriptionView,
    UpsertResolver,
};
