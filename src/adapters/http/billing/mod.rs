//! HTTP adapter for billing endpoints.
//!
//! - `POST /api/customers` - Register a customer
//! - `POST /api/create-subscription` - Create a subscription
//! - `POST /api/check-subscription/:id` - Reconcile against the processor
//! - `GET /api/subscriptions/:id` - Local snapshot
//! - `POST /api/subscriptions/:id/addons` - Attach an addon
//! - `POST /api/create-order` - One-off order
//! - `POST /api/capture-payment` - Capture a payment
//! - `POST /webhook` - Razorpay webhooks

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{BillingApiError, BillingAppState, BillingDependencies};
pub use routes::{billing_router, billing_routes, webhook_routes};
