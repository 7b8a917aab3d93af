//! Billing Reconciler - subscription billing on top of Razorpay
//!
//! Keeps locally stored customers, plans, subscriptions and payments
//! consistent with the payment processor, driven by signed webhooks and an
//! on-demand polling path.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
