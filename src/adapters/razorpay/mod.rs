//! Razorpay adapters: the REST client and an in-process mock for tests.

mod client;
mod mock_processor;

pub use client::{RazorpayClient, RazorpayConfig};
pub use mock_processor::MockPaymentProcessor;
