//! Adapters - Implementations of port interfaces.
//!
//! - `razorpay` - Payment processor REST client and test double
//! - `postgres` - PostgreSQL entity store
//! - `memory` - In-memory entity store
//! - `http` - Axum REST surface

pub mod http;
pub mod memory;
pub mod postgres;
pub mod razorpay;
