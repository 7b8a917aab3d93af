//! In-memory entity store.
//!
//! Honours the same uniqueness contract as the PostgreSQL adapter, so the
//! application handlers behave identically against either. Used by the test
//! suite and for running the service without a database.

mod customer_repository;
mod payment_repository;
mod plan_repository;
mod subscription_repository;

pub use customer_repository::InMemoryCustomerRepository;
pub use payment_repository::InMemoryPaymentRepository;
pub use plan_repository::InMemoryPlanRepository;
pub use subscription_repository::InMemorySubscriptionRepository;
