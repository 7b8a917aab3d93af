//! Ports - interfaces between the application layer and infrastructure.
//!
//! - [`PaymentProcessor`] - outbound calls to the payment processor
//! - [`CustomerRepository`], [`PlanRepository`], [`SubscriptionRepository`],
//!   [`PaymentRepository`] - the entity store, one table per aggregate

mod customer_repository;
mod payment_processor;
mod payment_repository;
mod plan_repository;
mod subscription_repository;

pub use customer_repository::CustomerRepository;
pub use payment_processor::{
    AddonEntity, CreateAddonRequest, CreateCustomerRequest, CreateOrderRequest,
    CreateSubscriptionRequest, CustomerEntity, InvoiceEntity, LineItem, OrderEntity,
    PaymentEntity, PaymentProcessor, PlanEntity, SubscriptionEntity,
};
pub use payment_repository::PaymentRepository;
pub use plan_repository::PlanRepository;
pub use subscription_repository::SubscriptionRepository;
