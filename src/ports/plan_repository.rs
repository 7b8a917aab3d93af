//! Plan repository port.

use async_trait::async_trait;

use crate::domain::billing::Plan;
use crate::domain::foundation::{DomainError, PlanId};

/// Append-only store of plans mirrored from the processor.
///
/// `razorpay_plan_id` is unique; a colliding insert fails with
/// `ErrorCode::DuplicateKey`.
#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn insert(&self, plan: &Plan) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &PlanId) -> Result<Option<Plan>, DomainError>;

    async fn find_by_razorpay_id(&self, razorpay_plan_id: &str) -> Result<Option<Plan>, DomainError>;
}
