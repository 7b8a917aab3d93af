use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::Plan;
use crate::domain::foundation::{DomainError, PlanId};
use crate::ports::PlanRepository;

#[derive(Default)]
pub struct InMemoryPlanRepository {
    plans: RwLock<Vec<Plan>>,
}

impl InMemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.plans.read().await.len()
    }
}

#[async_trait]
impl PlanRepository for InMemoryPlanRepository {
    async fn insert(&self, plan: &Plan) -> Result<(), DomainError> {
        let mut plans = self.plans.write().await;
        if plans
            .iter()
            .any(|p| p.razorpay_plan_id == plan.razorpay_plan_id)
        {
            return Err(DomainError::duplicate("razorpay_plan_id", &plan.razorpay_plan_id));
        }
        plans.push(plan.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &PlanId) -> Result<Option<Plan>, DomainError> {
        Ok(self.plans.read().await.iter().find(|p| &p.id == id).cloned())
    }

    async fn find_by_razorpay_id(&self, razorpay_plan_id: &str) -> Result<Option<Plan>, DomainError> {
        Ok(self
            .plans
            .read()
            .await
            .iter()
            .find(|p| p.razorpay_plan_id == razorpay_plan_id)
            .cloned())
    }
}
