//! PostgreSQL implementation of PlanRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::Plan;
use crate::domain::foundation::{DomainError, PlanId, Timestamp};
use crate::ports::PlanRepository;

use super::{corrupt, from_count, read_error, to_count, write_error};

pub struct PostgresPlanRepository {
    pool: PgPool,
}

impl PostgresPlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    razorpay_plan_id: String,
    name: String,
    description: Option<String>,
    amount: i64,
    currency: String,
    interval: String,
    interval_count: i32,
    billing_period: String,
    features: Json<Vec<String>>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<PlanRow> for Plan {
    type Error = DomainError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        Ok(Plan {
            id: PlanId::from_uuid(row.id),
            razorpay_plan_id: row.razorpay_plan_id,
            name: row.name,
            description: row.description,
            amount: row.amount,
            currency: row.currency,
            interval: row.interval.parse().map_err(|_| corrupt("interval", &row.interval))?,
            interval_count: to_count("interval_count", row.interval_count)?,
            billing_period: row
                .billing_period
                .parse()
                .map_err(|_| corrupt("billing_period", &row.billing_period))?,
            features: row.features.0,
            is_active: row.is_active,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

const SELECT_PLAN: &str = r#"
    SELECT id, razorpay_plan_id, name, description, amount, currency, interval,
           interval_count, billing_period, features, is_active, created_at
    FROM plans
"#;

#[async_trait]
impl PlanRepository for PostgresPlanRepository {
    async fn insert(&self, plan: &Plan) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO plans (
                id, razorpay_plan_id, name, description, amount, currency, interval,
                interval_count, billing_period, features, is_active, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(plan.id.as_uuid())
        .bind(&plan.razorpay_plan_id)
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(plan.amount)
        .bind(&plan.currency)
        .bind(plan.interval.as_str())
        .bind(from_count(plan.interval_count))
        .bind(plan.billing_period.as_str())
        .bind(Json(&plan.features))
        .bind(plan.is_active)
        .bind(plan.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            write_error(
                e,
                "save plan",
                &[(
                    "plans_razorpay_plan_id_key",
                    "razorpay_plan_id",
                    plan.razorpay_plan_id.as_str(),
                )],
            )
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &PlanId) -> Result<Option<Plan>, DomainError> {
        let row: Option<PlanRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT_PLAN))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| read_error(e, "find plan"))?;

        row.map(Plan::try_from).transpose()
    }

    async fn find_by_razorpay_id(&self, razorpay_plan_id: &str) -> Result<Option<Plan>, DomainError> {
        let row: Option<PlanRow> =
            sqlx::query_as(&format!("{} WHERE razorpay_plan_id = $1", SELECT_PLAN))
                .bind(razorpay_plan_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| read_error(e, "find plan"))?;

        row.map(Plan::try_from).transpose()
    }
}
