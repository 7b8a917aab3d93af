//! PostgreSQL implementation of SubscriptionRepository.
//!
//! Addons, discount and the audit trail are embedded in the aggregate and
//! stored as JSONB columns on the subscription row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{Addon, AuditEvent, Discount, Subscription};
use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, PlanId, SubscriptionId, Timestamp,
};
use crate::ports::SubscriptionRepository;

use super::{corrupt, from_count, read_error, to_count, write_error};

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    razorpay_subscription_id: String,
    customer_id: Uuid,
    plan_id: Uuid,
    status: String,
    subscription_start_date: DateTime<Utc>,
    subscription_end_date: DateTime<Utc>,
    start_at: Option<DateTime<Utc>>,
    charge_at: Option<DateTime<Utc>>,
    current_start: Option<DateTime<Utc>>,
    current_end: Option<DateTime<Utc>>,
    total_count: i32,
    paid_count: i32,
    billing_period: String,
    pending_activation: bool,
    is_renewal: bool,
    is_scheduled: bool,
    short_url: Option<String>,
    addons: Json<Vec<Addon>>,
    discount: Option<Json<Discount>>,
    audit: Json<Vec<AuditEvent>>,
    last_event_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            razorpay_subscription_id: row.razorpay_subscription_id,
            customer_id: CustomerId::from_uuid(row.customer_id),
            plan_id: PlanId::from_uuid(row.plan_id),
            status: row.status.parse().map_err(|_| corrupt("status", &row.status))?,
            subscription_start_date: Timestamp::from_datetime(row.subscription_start_date),
            subscription_end_date: Timestamp::from_datetime(row.subscription_end_date),
            start_at: row.start_at.map(Timestamp::from_datetime),
            charge_at: row.charge_at.map(Timestamp::from_datetime),
            current_start: row.current_start.map(Timestamp::from_datetime),
            current_end: row.current_end.map(Timestamp::from_datetime),
            total_count: to_count("total_count", row.total_count)?,
            paid_count: to_count("paid_count", row.paid_count)?,
            billing_period: row
                .billing_period
                .parse()
                .map_err(|_| corrupt("billing_period", &row.billing_period))?,
            pending_activation: row.pending_activation,
            is_renewal: row.is_renewal,
            is_scheduled: row.is_scheduled,
            short_url: row.short_url,
            addons: row.addons.0,
            discount: row.discount.map(|d| d.0),
            audit: row.audit.0,
            last_event_at: row.last_event_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            version: row.version,
        })
    }
}

const SELECT_SUBSCRIPTION: &str = r#"
    SELECT id, razorpay_subscription_id, customer_id, plan_id, status,
           subscription_start_date, subscription_end_date, start_at, charge_at,
           current_start, current_end, total_count, paid_count, billing_period,
           pending_activation, is_renewal, is_scheduled, short_url, addons,
           discount, audit, last_event_at, created_at, updated_at, version
    FROM subscriptions
"#;

fn optional_datetime(ts: &Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.map(|t| *t.as_datetime())
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let s = subscription;
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, razorpay_subscription_id, customer_id, plan_id, status,
                subscription_start_date, subscription_end_date, start_at, charge_at,
                current_start, current_end, total_count, paid_count, billing_period,
                pending_activation, is_renewal, is_scheduled, short_url, addons,
                discount, audit, last_event_at, created_at, updated_at, version
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25
            )
            "#,
        )
        .bind(s.id.as_uuid())
        .bind(&s.razorpay_subscription_id)
        .bind(s.customer_id.as_uuid())
        .bind(s.plan_id.as_uuid())
        .bind(s.status.as_str())
        .bind(s.subscription_start_date.as_datetime())
        .bind(s.subscription_end_date.as_datetime())
        .bind(optional_datetime(&s.start_at))
        .bind(optional_datetime(&s.charge_at))
        .bind(optional_datetime(&s.current_start))
        .bind(optional_datetime(&s.current_end))
        .bind(from_count(s.total_count))
        .bind(from_count(s.paid_count))
        .bind(s.billing_period.as_str())
        .bind(s.pending_activation)
        .bind(s.is_renewal)
        .bind(s.is_scheduled)
        .bind(&s.short_url)
        .bind(Json(&s.addons))
        .bind(s.discount.as_ref().map(Json))
        .bind(Json(&s.audit))
        .bind(optional_datetime(&s.last_event_at))
        .bind(s.created_at.as_datetime())
        .bind(s.updated_at.as_datetime())
        .bind(s.version)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            write_error(
                e,
                "save subscription",
                &[(
                    "subscriptions_razorpay_subscription_id_key",
                    "razorpay_subscription_id",
                    s.razorpay_subscription_id.as_str(),
                )],
            )
        })?;

        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let s = subscription;
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                status = $2,
                subscription_start_date = $3,
                subscription_end_date = $4,
                start_at = $5,
                charge_at = $6,
                current_start = $7,
                current_end = $8,
                total_count = $9,
                paid_count = $10,
                pending_activation = $11,
                is_scheduled = $12,
                short_url = $13,
                addons = $14,
                discount = $15,
                audit = $16,
                last_event_at = $17,
                updated_at = $18,
                version = version + 1
            WHERE id = $1 AND version = $19
            "#,
        )
        .bind(s.id.as_uuid())
        .bind(s.status.as_str())
        .bind(s.subscription_start_date.as_datetime())
        .bind(s.subscription_end_date.as_datetime())
        .bind(optional_datetime(&s.start_at))
        .bind(optional_datetime(&s.charge_at))
        .bind(optional_datetime(&s.current_start))
        .bind(optional_datetime(&s.current_end))
        .bind(from_count(s.total_count))
        .bind(from_count(s.paid_count))
        .bind(s.pending_activation)
        .bind(s.is_scheduled)
        .bind(&s.short_url)
        .bind(Json(&s.addons))
        .bind(s.discount.as_ref().map(Json))
        .bind(Json(&s.audit))
        .bind(optional_datetime(&s.last_event_at))
        .bind(s.updated_at.as_datetime())
        .bind(s.version)
        .execute(&self.pool)
        .await
        .map_err(|e| read_error(e, "update subscription"))?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM subscriptions WHERE id = $1")
                    .bind(s.id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| read_error(e, "update subscription"))?;
            return Err(match exists {
                Some(_) => DomainError::conflict("Subscription", s.id.to_string(), s.version),
                None => DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found"),
            });
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT_SUBSCRIPTION))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| read_error(e, "find subscription"))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_razorpay_id(
        &self,
        razorpay_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE razorpay_subscription_id = $1",
            SELECT_SUBSCRIPTION
        ))
        .bind(razorpay_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error(e, "find subscription"))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_active_for(
        &self,
        customer_id: &CustomerId,
        plan_id: &PlanId,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            r#"{}
            WHERE customer_id = $1 AND plan_id = $2 AND status = 'active'
            ORDER BY subscription_end_date DESC
            LIMIT 1"#,
            SELECT_SUBSCRIPTION
        ))
        .bind(customer_id.as_uuid())
        .bind(plan_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error(e, "find active subscription"))?;

        row.map(Subscription::try_from).transpose()
    }
}
