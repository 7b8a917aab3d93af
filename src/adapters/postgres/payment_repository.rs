//! PostgreSQL implementation of PaymentRepository.
//!
//! The upsert is a single `INSERT .. ON CONFLICT (razorpay_payment_id) DO
//! UPDATE`, so concurrent deliveries for one payment serialize on the unique
//! index. `status_rank` mirrors `PaymentStatus::rank` and keeps the status
//! from moving backwards under reordering.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{Payment, PaymentStatus};
use crate::domain::foundation::{CustomerId, DomainError, PaymentId, Timestamp};
use crate::ports::PaymentRepository;

use super::{corrupt, read_error};

pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    razorpay_payment_id: String,
    razorpay_order_id: Option<String>,
    customer_id: Option<Uuid>,
    amount: i64,
    currency: String,
    status: String,
    method: Option<String>,
    details: Json<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            razorpay_payment_id: row.razorpay_payment_id,
            razorpay_order_id: row.razorpay_order_id,
            customer_id: row.customer_id.map(CustomerId::from_uuid),
            amount: row.amount,
            currency: row.currency,
            status: row
                .status
                .parse::<PaymentStatus>()
                .map_err(|_| corrupt("status", &row.status))?,
            method: row.method,
            details: row.details.0,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const PAYMENT_COLUMNS: &str = r#"
    id, razorpay_payment_id, razorpay_order_id, customer_id, amount, currency,
    status, method, details, created_at, updated_at
"#;

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn upsert(&self, payment: &Payment) -> Result<Payment, DomainError> {
        let row: PaymentRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO payments (
                id, razorpay_payment_id, razorpay_order_id, customer_id, amount, currency,
                status, status_rank, method, details, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (razorpay_payment_id) DO UPDATE SET
                status = CASE
                    WHEN EXCLUDED.status_rank >= payments.status_rank THEN EXCLUDED.status
                    ELSE payments.status
                END,
                status_rank = GREATEST(EXCLUDED.status_rank, payments.status_rank),
                amount = EXCLUDED.amount,
                currency = EXCLUDED.currency,
                razorpay_order_id = COALESCE(EXCLUDED.razorpay_order_id, payments.razorpay_order_id),
                customer_id = COALESCE(EXCLUDED.customer_id, payments.customer_id),
                method = COALESCE(EXCLUDED.method, payments.method),
                details = CASE
                    WHEN EXCLUDED.details = 'null'::jsonb THEN payments.details
                    ELSE EXCLUDED.details
                END,
                updated_at = EXCLUDED.updated_at
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(payment.id.as_uuid())
        .bind(&payment.razorpay_payment_id)
        .bind(&payment.razorpay_order_id)
        .bind(payment.customer_id.as_ref().map(CustomerId::as_uuid))
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.status.rank())
        .bind(&payment.method)
        .bind(Json(&payment.details))
        .bind(payment.created_at.as_datetime())
        .bind(payment.updated_at.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| read_error(e, "upsert payment"))?;

        Payment::try_from(row)
    }

    async fn find_by_razorpay_id(
        &self,
        razorpay_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE razorpay_payment_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(razorpay_payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error(e, "find payment"))?;

        row.map(Payment::try_from).transpose()
    }
}
