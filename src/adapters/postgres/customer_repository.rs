//! PostgreSQL implementation of CustomerRepository.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::Customer;
use crate::domain::foundation::{CustomerId, DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::CustomerRepository;

use super::{read_error, write_error};

pub struct PostgresCustomerRepository {
    pool: PgPool,
}

impl PostgresCustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    razorpay_customer_id: String,
    name: String,
    email: Option<String>,
    contact: Option<String>,
    user_id: Option<String>,
    notes: Json<BTreeMap<String, String>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = DomainError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        let user_id = row
            .user_id
            .map(UserId::new)
            .transpose()
            .map_err(|e| super::corrupt("user_id", e))?;

        Ok(Customer {
            id: CustomerId::from_uuid(row.id),
            razorpay_customer_id: row.razorpay_customer_id,
            name: row.name,
            email: row.email,
            contact: row.contact,
            user_id,
            notes: row.notes.0,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

const SELECT_CUSTOMER: &str = r#"
    SELECT id, razorpay_customer_id, name, email, contact, user_id, notes, created_at
    FROM customers
"#;

impl PostgresCustomerRepository {
    async fn find_one(&self, filter: &str, value: &str) -> Result<Option<Customer>, DomainError> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!("{} WHERE {} = $1", SELECT_CUSTOMER, filter))
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| read_error(e, "find customer"))?;

        row.map(Customer::try_from).transpose()
    }
}

#[async_trait]
impl CustomerRepository for PostgresCustomerRepository {
    async fn insert(&self, customer: &Customer) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO customers (
                id, razorpay_customer_id, name, email, contact, user_id, notes, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.razorpay_customer_id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.contact)
        .bind(customer.user_id.as_ref().map(UserId::as_str))
        .bind(Json(&customer.notes))
        .bind(customer.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            write_error(
                e,
                "save customer",
                &[
                    (
                        "customers_razorpay_customer_id_key",
                        "razorpay_customer_id",
                        customer.razorpay_customer_id.as_str(),
                    ),
                    (
                        "customers_email_key",
                        "email",
                        customer.email.as_deref().unwrap_or_default(),
                    ),
                ],
            )
        })?;

        Ok(())
    }

    async fn update_notes(&self, customer: &Customer) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE customers SET notes = $2 WHERE id = $1")
            .bind(customer.id.as_uuid())
            .bind(Json(&customer.notes))
            .execute(&self.pool)
            .await
            .map_err(|e| read_error(e, "update customer notes"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(ErrorCode::CustomerNotFound, "Customer not found"));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, DomainError> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT_CUSTOMER))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| read_error(e, "find customer"))?;

        row.map(Customer::try_from).transpose()
    }

    async fn find_by_razorpay_id(
        &self,
        razorpay_customer_id: &str,
    ) -> Result<Option<Customer>, DomainError> {
        self.find_one("razorpay_customer_id", razorpay_customer_id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, DomainError> {
        self.find_one("email", &email.trim().to_ascii_lowercase()).await
    }
}
