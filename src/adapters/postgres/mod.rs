//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresCustomerRepository`
//! - `PostgresPlanRepository`
//! - `PostgresSubscriptionRepository` - addons, discount and audit trail as JSONB
//! - `PostgresPaymentRepository` - atomic upsert on the processor payment id
//!
//! Schema lives in `migrations/`. Unique constraints on processor ids surface
//! as `ErrorCode::DuplicateKey`.

mod customer_repository;
mod payment_repository;
mod plan_repository;
mod subscription_repository;

pub use customer_repository::PostgresCustomerRepository;
pub use payment_repository::PostgresPaymentRepository;
pub use plan_repository::PostgresPlanRepository;
pub use subscription_repository::PostgresSubscriptionRepository;

use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Applies the embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// Maps a failed write. A violation of one of `unique` (constraint, column,
/// value) becomes `DuplicateKey`; everything else is a database error.
fn write_error(err: sqlx::Error, action: &str, unique: &[(&str, &str, &str)]) -> DomainError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(constraint) = db_err.constraint() {
            if let Some((_, column, value)) = unique.iter().find(|(name, _, _)| *name == constraint) {
                return DomainError::duplicate(column, *value);
            }
        }
    }
    DomainError::database(format!("Failed to {}: {}", action, err))
}

fn read_error(err: sqlx::Error, action: &str) -> DomainError {
    DomainError::database(format!("Failed to {}: {}", action, err))
}

fn corrupt(column: &str, value: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value: {}", column, value),
    )
}

fn to_count(column: &str, value: i32) -> Result<u32, DomainError> {
    u32::try_from(value).map_err(|_| corrupt(column, value))
}

fn from_count(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
