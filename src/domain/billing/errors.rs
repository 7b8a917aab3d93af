//! Billing error taxonomy.
//!
//! | Error | Raised when | Retried |
//! |-------|-------------|---------|
//! | Validation | required input missing or malformed | no |
//! | NotFound | foreign id unknown locally and at the processor | no |
//! | InvalidSignature | webhook digest mismatch | no |
//! | Processor | processor rejected a call | transport failures only |
//! | SubscriptionCreation | processor rejected subscription creation | no |
//! | PlanNotFound | processor does not know the plan | no |
//! | Persistence | store write or read failed | yes |
//! | InvalidEvent | webhook payload missing its entity | no |

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};

/// Category of a failed processor call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorErrorKind {
    BadRequest,
    NotFound,
    Authentication,
    RateLimited,
    Server,
    /// Timeout or connection failure. The call may or may not have landed.
    Network,
    /// Response body did not match the expected shape.
    InvalidResponse,
}

/// A rejected or failed call to the payment processor.
///
/// `code` and `description` carry the processor's own error envelope
/// verbatim when one was returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {description}")]
pub struct ProcessorError {
    pub kind: ProcessorErrorKind,
    pub code: String,
    pub description: String,
    pub field: Option<String>,
}

impl ProcessorError {
    pub fn new(
        kind: ProcessorErrorKind,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code: code.into(),
            description: description.into(),
            field: None,
        }
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::new(ProcessorErrorKind::NotFound, "BAD_REQUEST_ERROR", description)
    }

    pub fn network(description: impl Into<String>) -> Self {
        Self::new(ProcessorErrorKind::Network, "NETWORK_ERROR", description)
    }

    pub fn invalid_response(description: impl Into<String>) -> Self {
        Self::new(
            ProcessorErrorKind::InvalidResponse,
            "INVALID_RESPONSE",
            description,
        )
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ProcessorErrorKind::NotFound
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ProcessorErrorKind::Network | ProcessorErrorKind::RateLimited | ProcessorErrorKind::Server
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum BillingError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Webhook signature verification failed")]
    InvalidSignature,

    #[error("Processor error: {0}")]
    Processor(ProcessorError),

    #[error("Subscription creation rejected: {0}")]
    SubscriptionCreation(ProcessorError),

    #[error("Plan not found at processor: {plan_id}")]
    PlanNotFound {
        plan_id: String,
        source: ProcessorError,
    },

    #[error("Persistence failure: {0}")]
    Persistence(DomainError),

    #[error("Malformed event: {0}")]
    InvalidEvent(String),
}

impl BillingError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        BillingError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn missing(field: &'static str) -> Self {
        BillingError::Validation(ValidationError::empty_field(field))
    }

    /// Wraps a processor failure on a lookup. A processor 404 becomes
    /// `NotFound` so the caller sees an invalid id, not an outage.
    pub fn from_lookup(entity: &'static str, id: &str, err: ProcessorError) -> Self {
        if err.is_not_found() {
            BillingError::not_found(entity, id)
        } else {
            BillingError::Processor(err)
        }
    }

    /// Maps a rejected subscription creation. An unknown plan gets its own
    /// variant; everything else is surfaced verbatim.
    pub fn from_creation(plan_id: &str, err: ProcessorError) -> Self {
        let plan_rejected = err.field.as_deref() == Some("plan_id")
            || (err.is_not_found() && err.description.to_ascii_lowercase().contains("plan"));
        if plan_rejected {
            BillingError::PlanNotFound {
                plan_id: plan_id.to_string(),
                source: err,
            }
        } else {
            BillingError::SubscriptionCreation(err)
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            BillingError::Validation(_) => "VALIDATION_ERROR",
            BillingError::NotFound { .. } => "NOT_FOUND",
            BillingError::InvalidSignature => "INVALID_SIGNATURE",
            BillingError::Processor(_) => "PROCESSOR_ERROR",
            BillingError::SubscriptionCreation(_) => "SUBSCRIPTION_CREATION_FAILED",
            BillingError::PlanNotFound { .. } => "PLAN_NOT_FOUND",
            BillingError::Persistence(_) => "PERSISTENCE_ERROR",
            BillingError::InvalidEvent(_) => "INVALID_EVENT",
        }
    }

    /// Whether the same request could succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            BillingError::Processor(err) => err.is_retryable(),
            BillingError::Persistence(err) => err.code != ErrorCode::ValidationFailed,
            _ => false,
        }
    }

    /// The processor's own error code, when the failure came from it.
    pub fn processor_error(&self) -> Option<&ProcessorError> {
        match self {
            BillingError::Processor(err)
            | BillingError::SubscriptionCreation(err)
            | BillingError::PlanNotFound { source: err, .. } => Some(err),
            _ => None,
        }
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed | ErrorCode::InvalidStateTransition => {
                BillingError::Validation(ValidationError::invalid_format(
                    err.details.get("field").cloned().unwrap_or_default(),
                    err.message,
                ))
            }
            _ => BillingError::Persistence(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processor_404_on_lookup_becomes_not_found() {
        let err = BillingError::from_lookup(
            "plan",
            "plan_missing",
            ProcessorError::not_found("The id provided does not exist"),
        );
        assert!(matches!(err, BillingError::NotFound { entity: "plan", .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn transport_failure_on_lookup_stays_processor_error() {
        let err = BillingError::from_lookup("plan", "plan_1", ProcessorError::network("timed out"));
        assert!(matches!(err, BillingError::Processor(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn plan_field_rejection_maps_to_plan_not_found() {
        let rejection = ProcessorError::new(
            ProcessorErrorKind::BadRequest,
            "BAD_REQUEST_ERROR",
            "The id provided does not exist",
        )
        .with_field("plan_id");
        let err = BillingError::from_creation("plan_X", rejection);
        assert_eq!(err.code(), "PLAN_NOT_FOUND");
        assert_eq!(
            err.processor_error().map(|e| e.code.as_str()),
            Some("BAD_REQUEST_ERROR")
        );
    }

    #[test]
    fn other_creation_rejection_is_surfaced_verbatim() {
        let rejection = ProcessorError::new(
            ProcessorErrorKind::BadRequest,
            "BAD_REQUEST_ERROR",
            "expire_by must be in the future",
        );
        let err = BillingError::from_creation("plan_X", rejection);
        assert_eq!(
            err.to_string(),
            "Subscription creation rejected: BAD_REQUEST_ERROR: expire_by must be in the future"
        );
    }

    #[test]
    fn duplicate_key_is_a_retryable_persistence_error() {
        let err: BillingError = DomainError::duplicate("email", "a@x.com").into();
        assert_eq!(err.code(), "PERSISTENCE_ERROR");
        assert!(err.is_retryable());
    }
}
