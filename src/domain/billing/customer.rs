//! Billing customer mirrored from the processor.

use crate::domain::foundation::{CustomerId, Timestamp, UserId, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A customer known to both the processor and the local store.
///
/// Identity fields are fixed at creation; only `notes` may change later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub razorpay_customer_id: String,
    pub name: String,
    pub email: Option<String>,
    pub contact: Option<String>,
    pub user_id: Option<UserId>,
    pub notes: BTreeMap<String, String>,
    pub created_at: Timestamp,
}

impl Customer {
    pub fn create(
        razorpay_customer_id: impl Into<String>,
        name: impl Into<String>,
        email: Option<String>,
        contact: Option<String>,
        user_id: Option<UserId>,
    ) -> Result<Self, ValidationError> {
        let razorpay_customer_id = razorpay_customer_id.into();
        if razorpay_customer_id.trim().is_empty() {
            return Err(ValidationError::empty_field("razorpay_customer_id"));
        }
        let email = email
            .map(|e| e.trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty());
        if let Some(email) = &email {
            validate_email(email)?;
        }

        Ok(Self {
            id: CustomerId::new(),
            razorpay_customer_id,
            name: name.into(),
            email,
            contact: contact.filter(|c| !c.trim().is_empty()),
            user_id,
            notes: BTreeMap::new(),
            created_at: Timestamp::now(),
        })
    }

    pub fn set_note(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.notes.insert(key.into(), value.into());
    }
}

/// Minimal shape check; the processor performs its own validation.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ValidationError::invalid_format("email", "expected local@domain")),
    }
}
