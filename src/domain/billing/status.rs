//! Subscription status state machine.
//!
//! Mirrors the processor's subscription lifecycle. The table below governs
//! locally-initiated changes; processor events are applied as stated by the
//! reconciler, which uses the table only to flag regressions.

use crate::domain::foundation::{StateMachine, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Created at the processor, awaiting customer authentication.
    Created,

    /// A charge attempt failed and the processor is retrying.
    Pending,

    /// Mandate authenticated, first charge not yet taken.
    Authenticated,

    Active,

    Paused,

    /// Retries exhausted.
    Halted,

    Cancelled,

    /// All billing cycles charged.
    Completed,

    /// Authentication window lapsed before the first charge.
    Expired,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 9] = [
        SubscriptionStatus::Created,
        SubscriptionStatus::Pending,
        SubscriptionStatus::Authenticated,
        SubscriptionStatus::Active,
        SubscriptionStatus::Paused,
        SubscriptionStatus::Halted,
        SubscriptionStatus::Cancelled,
        SubscriptionStatus::Completed,
        SubscriptionStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Created => "created",
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Authenticated => "authenticated",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Halted => "halted",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Completed => "completed",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// Status implied by a webhook event name, used when the entity itself
    /// carries no status. `subscription.ended` is folded into `completed`.
    pub fn from_event_name(event: &str) -> Option<Self> {
        let status = match event {
            "subscription.authenticated" => SubscriptionStatus::Authenticated,
            "subscription.activated" | "subscription.charged" | "subscription.resumed" => {
                SubscriptionStatus::Active
            }
            "subscription.pending" => SubscriptionStatus::Pending,
            "subscription.paused" => SubscriptionStatus::Paused,
            "subscription.halted" => SubscriptionStatus::Halted,
            "subscription.cancelled" => SubscriptionStatus::Cancelled,
            "subscription.completed" | "subscription.ended" => SubscriptionStatus::Completed,
            "subscription.expired" => SubscriptionStatus::Expired,
            _ => return None,
        };
        Some(status)
    }

    /// Activation has been confirmed by the processor.
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Authenticated | SubscriptionStatus::Active
        )
    }
}

impl StateMachine for SubscriptionStatus {
    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Created => vec![Authenticated, Active, Pending, Cancelled, Expired],
            Pending => vec![Active, Halted, Cancelled],
            Authenticated => vec![Active, Pending, Halted, Cancelled, Completed],
            // Active -> Active is a renewal charge
            Active => vec![Active, Pending, Paused, Halted, Cancelled, Completed, Expired],
            Paused => vec![Active, Cancelled],
            Halted | Cancelled | Completed | Expired => vec![],
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| {
                ValidationError::invalid_format("status", format!("unknown status '{}'", s))
            })
    }
}
