//! Append-only audit trail embedded in a subscription.

use crate::domain::foundation::Timestamp;
use serde::{Deserialize, Serialize};

/// Who caused a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// Synchronous API call from a client.
    Api,
    /// Verified processor webhook.
    Webhook,
    /// Poll of the processor requested by a client.
    ManualCheck,
    /// Record materialized from an event for an unknown subscription.
    SelfHeal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Created,
    StatusChanged,
    CountersSynced,
    AddonAttached,
    InvoiceObserved,
    ManuallyChecked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub at: Timestamp,
    pub actor: Actor,
    /// Processor event name, when the change came from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    /// Set when a processor event moved the record out of a terminal status.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub regression: bool,
}

impl AuditEvent {
    pub fn new(kind: AuditKind, actor: Actor) -> Self {
        Self {
            kind,
            at: Timestamp::now(),
            actor,
            event: None,
            before: None,
            after: None,
            regression: false,
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_change(mut self, before: impl ToString, after: impl ToString) -> Self {
        self.before = Some(before.to_string());
        self.after = Some(after.to_string());
        self
    }

    pub fn flag_regression(mut self) -> Self {
        self.regression = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_omits_empty_fields() {
        let event = AuditEvent::new(AuditKind::Created, Actor::Api);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "created");
        assert_eq!(json["actor"], "api");
        assert!(json.get("before").is_none());
        assert!(json.get("regression").is_none());
    }

    #[test]
    fn builder_records_change_and_regression() {
        let event = AuditEvent::new(AuditKind::StatusChanged, Actor::Webhook)
            .with_event("subscription.activated")
            .with_change("completed", "active")
            .flag_regression();
        assert_eq!(event.before.as_deref(), Some("completed"));
        assert_eq!(event.after.as_deref(), Some("active"));
        assert!(event.regression);

        let back: AuditEvent =
            serde_json::from_value(serde_json::to_value(&event).unwrap()).unwrap();
        assert_eq!(back, event);
    }
}
