//! Razorpay webhook envelope.
//!
//! `{ "event": "...", "payload": { "<kind>": { "entity": { ... } } }, "created_at": ... }`
//!
//! Entities are kept as raw JSON here and deserialized into the processor
//! port's typed shapes by the reconciler.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessorEvent {
    /// Event name, e.g. `subscription.activated`.
    pub event: String,

    #[serde(default)]
    pub account_id: Option<String>,

    /// Entity kinds present in `payload`.
    #[serde(default)]
    pub contains: Vec<String>,

    #[serde(default)]
    pub payload: EventPayload,

    /// Unix seconds.
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<EntityWrapper>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<EntityWrapper>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<EntityWrapper>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice: Option<EntityWrapper>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntityWrapper {
    pub entity: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Payment,
    Subscription,
    Order,
    Invoice,
}

/// Reconciler dispatch target for an event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PaymentStatus,
    SubscriptionStatus,
    SubscriptionCharged,
    OrderPaid,
    InvoiceStatus,
    Unknown,
}

impl EventKind {
    pub fn classify(event: &str) -> Self {
        match event {
            "subscription.charged" => EventKind::SubscriptionCharged,
            "order.paid" => EventKind::OrderPaid,
            e if e.starts_with("payment.") => EventKind::PaymentStatus,
            e if e.starts_with("subscription.") => EventKind::SubscriptionStatus,
            e if e.starts_with("invoice.") => EventKind::InvoiceStatus,
            _ => EventKind::Unknown,
        }
    }
}

impl ProcessorEvent {
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    pub fn kind(&self) -> EventKind {
        EventKind::classify(&self.event)
    }

    pub fn occurred_at(&self) -> Option<Timestamp> {
        self.created_at.and_then(Timestamp::from_unix_secs)
    }

    pub fn raw_entity(&self, kind: EntityKind) -> Option<&serde_json::Value> {
        let wrapper = match kind {
            EntityKind::Payment => &self.payload.payment,
            EntityKind::Subscription => &self.payload.subscription,
            EntityKind::Order => &self.payload.order,
            EntityKind::Invoice => &self.payload.invoice,
        };
        wrapper.as_ref().map(|w| &w.entity)
    }

    /// Deserializes the entity of `kind`, `Ok(None)` when absent.
    pub fn entity<T: DeserializeOwned>(&self, kind: EntityKind) -> Result<Option<T>, serde_json::Error> {
        self.raw_entity(kind)
            .map(|value| T::deserialize(value))
            .transpose()
    }
}
