//! Subscription aggregate.
//!
//! One record per billing cycle chain: a renewal is a new record, never a
//! resurrection of a finished one. Processor events mutate the record through
//! the methods below, each of which appends to the embedded audit trail.
//!
//! # Invariants
//!
//! - `razorpay_subscription_id` is unique across the store
//! - `paid_count` never decreases
//! - `subscription_start_date <= subscription_end_date`
//! - `audit` is append-only
//! - writes are optimistic on `version`: a read-modify-write that lost a race
//!   is re-applied to the fresh record, never written over it

use crate::domain::foundation::{
    CustomerId, PlanId, StateMachine, SubscriptionId, Timestamp, ValidationError,
};
use serde::{Deserialize, Serialize};

use super::audit::{Actor, AuditEvent, AuditKind};
use super::plan::BillingPeriod;
use super::status::SubscriptionStatus;

/// Addon charged once on the next invoice of the subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addon {
    pub razorpay_addon_id: String,
    pub name: String,
    /// Minor units.
    pub amount: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    Percentage,
    Fixed,
}

/// Discount applied out of band by an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub amount: i64,
    pub kind: DiscountKind,
    pub applied_by: Option<String>,
    pub applied_at: Timestamp,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub razorpay_subscription_id: String,
    pub customer_id: CustomerId,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,

    /// Locally computed cycle boundaries.
    pub subscription_start_date: Timestamp,
    pub subscription_end_date: Timestamp,

    /// Processor-mirrored schedule fields.
    pub start_at: Option<Timestamp>,
    pub charge_at: Option<Timestamp>,
    pub current_start: Option<Timestamp>,
    pub current_end: Option<Timestamp>,

    pub total_count: u32,
    pub paid_count: u32,
    pub billing_period: BillingPeriod,

    /// Waiting for the processor to confirm authentication.
    pub pending_activation: bool,
    pub is_renewal: bool,
    /// Start deferred to `start_at` by the processor.
    pub is_scheduled: bool,

    /// Hosted authentication link returned on creation.
    pub short_url: Option<String>,

    pub addons: Vec<Addon>,
    pub discount: Option<Discount>,
    pub audit: Vec<AuditEvent>,

    /// `created_at` of the most recent processor event applied.
    pub last_event_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Bumped by the store on every successful update. An update carrying a
    /// stale version is rejected with `ConcurrencyConflict`.
    pub version: i64,
}

/// Input for a locally created or self-healed subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub razorpay_subscription_id: String,
    pub customer_id: CustomerId,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    pub start_at: Option<Timestamp>,
    pub charge_at: Option<Timestamp>,
    pub total_count: u32,
    pub paid_count: u32,
    pub billing_period: BillingPeriod,
    pub is_renewal: bool,
    pub short_url: Option<String>,
}

/// Result of applying a processor-stated status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Unchanged,
    Changed {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
        /// `from` was terminal.
        regression: bool,
    },
}

impl StatusChange {
    pub fn is_changed(&self) -> bool {
        matches!(self, StatusChange::Changed { .. })
    }
}

impl Subscription {
    pub fn create(new: NewSubscription, actor: Actor) -> Result<Self, ValidationError> {
        if new.razorpay_subscription_id.trim().is_empty() {
            return Err(ValidationError::empty_field("razorpay_subscription_id"));
        }
        if new.total_count == 0 {
            return Err(ValidationError::out_of_range("total_count", 1, i64::from(u32::MAX), 0));
        }
        if new.end_date.is_before(&new.start_date) {
            return Err(ValidationError::invalid_format(
                "subscription_end_date",
                "ends before it starts",
            ));
        }

        let now = Timestamp::now();
        let created = AuditEvent::new(AuditKind::Created, actor).with_change("none", new.status);
        Ok(Self {
            id: SubscriptionId::new(),
            razorpay_subscription_id: new.razorpay_subscription_id,
            customer_id: new.customer_id,
            plan_id: new.plan_id,
            status: new.status,
            subscription_start_date: new.start_date,
            subscription_end_date: new.end_date,
            is_scheduled: new.start_at.is_some(),
            start_at: new.start_at,
            charge_at: new.charge_at,
            current_start: None,
            current_end: None,
            total_count: new.total_count,
            paid_count: new.paid_count,
            billing_period: new.billing_period,
            pending_activation: !new.status.is_confirmed() && !new.status.is_terminal(),
            is_renewal: new.is_renewal,
            short_url: new.short_url,
            addons: Vec::new(),
            discount: None,
            audit: vec![created],
            last_event_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Sets the status the processor reports. Never rejects: a move out of a
    /// terminal status is applied and flagged as a regression.
    pub fn apply_status(
        &mut self,
        status: SubscriptionStatus,
        actor: Actor,
        event: Option<&str>,
    ) -> StatusChange {
        if self.status == status {
            return StatusChange::Unchanged;
        }
        let from = self.status;
        let regression = from.is_terminal();

        let mut entry = AuditEvent::new(AuditKind::StatusChanged, actor).with_change(from, status);
        if let Some(event) = event {
            entry = entry.with_event(event);
        }
        if regression {
            entry = entry.flag_regression();
        }

        self.status = status;
        if status.is_confirmed() || status.is_terminal() {
            self.pending_activation = false;
        }
        self.push_audit(entry);

        StatusChange::Changed {
            from,
            to: status,
            regression,
        }
    }

    /// Mirrors processor counters and schedule. `paid_count` only rises.
    /// Returns whether anything changed.
    pub fn sync_counters(&mut self, counters: CycleCounters, actor: Actor) -> bool {
        let before = (self.paid_count, self.charge_at, self.current_start, self.current_end);

        self.paid_count = self.paid_count.max(counters.paid_count);
        if counters.charge_at.is_some() {
            self.charge_at = counters.charge_at;
        }
        if counters.current_start.is_some() {
            self.current_start = counters.current_start;
        }
        if counters.current_end.is_some() {
            self.current_end = counters.current_end;
        }

        let after = (self.paid_count, self.charge_at, self.current_start, self.current_end);
        if before == after {
            return false;
        }
        self.push_audit(
            AuditEvent::new(AuditKind::CountersSynced, actor)
                .with_change(format!("paid={}", before.0), format!("paid={}", after.0)),
        );
        true
    }

    pub fn attach_addon(&mut self, addon: Addon, actor: Actor) {
        let mut entry = AuditEvent::new(AuditKind::AddonAttached, actor);
        entry.after = Some(format!("{} x{}", addon.razorpay_addon_id, addon.quantity));
        self.addons.push(addon);
        self.push_audit(entry);
    }

    pub fn observe_invoice(&mut self, event: &str, invoice_status: Option<&str>) {
        let mut entry = AuditEvent::new(AuditKind::InvoiceObserved, Actor::Webhook).with_event(event);
        entry.after = invoice_status.map(str::to_string);
        self.push_audit(entry);
    }

    pub fn mark_checked(&mut self, processor_status: SubscriptionStatus) {
        self.push_audit(
            AuditEvent::new(AuditKind::ManuallyChecked, Actor::ManualCheck)
                .with_change(self.status, processor_status),
        );
    }

    /// True when an event created at `occurred_at` predates one already applied.
    pub fn is_stale(&self, occurred_at: Timestamp) -> bool {
        self.last_event_at
            .map(|last| occurred_at.is_before(&last))
            .unwrap_or(false)
    }

    pub fn record_event_time(&mut self, occurred_at: Timestamp) {
        if self.last_event_at.map_or(true, |last| occurred_at.is_after(&last)) {
            self.last_event_at = Some(occurred_at);
        }
    }

    /// Still billing and not past its locally computed end.
    pub fn is_renewable_at(&self, now: Timestamp) -> bool {
        self.status == SubscriptionStatus::Active && !self.subscription_end_date.is_before(&now)
    }

    fn push_audit(&mut self, entry: AuditEvent) {
        self.updated_at = entry.at;
        self.audit.push(entry);
    }
}

/// Counter and schedule fields carried by a processor subscription entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleCounters {
    pub paid_count: u32,
    pub charge_at: Option<Timestamp>,
    pub current_start: Option<Timestamp>,
    pub current_end: Option<Timestamp>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn new_subscription(status: SubscriptionStatus) -> Subscription {
        let start = Timestamp::now();
        Subscription::create(
            NewSubscription {
                razorpay_subscription_id: "sub_TEST".to_string(),
                customer_id: CustomerId::new(),
                plan_id: PlanId::new(),
                status,
                start_date: start,
                end_date: start.checked_add_months(9).unwrap(),
                start_at: None,
                charge_at: None,
                total_count: 4,
                paid_count: 0,
                billing_period: BillingPeriod::Quarterly,
                is_renewal: false,
                short_url: None,
            },
            Actor::Api,
        )
        .unwrap()
    }
}
