//! Billing-cycle date policy for new and renewing subscriptions.

use crate::domain::foundation::{Timestamp, ValidationError};

use super::plan::Plan;
use super::subscription::Subscription;

/// Upper bound on billing cycles per subscription.
pub const MAX_TOTAL_COUNT: u32 = 1000;

/// Dates and processor parameters for one subscription cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSchedule {
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    /// Deferred start sent to the processor. Only set for renewals.
    pub start_at: Option<Timestamp>,
    /// Processor cancels the subscription if not authenticated by then.
    pub expire_by: Timestamp,
    pub total_count: u32,
    pub is_renewal: bool,
}

/// Computes the schedule for a subscription on `plan`.
///
/// `current` is the pair's existing active subscription, if any. When it has
/// not yet ended the new cycle is a renewal starting at 00:00 UTC on the day
/// after its end date. Otherwise the cycle starts at `now`.
///
/// The end date is the date of the final scheduled charge:
/// `start + cycle * max(total_count - 1, 1)`.
pub fn plan_cycle(
    plan: &Plan,
    requested_total_count: Option<u32>,
    current: Option<&Subscription>,
    now: Timestamp,
    authentication_window_days: i64,
) -> Result<CycleSchedule, ValidationError> {
    let total_count = match requested_total_count {
        Some(count) => checked_total_count(count)?,
        None => plan.billing_period.default_total_count(),
    };

    let window_end = now
        .checked_add_days(authentication_window_days)
        .ok_or_else(|| {
            ValidationError::out_of_range(
                "authentication_window_days",
                0,
                i64::from(u32::MAX),
                authentication_window_days,
            )
        })?;
    let renewal_of = current.filter(|sub| sub.is_renewable_at(now));

    let (start_date, start_at, expire_by) = match renewal_of {
        Some(existing) => {
            let start = existing
                .subscription_end_date
                .checked_add_days(1)
                .ok_or_else(|| {
                    ValidationError::invalid_format(
                        "subscription_end_date",
                        "renewal would start outside the calendar",
                    )
                })?
                .start_of_day();
            // One day back from a valid midnight always exists.
            let last_chance = start.checked_add_days(-1).unwrap_or(start);
            (start, Some(start), window_end.earliest(last_chance))
        }
        None => (now, None, window_end),
    };

    let end_date = cycle_end(plan, start_date, total_count)?;

    Ok(CycleSchedule {
        start_date,
        end_date,
        start_at,
        expire_by,
        total_count,
        is_renewal: renewal_of.is_some(),
    })
}

/// Date of the final scheduled charge for `total_count` cycles from `start`.
/// A single-cycle subscription covers one full cycle.
pub fn cycle_end(
    plan: &Plan,
    start: Timestamp,
    total_count: u32,
) -> Result<Timestamp, ValidationError> {
    let total_count = checked_total_count(total_count)?;
    plan.cycle_length()
        .advance(start, total_count.saturating_sub(1).max(1))
}

fn checked_total_count(count: u32) -> Result<u32, ValidationError> {
    if (1..=MAX_TOTAL_COUNT).contains(&count) {
        Ok(count)
    } else {
        Err(ValidationError::out_of_range(
            "total_count",
            1,
            i64::from(MAX_TOTAL_COUNT),
            i64::from(count),
        ))
    }
}
