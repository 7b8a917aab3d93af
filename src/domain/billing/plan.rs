//! Plans mirrored from the processor catalog.

use crate::domain::foundation::{PlanId, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Processor recurrence unit (`period` on a Razorpay plan).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Daily => "daily",
            BillingInterval::Weekly => "weekly",
            BillingInterval::Monthly => "monthly",
            BillingInterval::Yearly => "yearly",
        }
    }
}

impl FromStr for BillingInterval {
    type Err = ValidationError;

    /// Accepts both `month` and `monthly` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(BillingInterval::Daily),
            "week" | "weekly" => Ok(BillingInterval::Weekly),
            "month" | "monthly" => Ok(BillingInterval::Monthly),
            "year" | "yearly" => Ok(BillingInterval::Yearly),
            other => Err(ValidationError::invalid_format(
                "period",
                format!("unknown billing interval '{}'", other),
            )),
        }
    }
}

impl fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local classification of how often a plan bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingPeriod {
    /// `(month, 3)` is quarterly, any yearly plan is yearly, everything
    /// else (weekly and daily included) is monthly.
    pub fn classify(interval: BillingInterval, interval_count: u32) -> Self {
        match (interval, interval_count) {
            (BillingInterval::Monthly, 3) => BillingPeriod::Quarterly,
            (BillingInterval::Yearly, _) => BillingPeriod::Yearly,
            _ => BillingPeriod::Monthly,
        }
    }

    /// Cycles billed when the caller does not say.
    pub fn default_total_count(&self) -> u32 {
        match self {
            BillingPeriod::Yearly => 1,
            BillingPeriod::Quarterly => 4,
            BillingPeriod::Monthly => 12,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Quarterly => "quarterly",
            BillingPeriod::Yearly => "yearly",
        }
    }
}

impl FromStr for BillingPeriod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingPeriod::Monthly),
            "quarterly" => Ok(BillingPeriod::Quarterly),
            "yearly" => Ok(BillingPeriod::Yearly),
            other => Err(ValidationError::invalid_format(
                "billing_period",
                format!("unknown billing period '{}'", other),
            )),
        }
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Length of one billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleLength {
    Days(i64),
    Months(u32),
}

impl CycleLength {
    /// Advances `from` by `cycles` whole cycles. Fails when the result
    /// leaves the representable calendar.
    pub fn advance(&self, from: Timestamp, cycles: u32) -> Result<Timestamp, ValidationError> {
        let advanced = match *self {
            CycleLength::Days(days) => days
                .checked_mul(i64::from(cycles))
                .and_then(|total| from.checked_add_days(total)),
            CycleLength::Months(months) => months
                .checked_mul(cycles)
                .and_then(|total| from.checked_add_months(total)),
        };
        advanced.ok_or_else(|| {
            ValidationError::invalid_format(
                "total_count",
                format!("{} cycles of {:?} overflow the calendar", cycles, self),
            )
        })
    }
}

/// Plan aggregate.
///
/// `amount` is held in minor currency units (paise), exactly as the
/// processor reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub razorpay_plan_id: String,
    pub name: String,
    pub description: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub interval_count: u32,
    pub billing_period: BillingPeriod,
    pub features: Vec<String>,
    pub is_active: bool,
    pub created_at: Timestamp,
}

/// Fields needed to mirror a processor plan locally.
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub razorpay_plan_id: String,
    pub name: String,
    pub description: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub interval_count: u32,
}

impl Plan {
    pub fn create(new: NewPlan) -> Result<Self, ValidationError> {
        if new.razorpay_plan_id.trim().is_empty() {
            return Err(ValidationError::empty_field("razorpay_plan_id"));
        }
        if new.amount < 0 {
            return Err(ValidationError::out_of_range("amount", 0, i64::MAX, new.amount));
        }
        if new.interval_count == 0 {
            return Err(ValidationError::out_of_range("interval_count", 1, 366, 0));
        }
        let name = if new.name.trim().is_empty() {
            new.razorpay_plan_id.clone()
        } else {
            new.name
        };

        Ok(Self {
            id: PlanId::new(),
            billing_period: BillingPeriod::classify(new.interval, new.interval_count),
            razorpay_plan_id: new.razorpay_plan_id,
            name,
            description: new.description,
            amount: new.amount,
            currency: new.currency,
            interval: new.interval,
            interval_count: new.interval_count,
            features: Vec::new(),
            is_active: true,
            created_at: Timestamp::now(),
        })
    }

    /// Amount in major units, for display.
    pub fn amount_major(&self) -> f64 {
        self.amount as f64 / 100.0
    }

    pub fn cycle_length(&self) -> CycleLength {
        let count = self.interval_count;
        match self.interval {
            BillingInterval::Daily => CycleLength::Days(i64::from(count)),
            BillingInterval::Weekly => CycleLength::Days(7 * i64::from(count)),
            BillingInterval::Monthly => CycleLength::Months(count),
            // Saturated lengths can never advance successfully.
            BillingInterval::Yearly => CycleLength::Months(count.saturating_mul(12)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_plan(interval: BillingInterval, count: u32) -> NewPlan {
        NewPlan {
            razorpay_plan_id: "plan_Q1".to_string(),
            name: "Quarterly Pro".to_string(),
            description: None,
            amount: 149_900,
            currency: "INR".to_string(),
            interval,
            interval_count: count,
        }
    }

    #[test]
    fn classification_follows_period_and_interval() {
        use BillingInterval::*;
        assert_eq!(BillingPeriod::classify(Monthly, 3), BillingPeriod::Quarterly);
        assert_eq!(BillingPeriod::classify(Monthly, 1), BillingPeriod::Monthly);
        assert_eq!(BillingPeriod::classify(Monthly, 6), BillingPeriod::Monthly);
        assert_eq!(BillingPeriod::classify(Yearly, 1), BillingPeriod::Yearly);
        assert_eq!(BillingPeriod::classify(Yearly, 2), BillingPeriod::Yearly);
        assert_eq!(BillingPeriod::classify(Weekly, 3), BillingPeriod::Monthly);
    }

    #[test]
    fn default_counts_cover_a_year() {
        assert_eq!(BillingPeriod::Yearly.default_total_count(), 1);
        assert_eq!(BillingPeriod::Quarterly.default_total_count(), 4);
        assert_eq!(BillingPeriod::Monthly.default_total_count(), 12);
    }

    #[test]
    fn interval_accepts_short_spelling() {
        assert_eq!("month".parse::<BillingInterval>().unwrap(), BillingInterval::Monthly);
        assert_eq!("yearly".parse::<BillingInterval>().unwrap(), BillingInterval::Yearly);
        assert!("fortnightly".parse::<BillingInterval>().is_err());
    }

    #[test]
    fn create_derives_billing_period() {
        let plan = Plan::create(new_plan(BillingInterval::Monthly, 3)).unwrap();
        assert_eq!(plan.billing_period, BillingPeriod::Quarterly);
        assert_eq!(plan.cycle_length(), CycleLength::Months(3));
        assert!(plan.is_active);
        assert_eq!(plan.amount_major(), 1499.0);
    }

    #[test]
    fn create_rejects_zero_interval() {
        assert!(Plan::create(new_plan(BillingInterval::Monthly, 0)).is_err());
    }

    #[test]
    fn blank_name_falls_back_to_processor_id() {
        let mut new = new_plan(BillingInterval::Yearly, 1);
        new.name = " ".to_string();
        let plan = Plan::create(new).unwrap();
        assert_eq!(plan.name, "plan_Q1");
        assert_eq!(plan.cycle_length(), CycleLength::Months(12));
    }

    #[test]
    fn weekly_cycle_counts_days() {
        let plan = Plan::create(new_plan(BillingInterval::Weekly, 2)).unwrap();
        let start = Timestamp::from_unix_secs(1_700_000_000).unwrap();
        assert_eq!(
            plan.cycle_length().advance(start, 3).unwrap(),
            start.checked_add_days(42).unwrap()
        );
    }

    #[test]
    fn huge_yearly_interval_fails_to_advance_instead_of_wrapping() {
        let plan = Plan::create(new_plan(BillingInterval::Yearly, u32::MAX)).unwrap();
        assert_eq!(plan.cycle_length(), CycleLength::Months(u32::MAX));
        let start = Timestamp::from_unix_secs(1_700_000_000).unwrap();
        assert!(plan.cycle_length().advance(start, 1).is_err());
    }
}
