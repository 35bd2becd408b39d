use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::decimal::{Money, Rate};
use crate::errors::{Result, ServicingError};

/// tiered rate policy: base rate plus amount and term surcharges, clamped
///
/// a pure function of (amount, term); the rate computed at submission is
/// stored on the application and reused unchanged at approval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatePolicy {
    pub base_rate: Rate,
    /// (inclusive upper bound, surcharge) bands, ascending
    pub amount_tiers: Vec<(Money, Rate)>,
    /// surcharge above the last amount band
    pub amount_overflow: Rate,
    /// (inclusive upper bound in months, surcharge) bands, ascending
    pub term_tiers: Vec<(u32, Rate)>,
    /// surcharge above the last term band
    pub term_overflow: Rate,
    pub floor: Rate,
    pub cap: Rate,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            base_rate: Rate::from_percentage(5),
            amount_tiers: vec![
                (Money::from_major(50_000), Rate::ZERO),
                (Money::from_major(100_000), Rate::from_percentage(1)),
                (Money::from_major(200_000), Rate::from_percentage(2)),
            ],
            amount_overflow: Rate::from_percentage(3),
            term_tiers: vec![
                (12, Rate::ZERO),
                (24, Rate::from_percentage(1)),
                (36, Rate::from_percentage(2)),
            ],
            term_overflow: Rate::from_percentage(3),
            floor: Rate::from_percentage(5),
            cap: Rate::from_percentage(15),
        }
    }
}

impl RatePolicy {
    /// annual rate for the given amount and term
    pub fn rate_for(&self, amount: Money, term_months: u32) -> Rate {
        let amount_surcharge = self
            .amount_tiers
            .iter()
            .find(|(bound, _)| amount <= *bound)
            .map(|(_, surcharge)| *surcharge)
            .unwrap_or(self.amount_overflow);

        let term_surcharge = self
            .term_tiers
            .iter()
            .find(|(bound, _)| term_months <= *bound)
            .map(|(_, surcharge)| *surcharge)
            .unwrap_or(self.term_overflow);

        let rate = Rate::from_decimal(
            self.base_rate.as_decimal()
                + amount_surcharge.as_decimal()
                + term_surcharge.as_decimal(),
        );

        rate.clamp(self.floor, self.cap)
    }
}

/// late fee policy: daily rate applied to the bill amount per overdue day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LateFeePolicy {
    pub daily_rate: Decimal,
}

impl Default for LateFeePolicy {
    fn default() -> Self {
        // 0.05% per day
        Self { daily_rate: dec!(0.0005) }
    }
}

impl LateFeePolicy {
    /// fee owed for a bill overdue by the given number of days
    pub fn fee(&self, amount: Money, days_overdue: u32) -> Money {
        Money::from_decimal(amount.as_decimal() * self.daily_rate * Decimal::from(days_overdue))
    }
}

/// scan loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPolicy {
    /// tick period of the background loop
    pub interval: Duration,
    /// reminders fire for pending bills due within this many days
    pub reminder_lookahead_days: u32,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            reminder_lookahead_days: 3,
        }
    }
}

/// sanity bounds applied at submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationLimits {
    pub min_amount: Money,
    pub max_amount: Money,
    pub min_term_months: u32,
    pub max_term_months: u32,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            min_amount: Money::from_major(1_000),
            max_amount: Money::from_major(1_000_000),
            min_term_months: 1,
            max_term_months: 60,
        }
    }
}

impl ValidationLimits {
    pub fn validate(&self, amount: Money, term_months: u32) -> Result<()> {
        if amount < self.min_amount || amount > self.max_amount {
            return Err(ServicingError::Validation {
                message: format!(
                    "loan amount {} outside allowed range [{}, {}]",
                    amount, self.min_amount, self.max_amount
                ),
            });
        }
        if term_months < self.min_term_months || term_months > self.max_term_months {
            return Err(ServicingError::Validation {
                message: format!(
                    "loan term {} months outside allowed range [{}, {}]",
                    term_months, self.min_term_months, self.max_term_months
                ),
            });
        }
        Ok(())
    }
}

/// servicing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicingConfig {
    pub rate_policy: RatePolicy,
    pub late_fee: LateFeePolicy,
    pub scan: ScanPolicy,
    pub limits: ValidationLimits,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_policy_tiers() {
        let policy = RatePolicy::default();

        // 120k amount lands in the 2% band, 24 months in the 1% band
        assert_eq!(
            policy.rate_for(Money::from_major(120_000), 24),
            Rate::from_percentage(8)
        );

        // smallest bands add nothing
        assert_eq!(
            policy.rate_for(Money::from_major(50_000), 3),
            Rate::from_percentage(5)
        );

        // both overflow bands
        assert_eq!(
            policy.rate_for(Money::from_major(500_000), 48),
            Rate::from_percentage(11)
        );
    }

    #[test]
    fn test_rate_policy_is_deterministic() {
        let policy = RatePolicy::default();
        let a = policy.rate_for(Money::from_major(87_500), 30);
        let b = policy.rate_for(Money::from_major(87_500), 30);
        assert_eq!(a, b);
    }

    #[test]
    fn test_rate_policy_cap() {
        let policy = RatePolicy {
            base_rate: Rate::from_percentage(10),
            ..RatePolicy::default()
        };
        // 10% + 3% + 3% would be 16%, capped at 15%
        assert_eq!(
            policy.rate_for(Money::from_major(500_000), 48),
            Rate::from_percentage(15)
        );
    }

    #[test]
    fn test_late_fee() {
        let policy = LateFeePolicy::default();
        // 10000 * 0.0005 * 4 days = 20.00
        assert_eq!(
            policy.fee(Money::from_major(10_000), 4),
            Money::from_major(20)
        );
        assert_eq!(policy.fee(Money::from_major(10_000), 0), Money::ZERO);
    }

    #[test]
    fn test_validation_limits() {
        let limits = ValidationLimits::default();
        assert!(limits.validate(Money::from_major(50_000), 12).is_ok());
        assert!(limits.validate(Money::from_major(500), 12).is_err());
        assert!(limits.validate(Money::from_major(2_000_000), 12).is_err());
        assert!(limits.validate(Money::from_major(50_000), 0).is_err());
        assert!(limits.validate(Money::from_major(50_000), 72).is_err());
    }
}
