use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{Result, ServicingError};

/// one repayment period in an installment schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    /// 1-based period index
    pub period: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub principal_portion: Money,
    pub interest_portion: Money,
    /// balance left after this period
    pub remaining_principal: Money,
}

/// equal-installment amortization schedule
///
/// the split between interest and principal shifts over the term while the
/// payment amount stays constant; the running balance is kept at full
/// precision and rounded to cents only on the stored installments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallmentSchedule {
    pub principal: Money,
    pub annual_rate: Rate,
    pub term_months: u32,
    pub first_due: NaiveDate,
    pub payment_amount: Money,
    pub installments: Vec<ScheduledInstallment>,
    pub total_interest: Money,
    pub total_payment: Money,
}

impl InstallmentSchedule {
    /// generate the full schedule for a loan approved at `approved_at`
    pub fn generate(
        principal: Money,
        annual_rate: Rate,
        term_months: u32,
        approved_at: DateTime<Utc>,
    ) -> Result<Self> {
        if !principal.is_positive() {
            return Err(ServicingError::Validation {
                message: format!("principal must be positive, got {}", principal),
            });
        }
        if term_months == 0 {
            return Err(ServicingError::Validation {
                message: "term must be at least one month".to_string(),
            });
        }
        if annual_rate.as_decimal().is_sign_negative() {
            return Err(ServicingError::Validation {
                message: format!("annual rate must not be negative, got {}", annual_rate),
            });
        }

        let p = principal.as_decimal();
        let monthly_rate = annual_rate.monthly_rate().as_decimal();
        let payment = installment_amount(p, monthly_rate, term_months);
        let first_due = first_due_date(approved_at.date_naive())?;

        let mut installments = Vec::with_capacity(term_months as usize);
        let mut remaining = p;

        for period in 1..=term_months {
            let due_date = due_date_for(first_due, period)?;
            let interest = remaining * monthly_rate;

            // the final period takes the exact remaining balance so the
            // schedule closes at zero and principal portions sum to the
            // original amount
            let (principal_portion, amount) = if period == term_months {
                (remaining, remaining + interest)
            } else {
                (payment - interest, payment)
            };

            remaining = if period == term_months {
                Decimal::ZERO
            } else {
                remaining - principal_portion
            };

            installments.push(ScheduledInstallment {
                period,
                due_date,
                amount: Money::from_decimal(amount),
                principal_portion: Money::from_decimal(principal_portion),
                interest_portion: Money::from_decimal(interest),
                remaining_principal: Money::from_decimal(remaining.max(Decimal::ZERO)),
            });
        }

        let total_interest = installments
            .iter()
            .map(|i| i.interest_portion)
            .fold(Money::ZERO, |acc, x| acc + x);

        let total_payment = installments
            .iter()
            .map(|i| i.amount)
            .fold(Money::ZERO, |acc, x| acc + x);

        Ok(Self {
            principal,
            annual_rate,
            term_months,
            first_due,
            payment_amount: Money::from_decimal(payment),
            installments,
            total_interest,
            total_payment,
        })
    }

    /// get installment for a specific period
    pub fn installment(&self, period: u32) -> Option<&ScheduledInstallment> {
        self.installments.get(period.checked_sub(1)? as usize)
    }
}

/// equal installment amount: A = P * i * (1+i)^n / ((1+i)^n - 1)
///
/// the zero-rate case degenerates to P / n and must be branched explicitly
fn installment_amount(principal: Decimal, monthly_rate: Decimal, term_months: u32) -> Decimal {
    if monthly_rate.is_zero() {
        return principal / Decimal::from(term_months);
    }

    let mut compound = Decimal::ONE;
    let base = Decimal::ONE + monthly_rate;
    for _ in 0..term_months {
        compound *= base;
    }

    principal * monthly_rate * compound / (compound - Decimal::ONE)
}

/// first due date: the 1st of the next calendar month, or the approval
/// date itself when approval lands on the 1st
fn first_due_date(approved: NaiveDate) -> Result<NaiveDate> {
    if approved.day() == 1 {
        return Ok(approved);
    }
    approved
        .with_day(1)
        .and_then(|d| d.checked_add_months(Months::new(1)))
        .ok_or_else(|| ServicingError::InvalidConfiguration {
            message: format!("cannot derive first due date from {}", approved),
        })
}

/// due date for a 1-based period, monthly from the first due date
fn due_date_for(first_due: NaiveDate, period: u32) -> Result<NaiveDate> {
    first_due
        .checked_add_months(Months::new(period - 1))
        .ok_or_else(|| ServicingError::InvalidConfiguration {
            message: format!("due date overflow at period {}", period),
        })
}
