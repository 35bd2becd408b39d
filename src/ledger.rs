use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amortization::{InstallmentSchedule, ScheduledInstallment};
use crate::config::LateFeePolicy;
use crate::decimal::Money;
use crate::types::{BillId, BillStatus, LoanId, RepaymentStatus};

/// one repayment period bill
///
/// created in a single batch at approval, mutated only by payment
/// application or the overdue scan, never deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: BillId,
    pub loan_id: LoanId,
    /// 1-based period, unique per loan
    pub period: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub principal: Money,
    pub interest: Money,
    pub remaining_principal: Money,
    pub status: BillStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Bill {
    fn from_installment(
        loan_id: LoanId,
        installment: &ScheduledInstallment,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            period: installment.period,
            due_date: installment.due_date,
            amount: installment.amount,
            principal: installment.principal_portion,
            interest: installment.interest_portion,
            remaining_principal: installment.remaining_principal,
            status: BillStatus::Pending,
            created_at: now,
            paid_at: None,
        }
    }

    /// whole days past the due date, zero if not yet due
    pub fn days_overdue(&self, today: NaiveDate) -> u32 {
        (today - self.due_date).num_days().max(0) as u32
    }
}

/// materialize the bill batch for a newly approved loan
pub fn materialize_bills(
    loan_id: LoanId,
    schedule: &InstallmentSchedule,
    now: DateTime<Utc>,
) -> Vec<Bill> {
    schedule
        .installments
        .iter()
        .map(|installment| Bill::from_installment(loan_id, installment, now))
        .collect()
}

/// settled payment entry, append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepaymentRecord {
    pub id: Uuid,
    pub loan_id: LoanId,
    pub bill_id: BillId,
    pub period: u32,
    pub amount: Money,
    pub late_fee: Money,
    pub due_date: NaiveDate,
    pub paid_at: DateTime<Utc>,
    pub status: RepaymentStatus,
}

impl RepaymentRecord {
    /// build the settlement entry for a bill; a late fee applies when the
    /// bill had gone overdue before payment
    pub fn settle(bill: &Bill, policy: &LateFeePolicy, paid_at: DateTime<Utc>) -> Self {
        let (late_fee, status) = if bill.status == BillStatus::Overdue {
            let days = bill.days_overdue(paid_at.date_naive());
            (policy.fee(bill.amount, days), RepaymentStatus::Late)
        } else {
            (Money::ZERO, RepaymentStatus::OnTime)
        };

        Self {
            id: Uuid::new_v4(),
            loan_id: bill.loan_id,
            bill_id: bill.id,
            period: bill.period,
            amount: bill.amount,
            late_fee,
            due_date: bill.due_date,
            paid_at,
            status,
        }
    }
}

/// per-loan repayment totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepaymentSummary {
    pub total_amount: Money,
    pub paid_amount: Money,
    pub pending_amount: Money,
    pub overdue_amount: Money,
    pub late_fees: Money,
    /// percent of the total amount settled, two decimals
    pub completion_rate: Decimal,
}

/// summarize the bills and settlement records of one loan
pub fn summarize(bills: &[Bill], repayments: &[RepaymentRecord]) -> RepaymentSummary {
    let mut total = Money::ZERO;
    let mut paid = Money::ZERO;
    let mut pending = Money::ZERO;
    let mut overdue = Money::ZERO;

    for bill in bills {
        total += bill.amount;
        match bill.status {
            BillStatus::Paid => paid += bill.amount,
            BillStatus::Pending => pending += bill.amount,
            BillStatus::Overdue => overdue += bill.amount,
        }
    }

    let late_fees = repayments
        .iter()
        .map(|r| r.late_fee)
        .fold(Money::ZERO, |acc, x| acc + x);

    let completion_rate = if total.is_zero() {
        Decimal::ZERO
    } else {
        (paid.as_decimal() / total.as_decimal() * Decimal::from(100)).round_dp(2)
    };

    RepaymentSummary {
        total_amount: total,
        paid_amount: paid,
        pending_amount: pending,
        overdue_amount: overdue,
        late_fees,
        completion_rate,
    }
}
