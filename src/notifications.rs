use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use crate::decimal::Money;
use crate::ledger::Bill;
use crate::types::{BillId, LoanId, NotificationCategory, NotificationId, UserId};

/// a persisted notification event
///
/// write-once except for the read flag; reminder notifications carry the
/// bill they report on so the scan loop can deduplicate per
/// (user, bill, body)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub bill_id: Option<BillId>,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    fn new(
        user_id: UserId,
        bill_id: Option<BillId>,
        title: &str,
        body: String,
        category: NotificationCategory,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            bill_id,
            title: title.to_string(),
            body,
            category,
            is_read: false,
            created_at: now,
        }
    }

    pub fn application_submitted(user_id: UserId, amount: Money, now: DateTime<Utc>) -> Self {
        Self::new(
            user_id,
            None,
            "Loan application submitted",
            format!(
                "Your loan application for {} has been submitted and is awaiting review.",
                amount
            ),
            NotificationCategory::ApplicationSubmitted,
            now,
        )
    }

    pub fn application_decided(
        user_id: UserId,
        loan_id: LoanId,
        approved: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let outcome = if approved { "approved" } else { "rejected" };
        Self::new(
            user_id,
            None,
            "Loan application reviewed",
            format!("Your loan application ({}) has been {}.", loan_id, outcome),
            NotificationCategory::ApplicationDecided,
            now,
        )
    }

    pub fn repayment_reminder(user_id: UserId, bill: &Bill, now: DateTime<Utc>) -> Self {
        Self::new(
            user_id,
            Some(bill.id),
            "Repayment reminder",
            format!(
                "Installment {} of {} is due on {}.",
                bill.period, bill.amount, bill.due_date
            ),
            NotificationCategory::RepaymentReminder,
            now,
        )
    }

    pub fn overdue_reminder(user_id: UserId, bill: &Bill, now: DateTime<Utc>) -> Self {
        Self::new(
            user_id,
            Some(bill.id),
            "Bill overdue",
            format!(
                "Installment {} of {} was due on {} and is now overdue.",
                bill.period, bill.amount, bill.due_date
            ),
            NotificationCategory::OverdueReminder,
            now,
        )
    }

    pub fn collection_notice(
        user_id: UserId,
        bill: &Bill,
        days_overdue: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            user_id,
            Some(bill.id),
            "Collection notice",
            format!(
                "Installment {} is {} days overdue. Please settle {} immediately.",
                bill.period, days_overdue, bill.amount
            ),
            NotificationCategory::CollectionNotice,
            now,
        )
    }
}

/// outbound delivery hook for committed notifications
///
/// the store persists notifications; sinks deliver them (mail, push).
/// delivery failures must stay on the sink side, so the hook is
/// infallible from the domain's point of view
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification);
}

/// sink that drops everything, for wiring without a delivery channel
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn deliver(&self, _notification: &Notification) {}
}

/// sink that records deliveries so tests can assert on them
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().expect("sink mutex poisoned").clone()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, notification: &Notification) {
        self.delivered
            .lock()
            .expect("sink mutex poisoned")
            .push(notification.clone());
    }
}
