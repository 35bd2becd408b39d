use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ServicingError};
use crate::ledger::{Bill, RepaymentRecord};
use crate::lifecycle::LoanApplication;
use crate::notifications::Notification;
use crate::types::{BillId, BillStatus, LoanId, UserId};

/// persisted entity sets; one lock over the whole set gives every
/// compound operation a single unit of work
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct StoreInner {
    pub(crate) loans: HashMap<LoanId, LoanApplication>,
    pub(crate) bills: HashMap<BillId, Bill>,
    pub(crate) repayments: Vec<RepaymentRecord>,
    pub(crate) notifications: Vec<Notification>,
}

impl StoreInner {
    pub(crate) fn bills_for_loan(&self, loan_id: LoanId) -> Vec<Bill> {
        let mut bills: Vec<Bill> = self
            .bills
            .values()
            .filter(|bill| bill.loan_id == loan_id)
            .cloned()
            .collect();
        bills.sort_by_key(|bill| bill.period);
        bills
    }

    pub(crate) fn has_bills_for(&self, loan_id: LoanId) -> bool {
        self.bills.values().any(|bill| bill.loan_id == loan_id)
    }

    /// dedup check for reminder notifications: same user, same bill, same
    /// content
    pub(crate) fn reminder_exists(&self, user_id: UserId, bill_id: BillId, body: &str) -> bool {
        self.notifications.iter().any(|n| {
            n.user_id == user_id && n.bill_id == Some(bill_id) && n.body == body
        })
    }
}

/// in-memory repository for loans, bills, repayments, and notifications
///
/// callers that mutate through [`LoanStore::write`] validate before
/// mutating, so every operation is all-or-nothing under the single write
/// lock
#[derive(Debug, Default)]
pub struct LoanStore {
    inner: RwLock<StoreInner>,
}

impl LoanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().expect("store lock poisoned")
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().expect("store lock poisoned")
    }

    /// insert a freshly submitted loan together with its submission
    /// notification, as one unit of work
    pub fn insert_loan(&self, loan: LoanApplication, notification: Notification) -> Result<()> {
        let mut inner = self.write();
        if inner.loans.contains_key(&loan.id) {
            return Err(ServicingError::InvalidConfiguration {
                message: format!("loan {} already exists", loan.id),
            });
        }
        inner.loans.insert(loan.id, loan);
        inner.notifications.push(notification);
        Ok(())
    }

    pub fn loan(&self, id: LoanId) -> Result<LoanApplication> {
        self.read()
            .loans
            .get(&id)
            .cloned()
            .ok_or(ServicingError::NotFound { entity: "loan", id })
    }

    pub fn loans_for_user(&self, user_id: UserId) -> Vec<LoanApplication> {
        let mut loans: Vec<LoanApplication> = self
            .read()
            .loans
            .values()
            .filter(|loan| loan.applicant_id == user_id)
            .cloned()
            .collect();
        loans.sort_by_key(|loan| loan.created_at);
        loans
    }

    /// exclusive read-modify-write on one loan; the closure works on a
    /// copy, so an error leaves the stored loan untouched
    pub fn update_loan<R>(
        &self,
        id: LoanId,
        f: impl FnOnce(&mut LoanApplication) -> Result<R>,
    ) -> Result<R> {
        let mut inner = self.write();
        let current = inner
            .loans
            .get(&id)
            .ok_or(ServicingError::NotFound { entity: "loan", id })?;
        let mut updated = current.clone();
        let out = f(&mut updated)?;
        inner.loans.insert(id, updated);
        Ok(out)
    }

    pub fn bill(&self, id: BillId) -> Result<Bill> {
        self.read()
            .bills
            .get(&id)
            .cloned()
            .ok_or(ServicingError::NotFound { entity: "bill", id })
    }

    pub fn bills_for_loan(&self, loan_id: LoanId) -> Vec<Bill> {
        self.read().bills_for_loan(loan_id)
    }

    /// pending bills due after today but within the lookahead window
    pub fn pending_due_within(&self, today: NaiveDate, lookahead_days: u32) -> Vec<Bill> {
        let horizon = today + chrono::Duration::days(lookahead_days as i64);
        self.read()
            .bills
            .values()
            .filter(|bill| {
                bill.status == BillStatus::Pending
                    && bill.due_date > today
                    && bill.due_date <= horizon
            })
            .cloned()
            .collect()
    }

    /// pending bills whose due date has passed
    pub fn pending_past_due(&self, today: NaiveDate) -> Vec<Bill> {
        self.read()
            .bills
            .values()
            .filter(|bill| bill.status == BillStatus::Pending && bill.due_date < today)
            .cloned()
            .collect()
    }

    pub fn repayments_for_loan(&self, loan_id: LoanId) -> Vec<RepaymentRecord> {
        let mut records: Vec<RepaymentRecord> = self
            .read()
            .repayments
            .iter()
            .filter(|record| record.loan_id == loan_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.due_date);
        records
    }

    pub fn notifications_for_user(&self, user_id: UserId) -> Vec<Notification> {
        self.read()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn unread_notifications(&self, user_id: UserId) -> Vec<Notification> {
        self.read()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .cloned()
            .collect()
    }

    /// serialize the full state as JSON, a storage-agnostic snapshot
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.read())
    }

    /// restore a store from a JSON snapshot
    pub fn import_json(json: &str) -> serde_json::Result<Self> {
        let inner: StoreInner = serde_json::from_str(json)?;
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }
}
