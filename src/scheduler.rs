use std::sync::Arc;

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ScanPolicy;
use crate::errors::{Result, ServicingError};
use crate::ledger::Bill;
use crate::notifications::{Notification, NotificationSink};
use crate::store::LoanStore;
use crate::types::BillStatus;

/// outcome of one scan tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub reminders_sent: usize,
    pub overdue_marked: usize,
    pub failures: usize,
}

/// periodic bill scanner
///
/// each tick runs two idempotent scans: upcoming-due reminders and the
/// pending-to-overdue transition. candidates are selected under a read
/// lock and every mutation re-checks the bill's status under the write
/// lock, so a bill paid in between is never downgraded or re-reminded
pub struct BillScanner {
    store: Arc<LoanStore>,
    sink: Arc<dyn NotificationSink>,
    time: Arc<SafeTimeProvider>,
    policy: ScanPolicy,
}

impl BillScanner {
    pub fn new(
        store: Arc<LoanStore>,
        sink: Arc<dyn NotificationSink>,
        time: Arc<SafeTimeProvider>,
        policy: ScanPolicy,
    ) -> Self {
        Self {
            store,
            sink,
            time,
            policy,
        }
    }

    /// run one tick; failures are isolated per bill so one bad item never
    /// aborts the rest of the scan
    pub fn scan_once(&self) -> ScanReport {
        let today = self.time.now().date_naive();
        let mut report = ScanReport::default();

        for bill in self
            .store
            .pending_due_within(today, self.policy.reminder_lookahead_days)
        {
            match self.remind(&bill, today) {
                Ok(Some(notification)) => {
                    report.reminders_sent += 1;
                    self.sink.deliver(&notification);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(bill_id = %bill.id, error = %err, "reminder scan item failed");
                    report.failures += 1;
                }
            }
        }

        for bill in self.store.pending_past_due(today) {
            match self.mark_overdue(&bill, today) {
                Ok(Some(notification)) => {
                    report.overdue_marked += 1;
                    self.sink.deliver(&notification);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(bill_id = %bill.id, error = %err, "overdue scan item failed");
                    report.failures += 1;
                }
            }
        }

        report
    }

    /// insert a reminder unless one with identical content already exists
    /// for this user and bill; conditioned on the bill still being pending
    fn remind(&self, candidate: &Bill, today: NaiveDate) -> Result<Option<Notification>> {
        let now = self.time.now();
        let mut inner = self.store.write();

        let bill = inner
            .bills
            .get(&candidate.id)
            .cloned()
            .ok_or(ServicingError::NotFound {
                entity: "bill",
                id: candidate.id,
            })?;
        if bill.status != BillStatus::Pending {
            return Ok(None);
        }
        let horizon = today + chrono::Duration::days(self.policy.reminder_lookahead_days as i64);
        if bill.due_date <= today || bill.due_date > horizon {
            return Ok(None);
        }

        let user_id = inner
            .loans
            .get(&bill.loan_id)
            .map(|loan| loan.applicant_id)
            .ok_or(ServicingError::NotFound {
                entity: "loan",
                id: bill.loan_id,
            })?;

        let notification = Notification::repayment_reminder(user_id, &bill, now);
        if inner.reminder_exists(user_id, bill.id, &notification.body) {
            return Ok(None);
        }
        inner.notifications.push(notification.clone());
        Ok(Some(notification))
    }

    /// compare-and-set pending -> overdue plus exactly one notification;
    /// the transition is monotonic, only a payment resolves it
    fn mark_overdue(&self, candidate: &Bill, today: NaiveDate) -> Result<Option<Notification>> {
        let now = self.time.now();
        let mut inner = self.store.write();

        let bill = inner
            .bills
            .get(&candidate.id)
            .cloned()
            .ok_or(ServicingError::NotFound {
                entity: "bill",
                id: candidate.id,
            })?;
        if bill.status != BillStatus::Pending || bill.due_date >= today {
            return Ok(None);
        }

        let user_id = inner
            .loans
            .get(&bill.loan_id)
            .map(|loan| loan.applicant_id)
            .ok_or(ServicingError::NotFound {
                entity: "loan",
                id: bill.loan_id,
            })?;

        if let Some(stored) = inner.bills.get_mut(&bill.id) {
            stored.status = BillStatus::Overdue;
        }
        let notification = Notification::overdue_reminder(user_id, &bill, now);
        inner.notifications.push(notification.clone());
        Ok(Some(notification))
    }

    /// run the scanner as a background loop on the configured interval
    ///
    /// shutdown is graceful: the in-flight tick finishes before the task
    /// exits
    pub fn spawn(self) -> ScannerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval = self.policy.interval;

        let task = tokio::spawn(async move {
            info!(interval = ?interval, "bill scanner started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.scan_once();
                        if report.failures > 0 {
                            warn!(
                                reminders = report.reminders_sent,
                                overdue = report.overdue_marked,
                                failures = report.failures,
                                "scan tick completed with failures"
                            );
                        } else if report.reminders_sent > 0 || report.overdue_marked > 0 {
                            debug!(
                                reminders = report.reminders_sent,
                                overdue = report.overdue_marked,
                                "scan tick completed"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("bill scanner stopped");
                        break;
                    }
                }
            }
        });

        ScannerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// handle to a spawned scanner loop
pub struct ScannerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScannerHandle {
    /// signal the loop to stop and wait for it to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
