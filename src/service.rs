use std::sync::Arc;

use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use tracing::info;
use uuid::Uuid;

use crate::amortization::InstallmentSchedule;
use crate::config::ServicingConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{Result, ServicingError};
use crate::ledger::{self, Bill, RepaymentRecord, RepaymentSummary};
use crate::lifecycle::LoanApplication;
use crate::notifications::{Notification, NotificationSink};
use crate::risk::{assess_with_fallback, ApplicantProfile, RiskAssessment, RiskScorer};
use crate::scheduler::BillScanner;
use crate::store::{LoanStore, StoreInner};
use crate::types::{
    BillId, BillStatus, Decision, LoanId, LoanStatus, NotificationId, Role, UserId,
};

/// an authenticated caller; authentication itself is outside the core,
/// role and ownership checks happen here
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    fn require(&self, role: Role) -> Result<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(ServicingError::Forbidden {
                message: format!("requires {:?} role, actor holds {:?}", role, self.role),
            })
        }
    }
}

/// requested loan terms
#[derive(Debug, Clone)]
pub struct LoanRequest {
    pub amount: Money,
    pub term_months: u32,
    pub purpose: String,
}

/// interactive calculator output, nothing persisted
#[derive(Debug, Clone)]
pub struct RiskPreview {
    pub assessment: RiskAssessment,
    pub projected_rate: Rate,
    pub projected_monthly_payment: Money,
    pub projected_total_interest: Money,
}

/// service facade over the loan lifecycle, billing, and notifications
pub struct LoanService {
    store: Arc<LoanStore>,
    scorer: Arc<dyn RiskScorer>,
    sink: Arc<dyn NotificationSink>,
    time: Arc<SafeTimeProvider>,
    config: ServicingConfig,
}

impl LoanService {
    pub fn new(
        store: Arc<LoanStore>,
        scorer: Arc<dyn RiskScorer>,
        sink: Arc<dyn NotificationSink>,
        time: Arc<SafeTimeProvider>,
        config: ServicingConfig,
    ) -> Self {
        Self {
            store,
            scorer,
            sink,
            time,
            config,
        }
    }

    pub fn store(&self) -> &Arc<LoanStore> {
        &self.store
    }

    /// a scanner sharing this service's store, sink, clock, and policy
    pub fn scanner(&self) -> BillScanner {
        BillScanner::new(
            self.store.clone(),
            self.sink.clone(),
            self.time.clone(),
            self.config.scan.clone(),
        )
    }

    /// record a new application: validate, score (degrading on scorer
    /// failure), price, compute the payment summary, persist, notify
    pub fn submit(
        &self,
        applicant_id: UserId,
        request: LoanRequest,
        profile: ApplicantProfile,
    ) -> Result<LoanApplication> {
        self.config
            .limits
            .validate(request.amount, request.term_months)?;

        let now = self.time.now();
        let assessment = assess_with_fallback(
            self.scorer.as_ref(),
            &profile,
            request.amount,
            request.term_months,
        );
        let rate = self
            .config
            .rate_policy
            .rate_for(request.amount, request.term_months);
        let preview =
            InstallmentSchedule::generate(request.amount, rate, request.term_months, now)?;

        let loan = LoanApplication::new(
            Uuid::new_v4(),
            applicant_id,
            request.amount,
            request.term_months,
            request.purpose,
            rate,
            preview.payment_amount,
            preview.total_interest,
            &assessment,
            profile,
            now,
        );
        let notification = Notification::application_submitted(applicant_id, loan.amount, now);

        self.store.insert_loan(loan.clone(), notification.clone())?;
        self.sink.deliver(&notification);

        info!(
            loan_id = %loan.id,
            amount = %loan.amount,
            rate = %loan.annual_rate,
            risk_level = ?loan.risk_level,
            "loan application submitted"
        );
        Ok(loan)
    }

    /// manager records an advisory recommendation
    pub fn manager_decide(
        &self,
        actor: &Actor,
        loan_id: LoanId,
        decision: Decision,
    ) -> Result<LoanApplication> {
        actor.require(Role::Manager)?;
        let now = self.time.now();
        let actor_id = actor.user_id;

        let updated = self.store.update_loan(loan_id, |loan| {
            loan.apply_decision(actor_id, Role::Manager, decision, now)?;
            Ok(loan.clone())
        })?;

        info!(loan_id = %loan_id, status = ?updated.status, "manager recommendation recorded");
        Ok(updated)
    }

    /// president issues the binding decision; approval materializes the
    /// full bill batch in the same unit of work
    pub fn president_decide(
        &self,
        actor: &Actor,
        loan_id: LoanId,
        decision: Decision,
    ) -> Result<LoanApplication> {
        actor.require(Role::President)?;
        let now = self.time.now();

        let (updated, notification) = {
            let mut inner = self.store.write();
            let current = inner
                .loans
                .get(&loan_id)
                .ok_or(ServicingError::NotFound {
                    entity: "loan",
                    id: loan_id,
                })?;

            let mut loan = current.clone();
            loan.apply_decision(actor.user_id, Role::President, decision, now)?;
            let approved = loan.status == LoanStatus::Approved;

            let bills = if approved {
                generate_bills_locked(&inner, &loan, now)?
            } else {
                Vec::new()
            };
            let notification =
                Notification::application_decided(loan.applicant_id, loan_id, approved, now);

            // all fallible steps are done; commit the unit of work
            inner.loans.insert(loan_id, loan.clone());
            for bill in bills {
                inner.bills.insert(bill.id, bill);
            }
            inner.notifications.push(notification.clone());
            (loan, notification)
        };

        self.sink.deliver(&notification);
        info!(loan_id = %loan_id, status = ?updated.status, "president decision recorded");
        Ok(updated)
    }

    /// settle a bill: ownership and status are checked and the bill,
    /// repayment record, and status change commit atomically
    pub fn apply_payment(&self, payer: UserId, bill_id: BillId) -> Result<RepaymentRecord> {
        let now = self.time.now();

        let record = {
            let mut inner = self.store.write();
            let bill = inner
                .bills
                .get(&bill_id)
                .cloned()
                .ok_or(ServicingError::NotFound {
                    entity: "bill",
                    id: bill_id,
                })?;
            let applicant_id = inner
                .loans
                .get(&bill.loan_id)
                .map(|loan| loan.applicant_id)
                .ok_or(ServicingError::NotFound {
                    entity: "loan",
                    id: bill.loan_id,
                })?;

            if applicant_id != payer {
                return Err(ServicingError::Forbidden {
                    message: format!("bill {} does not belong to payer", bill_id),
                });
            }
            if bill.status == BillStatus::Paid {
                return Err(ServicingError::AlreadySettled { bill_id });
            }

            let record = RepaymentRecord::settle(&bill, &self.config.late_fee, now);
            if let Some(stored) = inner.bills.get_mut(&bill_id) {
                stored.status = BillStatus::Paid;
                stored.paid_at = Some(now);
            }
            inner.repayments.push(record.clone());
            record
        };

        info!(
            bill_id = %bill_id,
            period = record.period,
            late_fee = %record.late_fee,
            "payment applied"
        );
        Ok(record)
    }

    /// score and price requested terms without persisting anything
    pub fn risk_preview(
        &self,
        request: &LoanRequest,
        profile: &ApplicantProfile,
    ) -> Result<RiskPreview> {
        self.config
            .limits
            .validate(request.amount, request.term_months)?;

        let assessment = assess_with_fallback(
            self.scorer.as_ref(),
            profile,
            request.amount,
            request.term_months,
        );
        let rate = self
            .config
            .rate_policy
            .rate_for(request.amount, request.term_months);
        let schedule = InstallmentSchedule::generate(
            request.amount,
            rate,
            request.term_months,
            self.time.now(),
        )?;

        Ok(RiskPreview {
            assessment,
            projected_rate: rate,
            projected_monthly_payment: schedule.payment_amount,
            projected_total_interest: schedule.total_interest,
        })
    }

    /// manager-triggered collection notice for an overdue bill
    pub fn send_collection_notice(&self, actor: &Actor, bill_id: BillId) -> Result<Notification> {
        actor.require(Role::Manager)?;
        let now = self.time.now();

        let notification = {
            let mut inner = self.store.write();
            let bill = inner
                .bills
                .get(&bill_id)
                .cloned()
                .ok_or(ServicingError::NotFound {
                    entity: "bill",
                    id: bill_id,
                })?;
            if bill.status != BillStatus::Overdue {
                return Err(ServicingError::Validation {
                    message: format!("bill {} is not overdue", bill_id),
                });
            }
            let applicant_id = inner
                .loans
                .get(&bill.loan_id)
                .map(|loan| loan.applicant_id)
                .ok_or(ServicingError::NotFound {
                    entity: "loan",
                    id: bill.loan_id,
                })?;

            let days = bill.days_overdue(now.date_naive());
            let notification = Notification::collection_notice(applicant_id, &bill, days, now);
            inner.notifications.push(notification.clone());
            notification
        };

        self.sink.deliver(&notification);
        info!(bill_id = %bill_id, "collection notice sent");
        Ok(notification)
    }

    pub fn repayment_summary(&self, loan_id: LoanId) -> Result<RepaymentSummary> {
        let inner = self.store.read();
        if !inner.loans.contains_key(&loan_id) {
            return Err(ServicingError::NotFound {
                entity: "loan",
                id: loan_id,
            });
        }
        let bills = inner.bills_for_loan(loan_id);
        let repayments: Vec<RepaymentRecord> = inner
            .repayments
            .iter()
            .filter(|record| record.loan_id == loan_id)
            .cloned()
            .collect();
        Ok(ledger::summarize(&bills, &repayments))
    }

    pub fn repayment_history(&self, loan_id: LoanId) -> Vec<RepaymentRecord> {
        self.store.repayments_for_loan(loan_id)
    }

    /// flip the read flag, owner only
    pub fn mark_notification_read(
        &self,
        user_id: UserId,
        notification_id: NotificationId,
    ) -> Result<()> {
        let mut inner = self.store.write();
        let notification = inner
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id)
            .ok_or(ServicingError::NotFound {
                entity: "notification",
                id: notification_id,
            })?;
        if notification.user_id != user_id {
            return Err(ServicingError::Forbidden {
                message: "notification belongs to another user".to_string(),
            });
        }
        notification.is_read = true;
        Ok(())
    }
}

/// materialize the bill batch for an approved loan; duplicate generation
/// is an error, never a silent no-op
pub(crate) fn generate_bills_locked(
    inner: &StoreInner,
    loan: &LoanApplication,
    now: DateTime<Utc>,
) -> Result<Vec<Bill>> {
    if inner.has_bills_for(loan.id) {
        return Err(ServicingError::BillsAlreadyGenerated { loan_id: loan.id });
    }
    let schedule =
        InstallmentSchedule::generate(loan.amount, loan.annual_rate, loan.term_months, now)?;
    Ok(ledger::materialize_bills(loan.id, &schedule, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::RecordingSink;
    use crate::risk::TierScorer;
    use crate::types::NotificationCategory;
    use chrono::TimeZone;
    use hourglass_rs::TimeSource;

    struct Fixture {
        service: LoanService,
        sink: Arc<RecordingSink>,
        time: Arc<SafeTimeProvider>,
        applicant: UserId,
        manager: Actor,
        president: Actor,
    }

    fn fixture() -> Fixture {
        let time = Arc::new(SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
        )));
        let sink = Arc::new(RecordingSink::new());
        let service = LoanService::new(
            Arc::new(LoanStore::new()),
            Arc::new(TierScorer),
            sink.clone(),
            time.clone(),
            ServicingConfig::default(),
        );
        Fixture {
            service,
            sink,
            time,
            applicant: Uuid::new_v4(),
            manager: Actor::new(Uuid::new_v4(), Role::Manager),
            president: Actor::new(Uuid::new_v4(), Role::President),
        }
    }

    fn request() -> LoanRequest {
        LoanRequest {
            amount: Money::from_major(50_000),
            term_months: 3,
            purpose: "car repairs".to_string(),
        }
    }

    fn submit_and_approve(fx: &Fixture) -> LoanApplication {
        let loan = fx
            .service
            .submit(fx.applicant, request(), ApplicantProfile::default())
            .unwrap();
        fx.service
            .manager_decide(&fx.manager, loan.id, Decision::RecommendApprove)
            .unwrap();
        fx.service
            .president_decide(&fx.president, loan.id, Decision::Approve)
            .unwrap()
    }

    #[test]
    fn test_submit_prices_and_notifies() {
        let fx = fixture();
        let loan = fx
            .service
            .submit(fx.applicant, request(), ApplicantProfile::default())
            .unwrap();

        assert_eq!(loan.status, LoanStatus::Submitted);
        assert_eq!(loan.annual_rate, Rate::from_percentage(5));
        assert_eq!(loan.monthly_payment, Money::from_str_exact("16805.75").unwrap());
        assert_eq!(loan.total_interest, Money::from_str_exact("417.24").unwrap());
        assert!(loan.payment_summary_consistent(Money::from_str_exact("0.05").unwrap()));

        let delivered = fx.sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].category, NotificationCategory::ApplicationSubmitted);
        assert_eq!(delivered[0].user_id, fx.applicant);
    }

    #[test]
    fn test_submit_rejects_out_of_bounds_terms() {
        let fx = fixture();
        let result = fx.service.submit(
            fx.applicant,
            LoanRequest {
                amount: Money::from_major(500),
                term_months: 3,
                purpose: String::new(),
            },
            ApplicantProfile::default(),
        );
        assert!(matches!(result, Err(ServicingError::Validation { .. })));
        assert!(fx.service.store().loans_for_user(fx.applicant).is_empty());
    }

    #[test]
    fn test_approval_generates_bills_once() {
        let fx = fixture();
        let loan = submit_and_approve(&fx);

        assert_eq!(loan.status, LoanStatus::Approved);
        assert!(loan.approved_at.is_some());

        let bills = fx.service.store().bills_for_loan(loan.id);
        assert_eq!(bills.len(), 3);
        assert!(bills.iter().all(|b| b.status == BillStatus::Pending));
        // approved on 2024-01-15, so the first bill is due 2024-02-01
        assert_eq!(
            bills[0].due_date,
            chrono::NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        );

        // a second generation attempt fails without touching the batch
        let stored = fx.service.store().loan(loan.id).unwrap();
        let inner = fx.service.store().read();
        let err = generate_bills_locked(&inner, &stored, fx.time.now()).unwrap_err();
        assert!(matches!(err, ServicingError::BillsAlreadyGenerated { .. }));
        drop(inner);
        assert_eq!(fx.service.store().bills_for_loan(loan.id).len(), 3);
    }

    #[test]
    fn test_rejection_creates_no_bills() {
        let fx = fixture();
        let loan = fx
            .service
            .submit(fx.applicant, request(), ApplicantProfile::default())
            .unwrap();
        fx.service
            .manager_decide(&fx.manager, loan.id, Decision::RecommendReject)
            .unwrap();
        let rejected = fx
            .service
            .president_decide(&fx.president, loan.id, Decision::Reject)
            .unwrap();

        assert_eq!(rejected.status, LoanStatus::Rejected);
        assert!(fx.service.store().bills_for_loan(loan.id).is_empty());
    }

    #[test]
    fn test_president_can_override_manager_rejection() {
        let fx = fixture();
        let loan = fx
            .service
            .submit(fx.applicant, request(), ApplicantProfile::default())
            .unwrap();
        fx.service
            .manager_decide(&fx.manager, loan.id, Decision::RecommendReject)
            .unwrap();
        let approved = fx
            .service
            .president_decide(&fx.president, loan.id, Decision::Approve)
            .unwrap();
        assert_eq!(approved.status, LoanStatus::Approved);
        assert_eq!(fx.service.store().bills_for_loan(loan.id).len(), 3);
    }

    #[test]
    fn test_decisions_enforce_roles_and_ordering() {
        let fx = fixture();
        let loan = fx
            .service
            .submit(fx.applicant, request(), ApplicantProfile::default())
            .unwrap();

        // applicant cannot act as manager
        let err = fx
            .service
            .manager_decide(
                &Actor::new(fx.applicant, Role::Applicant),
                loan.id,
                Decision::RecommendApprove,
            )
            .unwrap_err();
        assert!(matches!(err, ServicingError::Forbidden { .. }));

        // president cannot skip the manager stage
        let err = fx
            .service
            .president_decide(&fx.president, loan.id, Decision::Approve)
            .unwrap_err();
        assert!(matches!(err, ServicingError::InvalidTransition { .. }));

        // terminal loans accept no further decisions
        let approved = submit_and_approve(&fx);
        let err = fx
            .service
            .president_decide(&fx.president, approved.id, Decision::Reject)
            .unwrap_err();
        assert!(matches!(err, ServicingError::InvalidTransition { .. }));
        assert_eq!(
            fx.service.store().loan(approved.id).unwrap().status,
            LoanStatus::Approved
        );
    }

    #[test]
    fn test_apply_payment_settles_once() {
        let fx = fixture();
        let loan = submit_and_approve(&fx);
        let bills = fx.service.store().bills_for_loan(loan.id);

        let record = fx.service.apply_payment(fx.applicant, bills[0].id).unwrap();
        assert_eq!(record.amount, bills[0].amount);
        assert_eq!(record.late_fee, Money::ZERO);

        let paid = fx.service.store().bill(bills[0].id).unwrap();
        assert_eq!(paid.status, BillStatus::Paid);
        assert!(paid.paid_at.is_some());

        // double payment is rejected and no second record appears
        let err = fx.service.apply_payment(fx.applicant, bills[0].id).unwrap_err();
        assert!(matches!(err, ServicingError::AlreadySettled { .. }));
        assert_eq!(fx.service.repayment_history(loan.id).len(), 1);
    }

    #[test]
    fn test_apply_payment_checks_ownership() {
        let fx = fixture();
        let loan = submit_and_approve(&fx);
        let bills = fx.service.store().bills_for_loan(loan.id);

        let err = fx
            .service
            .apply_payment(Uuid::new_v4(), bills[0].id)
            .unwrap_err();
        assert!(matches!(err, ServicingError::Forbidden { .. }));
        assert_eq!(
            fx.service.store().bill(bills[0].id).unwrap().status,
            BillStatus::Pending
        );
    }

    #[test]
    fn test_overdue_payment_carries_late_fee() {
        let fx = fixture();
        let loan = submit_and_approve(&fx);
        let bills = fx.service.store().bills_for_loan(loan.id);
        {
            let mut inner = fx.service.store().write();
            if let Some(bill) = inner.bills.get_mut(&bills[0].id) {
                bill.status = BillStatus::Overdue;
            }
        }

        // due 2024-02-01, paid 2024-02-11
        let controller = fx.time.test_control().unwrap();
        controller.advance(chrono::Duration::days(27));

        let record = fx.service.apply_payment(fx.applicant, bills[0].id).unwrap();
        // 16805.75 * 0.0005 * 10 days
        assert_eq!(record.late_fee, Money::from_str_exact("84.03").unwrap());

        let summary = fx.service.repayment_summary(loan.id).unwrap();
        assert_eq!(summary.late_fees, record.late_fee);
        assert_eq!(summary.paid_amount, bills[0].amount);
    }

    #[test]
    fn test_risk_preview_matches_submission_pricing() {
        let fx = fixture();
        let preview = fx
            .service
            .risk_preview(&request(), &ApplicantProfile::default())
            .unwrap();
        let loan = fx
            .service
            .submit(fx.applicant, request(), ApplicantProfile::default())
            .unwrap();

        assert_eq!(preview.projected_rate, loan.annual_rate);
        assert_eq!(preview.projected_monthly_payment, loan.monthly_payment);
        assert_eq!(preview.projected_total_interest, loan.total_interest);
        assert_eq!(preview.assessment.score, loan.risk_score);
        // preview persisted nothing: only the submitted loan exists
        assert_eq!(fx.service.store().loans_for_user(fx.applicant).len(), 1);
    }

    #[test]
    fn test_collection_notice_requires_overdue_bill_and_manager() {
        let fx = fixture();
        let loan = submit_and_approve(&fx);
        let bills = fx.service.store().bills_for_loan(loan.id);

        let err = fx
            .service
            .send_collection_notice(&fx.president, bills[0].id)
            .unwrap_err();
        assert!(matches!(err, ServicingError::Forbidden { .. }));

        let err = fx
            .service
            .send_collection_notice(&fx.manager, bills[0].id)
            .unwrap_err();
        assert!(matches!(err, ServicingError::Validation { .. }));

        {
            let mut inner = fx.service.store().write();
            if let Some(bill) = inner.bills.get_mut(&bills[0].id) {
                bill.status = BillStatus::Overdue;
            }
        }
        let notice = fx
            .service
            .send_collection_notice(&fx.manager, bills[0].id)
            .unwrap();
        assert_eq!(notice.category, NotificationCategory::CollectionNotice);
        assert_eq!(notice.user_id, fx.applicant);
    }

    #[test]
    fn test_mark_notification_read_checks_ownership() {
        let fx = fixture();
        fx.service
            .submit(fx.applicant, request(), ApplicantProfile::default())
            .unwrap();
        let notifications = fx.service.store().unread_notifications(fx.applicant);
        assert_eq!(notifications.len(), 1);
        let id = notifications[0].id;

        let err = fx
            .service
            .mark_notification_read(Uuid::new_v4(), id)
            .unwrap_err();
        assert!(matches!(err, ServicingError::Forbidden { .. }));

        fx.service.mark_notification_read(fx.applicant, id).unwrap();
        assert!(fx.service.store().unread_notifications(fx.applicant).is_empty());
    }

    struct BrokenScorer;

    impl RiskScorer for BrokenScorer {
        fn assess(
            &self,
            _profile: &ApplicantProfile,
            _amount: Money,
            _term_months: u32,
        ) -> std::result::Result<RiskAssessment, crate::risk::ScoringError> {
            Err(crate::risk::ScoringError {
                message: "model offline".to_string(),
            })
        }
    }

    #[test]
    fn test_scoring_failure_degrades_but_records_application() {
        let time = Arc::new(SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
        )));
        let service = LoanService::new(
            Arc::new(LoanStore::new()),
            Arc::new(BrokenScorer),
            Arc::new(RecordingSink::new()),
            time,
            ServicingConfig::default(),
        );

        let loan = service
            .submit(Uuid::new_v4(), request(), ApplicantProfile::default())
            .unwrap();
        assert!(loan.scoring_degraded);
        assert_eq!(loan.risk_score, 50.0);
        // pricing is unaffected by the degraded assessment
        assert_eq!(loan.annual_rate, Rate::from_percentage(5));
    }
}
