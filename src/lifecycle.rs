use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{Result, ServicingError};
use crate::risk::{ApplicantProfile, Recommendation, RiskAssessment};
use crate::types::{Decision, LoanId, LoanStatus, RiskLevel, Role, UserId};

/// the approval state machine as an explicit transition table
///
/// returns the next state for a valid `(current, role, decision)` row and
/// `None` for everything else; the manager stage is advisory, so the
/// president decides from either recommendation
pub fn transition(current: LoanStatus, role: Role, decision: Decision) -> Option<LoanStatus> {
    match (current, role, decision) {
        (LoanStatus::Submitted, Role::Manager, Decision::RecommendApprove) => {
            Some(LoanStatus::ManagerRecommendedApprove)
        }
        (LoanStatus::Submitted, Role::Manager, Decision::RecommendReject) => {
            Some(LoanStatus::ManagerRecommendedReject)
        }
        (current, Role::President, Decision::Approve) if current.is_manager_recommended() => {
            Some(LoanStatus::Approved)
        }
        (current, Role::President, Decision::Reject) if current.is_manager_recommended() => {
            Some(LoanStatus::Rejected)
        }
        _ => None,
    }
}

/// a consumer loan application and its audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanApplication {
    pub id: LoanId,
    pub applicant_id: UserId,
    pub amount: Money,
    pub term_months: u32,
    pub purpose: String,
    /// annual rate fixed by the rate policy at submission
    pub annual_rate: Rate,
    pub monthly_payment: Money,
    pub total_interest: Money,
    pub status: LoanStatus,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub recommendation: Recommendation,
    pub scoring_degraded: bool,
    pub profile: ApplicantProfile,
    pub created_at: DateTime<Utc>,
    pub assessed_by: Option<UserId>,
    pub assessed_at: Option<DateTime<Utc>>,
    pub approved_by: Option<UserId>,
    /// stamped by the binding president decision; immutable afterwards
    /// because terminal states accept no further transitions
    pub approved_at: Option<DateTime<Utc>>,
}

impl LoanApplication {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: LoanId,
        applicant_id: UserId,
        amount: Money,
        term_months: u32,
        purpose: String,
        annual_rate: Rate,
        monthly_payment: Money,
        total_interest: Money,
        assessment: &RiskAssessment,
        profile: ApplicantProfile,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            applicant_id,
            amount,
            term_months,
            purpose,
            annual_rate,
            monthly_payment,
            total_interest,
            status: LoanStatus::Submitted,
            risk_score: assessment.score,
            risk_level: assessment.level,
            recommendation: assessment.recommendation,
            scoring_degraded: assessment.degraded,
            profile,
            created_at,
            assessed_by: None,
            assessed_at: None,
            approved_by: None,
            approved_at: None,
        }
    }

    /// apply a review decision, stamping the audit fields for the stage
    pub fn apply_decision(
        &mut self,
        actor: UserId,
        role: Role,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let next = transition(self.status, role, decision).ok_or(
            ServicingError::InvalidTransition {
                loan_id: self.id,
                status: self.status,
            },
        )?;

        self.status = next;
        match role {
            Role::Manager => {
                self.assessed_by = Some(actor);
                self.assessed_at = Some(now);
            }
            Role::President => {
                self.approved_by = Some(actor);
                self.approved_at = Some(now);
            }
            Role::Applicant => {}
        }
        Ok(())
    }

    /// monthly_payment * term - amount should equal total_interest up to
    /// rounding
    pub fn payment_summary_consistent(&self, epsilon: Money) -> bool {
        let implied =
            self.monthly_payment * rust_decimal::Decimal::from(self.term_months) - self.amount;
        (implied - self.total_interest).abs() <= epsilon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn sample_loan() -> LoanApplication {
        let assessment = RiskAssessment {
            score: 40.0,
            level: RiskLevel::Medium,
            recommendation: Recommendation::CautiousApprove,
            degraded: false,
        };
        LoanApplication::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Money::from_major(50_000),
            3,
            "car".to_string(),
            Rate::from_percentage(5),
            Money::from_str_exact("16805.75").unwrap(),
            Money::from_str_exact("417.24").unwrap(),
            &assessment,
            ApplicantProfile::default(),
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_transition_table_valid_rows() {
        use Decision::*;
        use LoanStatus::*;
        use Role::*;

        assert_eq!(
            transition(Submitted, Manager, RecommendApprove),
            Some(ManagerRecommendedApprove)
        );
        assert_eq!(
            transition(Submitted, Manager, RecommendReject),
            Some(ManagerRecommendedReject)
        );
        // president decides from either recommendation, override included
        assert_eq!(
            transition(ManagerRecommendedApprove, President, Approve),
            Some(Approved)
        );
        assert_eq!(
            transition(ManagerRecommendedReject, President, Approve),
            Some(Approved)
        );
        assert_eq!(
            transition(ManagerRecommendedApprove, President, Reject),
            Some(Rejected)
        );
        assert_eq!(
            transition(ManagerRecommendedReject, President, Reject),
            Some(Rejected)
        );
    }

    #[test]
    fn test_transition_table_invalid_rows() {
        use Decision::*;
        use LoanStatus::*;
        use Role::*;

        // president cannot skip the manager stage
        assert_eq!(transition(Submitted, President, Approve), None);
        // manager cannot issue binding decisions
        assert_eq!(transition(Submitted, Manager, Approve), None);
        assert_eq!(transition(ManagerRecommendedApprove, Manager, RecommendApprove), None);
        // applicants decide nothing
        assert_eq!(transition(Submitted, Applicant, RecommendApprove), None);
        // terminal states are final
        for status in [Approved, Rejected] {
            for decision in [RecommendApprove, RecommendReject, Approve, Reject] {
                assert_eq!(transition(status, Manager, decision), None);
                assert_eq!(transition(status, President, decision), None);
            }
        }
    }

    #[test]
    fn test_apply_decision_stamps_audit_fields() {
        let mut loan = sample_loan();
        let manager = Uuid::new_v4();
        let president = Uuid::new_v4();
        let assessed = Utc.with_ymd_and_hms(2024, 1, 16, 9, 0, 0).unwrap();
        let approved = Utc.with_ymd_and_hms(2024, 1, 17, 9, 0, 0).unwrap();

        loan.apply_decision(manager, Role::Manager, Decision::RecommendApprove, assessed)
            .unwrap();
        assert_eq!(loan.status, LoanStatus::ManagerRecommendedApprove);
        assert_eq!(loan.assessed_by, Some(manager));
        assert_eq!(loan.assessed_at, Some(assessed));
        assert_eq!(loan.approved_at, None);

        loan.apply_decision(president, Role::President, Decision::Approve, approved)
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Approved);
        assert_eq!(loan.approved_by, Some(president));
        assert_eq!(loan.approved_at, Some(approved));
    }

    #[test]
    fn test_second_president_decision_fails_without_side_effect() {
        let mut loan = sample_loan();
        let president = Uuid::new_v4();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 17, 9, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 18, 9, 0, 0).unwrap();

        loan.apply_decision(Uuid::new_v4(), Role::Manager, Decision::RecommendApprove, t1)
            .unwrap();
        loan.apply_decision(president, Role::President, Decision::Approve, t1)
            .unwrap();

        let err = loan
            .apply_decision(president, Role::President, Decision::Reject, t2)
            .unwrap_err();
        assert!(matches!(err, ServicingError::InvalidTransition { .. }));
        // nothing mutated: status and the original approval stamp survive
        assert_eq!(loan.status, LoanStatus::Approved);
        assert_eq!(loan.approved_at, Some(t1));
    }

    #[test]
    fn test_payment_summary_consistency() {
        let loan = sample_loan();
        assert!(loan.payment_summary_consistent(Money::from_str_exact("0.05").unwrap()));
    }
}
