use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// unique identifier for a loan application
pub type LoanId = Uuid;

/// unique identifier for a user
pub type UserId = Uuid;

/// unique identifier for a bill
pub type BillId = Uuid;

/// unique identifier for a notification
pub type NotificationId = Uuid;

/// actor roles in the approval flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Applicant,
    Manager,
    President,
}

/// loan application status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    /// submitted by applicant, awaiting manager assessment
    Submitted,
    /// manager recommends approval, awaiting president decision
    ManagerRecommendedApprove,
    /// manager recommends rejection, awaiting president decision
    ManagerRecommendedReject,
    /// approved by president, bills generated
    Approved,
    /// rejected by president
    Rejected,
}

impl LoanStatus {
    /// terminal states accept no further decisions
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Approved | LoanStatus::Rejected)
    }

    /// manager recommendation stage, either outcome
    pub fn is_manager_recommended(&self) -> bool {
        matches!(
            self,
            LoanStatus::ManagerRecommendedApprove | LoanStatus::ManagerRecommendedReject
        )
    }
}

/// review decisions, across both approval stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// manager: recommend approval to the president
    RecommendApprove,
    /// manager: recommend rejection to the president
    RecommendReject,
    /// president: binding approval
    Approve,
    /// president: binding rejection
    Reject,
}

/// bill status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillStatus {
    /// awaiting payment
    Pending,
    /// settled
    Paid,
    /// past due date, unpaid
    Overdue,
}

/// settlement timing recorded on a repayment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepaymentStatus {
    OnTime,
    Late,
}

/// risk level bands, higher score means riskier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// score below 30
    Low,
    /// score 30-59
    Medium,
    /// score 60-79
    High,
    /// score 80 and above
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 30.0 {
            RiskLevel::Low
        } else if score < 60.0 {
            RiskLevel::Medium
        } else if score < 80.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low risk",
            RiskLevel::Medium => "medium risk",
            RiskLevel::High => "high risk",
            RiskLevel::Critical => "critical risk",
        }
    }
}

/// notification categories on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationCategory {
    ApplicationSubmitted,
    ApplicationDecided,
    RepaymentReminder,
    OverdueReminder,
    CollectionNotice,
}
