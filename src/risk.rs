use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decimal::Money;
use crate::types::RiskLevel;

/// applicant attributes fed into risk scoring
///
/// all fields default to neutral values so a partially filled profile is
/// scored rather than rejected
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicantProfile {
    pub age: u32,
    pub employment_years: u32,
    pub annual_income: Money,
    pub monthly_income: Money,
    pub savings_balance: Money,
    pub total_assets: Money,
    pub total_liabilities: Money,
    pub credit_cards: u32,
    pub existing_loans: Money,
    pub existing_monthly_debt: Money,
    pub dependents: u32,
    pub employment_status: EmploymentStatus,
    pub marital_status: MaritalStatus,
    pub education: Education,
    pub home_ownership: HomeOwnership,
    pub previous_default: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    Employed,
    SelfEmployed,
    Unemployed,
    Retired,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaritalStatus {
    Single,
    Married,
    Divorced,
    Widowed,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Education {
    HighSchool,
    College,
    Bachelor,
    Master,
    Phd,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomeOwnership {
    Own,
    Rent,
    Mortgage,
    Other,
    #[default]
    Unknown,
}

/// advisory recommendation bands, keyed off the risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Approve,
    CautiousApprove,
    RejectOrCollateralize,
    Reject,
    /// scoring degraded, decision needs a human
    ManualReview,
}

impl Recommendation {
    pub fn from_score(score: f64) -> Self {
        if score < 30.0 {
            Recommendation::Approve
        } else if score < 60.0 {
            Recommendation::CautiousApprove
        } else if score < 80.0 {
            Recommendation::RejectOrCollateralize
        } else {
            Recommendation::Reject
        }
    }

    pub fn advisory(&self) -> &'static str {
        match self {
            Recommendation::Approve => "approval recommended",
            Recommendation::CautiousApprove => "approval recommended with standard terms",
            Recommendation::RejectOrCollateralize => {
                "rejection recommended unless additional collateral is provided"
            }
            Recommendation::Reject => "rejection recommended",
            Recommendation::ManualReview => "automated assessment degraded, manual review required",
        }
    }
}

/// assessment result; scores are advisory only, the approval flow enforces
/// the binding decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 0-100, higher is riskier
    pub score: f64,
    pub level: RiskLevel,
    pub recommendation: Recommendation,
    /// set when the scorer failed and the conservative fallback was used
    pub degraded: bool,
}

impl RiskAssessment {
    fn from_score(score: f64) -> Self {
        Self {
            score,
            level: RiskLevel::from_score(score),
            recommendation: Recommendation::from_score(score),
            degraded: false,
        }
    }

    /// conservative medium-risk fallback used when scoring fails
    pub fn degraded_fallback() -> Self {
        Self {
            score: 50.0,
            level: RiskLevel::Medium,
            recommendation: Recommendation::ManualReview,
            degraded: true,
        }
    }
}

/// scorer-internal failure; never propagated past the fallback boundary
#[derive(Debug, Error)]
#[error("risk scoring failed: {message}")]
pub struct ScoringError {
    pub message: String,
}

/// pluggable scoring strategy
///
/// implementations must be deterministic for identical input and free of
/// side effects
pub trait RiskScorer: Send + Sync {
    fn assess(
        &self,
        profile: &ApplicantProfile,
        amount: Money,
        term_months: u32,
    ) -> Result<RiskAssessment, ScoringError>;
}

/// score an application, degrading to the medium-risk fallback instead of
/// failing: a scoring failure must never block intake
pub fn assess_with_fallback(
    scorer: &dyn RiskScorer,
    profile: &ApplicantProfile,
    amount: Money,
    term_months: u32,
) -> RiskAssessment {
    match scorer.assess(profile, amount, term_months) {
        Ok(assessment) => assessment,
        Err(err) => {
            tracing::warn!(error = %err, "risk scoring degraded, using fallback");
            RiskAssessment::degraded_fallback()
        }
    }
}

/// default tier-based heuristic, available without a fitted model
///
/// starts from a neutral 50 and moves by discrete bands of loan size,
/// term, and debt service ratio
#[derive(Debug, Clone, Default)]
pub struct TierScorer;

impl TierScorer {
    fn amount_adjustment(amount: Money) -> i32 {
        if amount <= Money::from_major(50_000) {
            -10
        } else if amount <= Money::from_major(100_000) {
            -5
        } else if amount > Money::from_major(200_000) {
            10
        } else {
            0
        }
    }

    fn term_adjustment(term_months: u32) -> i32 {
        if term_months <= 12 {
            -10
        } else if term_months <= 24 {
            -5
        } else if term_months > 36 {
            10
        } else {
            0
        }
    }

    fn debt_ratio_adjustment(profile: &ApplicantProfile) -> i32 {
        if !profile.monthly_income.is_positive() {
            return 0;
        }
        let ratio: Decimal =
            profile.existing_monthly_debt.as_decimal() / profile.monthly_income.as_decimal();
        if ratio <= dec!(0.3) {
            -10
        } else if ratio <= dec!(0.5) {
            -5
        } else if ratio > dec!(0.7) {
            10
        } else {
            0
        }
    }

    fn history_adjustment(profile: &ApplicantProfile) -> i32 {
        let mut adjustment = 0;
        if profile.previous_default {
            adjustment += 15;
        }
        if profile.employment_status == EmploymentStatus::Unemployed {
            adjustment += 10;
        }
        adjustment
    }
}

impl RiskScorer for TierScorer {
    fn assess(
        &self,
        profile: &ApplicantProfile,
        amount: Money,
        term_months: u32,
    ) -> Result<RiskAssessment, ScoringError> {
        let score = 50
            + Self::amount_adjustment(amount)
            + Self::term_adjustment(term_months)
            + Self::debt_ratio_adjustment(profile)
            + Self::history_adjustment(profile);

        let score = score.clamp(0, 100) as f64;
        Ok(RiskAssessment::from_score(score))
    }
}
