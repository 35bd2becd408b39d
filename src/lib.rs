pub mod amortization;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod ledger;
pub mod lifecycle;
pub mod notifications;
pub mod risk;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod types;

// re-export key types
pub use amortization::{InstallmentSchedule, ScheduledInstallment};
pub use config::{LateFeePolicy, RatePolicy, ScanPolicy, ServicingConfig, ValidationLimits};
pub use decimal::{Money, Rate};
pub use errors::{Result, ServicingError};
pub use ledger::{Bill, RepaymentRecord, RepaymentSummary};
pub use lifecycle::{transition, LoanApplication};
pub use notifications::{Notification, NotificationSink, NullSink, RecordingSink};
pub use risk::{
    ApplicantProfile, Recommendation, RiskAssessment, RiskScorer, ScoringError, TierScorer,
};
pub use scheduler::{BillScanner, ScanReport, ScannerHandle};
pub use service::{Actor, LoanRequest, LoanService, RiskPreview};
pub use store::LoanStore;
pub use types::{
    BillId, BillStatus, Decision, LoanId, LoanStatus, NotificationCategory, NotificationId,
    RepaymentStatus, RiskLevel, Role, UserId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
