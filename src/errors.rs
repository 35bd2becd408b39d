use thiserror::Error;
use uuid::Uuid;

use crate::types::LoanStatus;

#[derive(Error, Debug)]
pub enum ServicingError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
    },

    #[error("invalid transition for loan {loan_id}: current status {status:?}")]
    InvalidTransition {
        loan_id: Uuid,
        status: LoanStatus,
    },

    #[error("forbidden: {message}")]
    Forbidden {
        message: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: Uuid,
    },

    #[error("bill already settled: {bill_id}")]
    AlreadySettled {
        bill_id: Uuid,
    },

    #[error("bills already generated for loan {loan_id}")]
    BillsAlreadyGenerated {
        loan_id: Uuid,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, ServicingError>;
