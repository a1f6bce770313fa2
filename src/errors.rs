use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

/// Error type covering budget definitions and bucket classification.
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no budget is effective on or before {0}")]
    DateRangeNotCovered(NaiveDate),
    #[error("bucket type `{0}` is system-managed and cannot be built from a persisted tag")]
    UnsupportedBucketType(String),
}

/// Error type that captures ledger book and persistence failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("data format error: {0}")]
    DataFormat(String),
    #[error("reconciliation date {attempted} is not after the latest line dated {latest}")]
    ReconciliationOutOfOrder {
        attempted: NaiveDate,
        latest: NaiveDate,
    },
    #[error("no transaction with id {0} exists in this entry")]
    TransactionNotFound(Uuid),
    #[error(transparent)]
    Budget(#[from] BudgetError),
}
