use sea_orm::{DbErr, SqlErr, TransactionError};
use thiserror::Error;

/// Errors of the badge domain. Every operation that mutates or reads
/// the store reports one of these kinds.
#[derive(Debug, Error)]
pub enum BadgeError {
    /// Malformed input, nothing was written
    #[error("validation: {0}")]
    Validation(String),

    /// Duplicate active credential or duplicate unique field
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown worker, credential, photo or token
    #[error("not found: {0}")]
    NotFound(String),

    /// The backing store failed or is unavailable
    #[error("storage: {0}")]
    Storage(String),
}

pub type BadgeResult<T> = Result<T, BadgeError>;

impl BadgeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        BadgeError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        BadgeError::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        BadgeError::NotFound(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        BadgeError::Storage(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, BadgeError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BadgeError::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, BadgeError::Validation(_))
    }
}

impl From<DbErr> for BadgeError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg)) => BadgeError::Conflict(msg),
            _ => match err {
                DbErr::RecordNotFound(msg) => BadgeError::NotFound(msg),
                other => BadgeError::Storage(other.to_string()),
            },
        }
    }
}

impl From<TransactionError<BadgeError>> for BadgeError {
    fn from(err: TransactionError<BadgeError>) -> Self {
        match err {
            TransactionError::Connection(db_err) => db_err.into(),
            TransactionError::Transaction(err) => err,
        }
    }
}

impl From<validator::ValidationErrors> for BadgeError {
    fn from(errs: validator::ValidationErrors) -> Self {
        BadgeError::Validation(errs.to_string())
    }
}

impl From<serde_json::Error> for BadgeError {
    fn from(err: serde_json::Error) -> Self {
        BadgeError::Storage(format!("encode snapshot: {}", err))
    }
}
