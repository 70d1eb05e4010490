//! The module contains the error the engine can throw.
//!
//! Only [`Unavailable`] is fatal for a long-running operation such as the
//! category migration: every other variant describes a problem with a single
//! document or request and is collected by callers that can keep going.
//!
//!  [`Unavailable`]: EngineError::Unavailable
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Invalid id: {0}")]
    InvalidId(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid budget period: {0}")]
    InvalidPeriod(String),
    #[error("\"{0}\" is still referenced")]
    InUse(String),
    #[error("Write failed: {0}")]
    WriteFailed(String),
    #[error("Malformed document: {0}")]
    Malformed(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Database(DbErr),
}

impl EngineError {
    /// `true` when the store itself could not be reached.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<DbErr> for EngineError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::Conn(inner) => Self::Unavailable(inner.to_string()),
            DbErr::ConnectionAcquire(inner) => Self::Unavailable(inner.to_string()),
            other => Self::Database(other),
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unavailable(a), Self::Unavailable(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidId(a), Self::InvalidId(b)) => a == b,
            (Self::InvalidName(a), Self::InvalidName(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidPeriod(a), Self::InvalidPeriod(b)) => a == b,
            (Self::InUse(a), Self::InUse(b)) => a == b,
            (Self::WriteFailed(a), Self::WriteFailed(b)) => a == b,
            (Self::Malformed(a), Self::Malformed(b)) => a == b,
            (Self::InvalidConfig(a), Self::InvalidConfig(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
