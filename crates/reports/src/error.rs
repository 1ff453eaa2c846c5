//! Report error types.

use chrono::{DateTime, Utc};
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while building a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The caller may not read this data, or another domain rule failed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The reporting window ends before it starts.
    #[error("Invalid report window: {from} is after {to}")]
    InvalidRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;
