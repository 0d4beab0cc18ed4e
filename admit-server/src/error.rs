//! Service-level error kinds.
//!
//! Submission validation failures are not errors: they come back as a
//! field → message map in the normal result. Everything here aborts the
//! operation with no state change.

use std::fmt;

use admit_core::{Role, TransitionError, UserId};

use crate::repository::RepositoryError;

/// Why an operation was rejected.
#[derive(Debug)]
pub enum ServiceError {
    /// Caller role insufficient for the requested operation.
    Authorization { required: &'static str, role: Role },
    /// A referenced record does not exist. For bulk admin operations this
    /// is fatal for the whole operation, unlike guard mismatches which are
    /// silently skipped.
    NotFound { what: &'static str, id: UserId },
    /// An explicit business rule blocked the request.
    Business(TransitionError),
    /// The supplied input is unusable (e.g. a malformed email address).
    InvalidInput { field: &'static str, message: String },
    /// Storage failed.
    Storage(RepositoryError),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authorization { required, role } => {
                write!(f, "requires {} role, caller is {}", required, role)
            }
            Self::NotFound { what, id } => write!(f, "{} {} not found", what, id),
            Self::Business(e) => write!(f, "{}", e),
            Self::InvalidInput { field, message } => write!(f, "{}: {}", field, message),
            Self::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<TransitionError> for ServiceError {
    fn from(e: TransitionError) -> Self {
        Self::Business(e)
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(e: RepositoryError) -> Self {
        Self::Storage(e)
    }
}
