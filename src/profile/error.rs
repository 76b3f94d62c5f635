//! Profile pipeline errors
//!
//! `NotFound` is not an error here: a missing member is `Ok(None)`.

use std::fmt;

use crate::domain::{MemberNumber, Notification};

/// A failed collaborator query. Retryable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed: {cause}")]
pub struct FetchError {
    pub operation: &'static str,
    pub cause: String,
}

impl FetchError {
    pub fn new(operation: &'static str, cause: impl fmt::Display) -> Self {
        Self {
            operation,
            cause: cause.to_string(),
        }
    }
}

/// Terminal outcomes of a profile load other than success.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    /// No session for the supplied credentials
    #[error("No active session")]
    Unauthenticated,

    /// A query failed and was not retried
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Every automatic attempt of a fetch cycle failed
    #[error("Profile fetch failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: FetchError },
}

impl ProfileError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}

/// Non-fatal failure to link a principal to its member record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkingWarning {
    pub member_number: MemberNumber,
    pub message: String,
}

impl LinkingWarning {
    pub fn notification(&self) -> Notification {
        Notification::profile_error(self.message.clone())
    }
}

impl fmt::Display for LinkingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "linking {} failed: {}", self.member_number, self.message)
    }
}
