//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

/// Validation and business rule failures for member operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Member number is blank
    #[error("Member number must not be empty")]
    InvalidMemberNumber,

    /// Email address does not look like `local@domain.tld`
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    /// No member with this number or id
    #[error("Member not found: {0}")]
    MemberNotFound(String),

    /// Supplied email differs from the one on record
    #[error("The email address does not match our records")]
    EmailMismatch,

    /// Attempt to change a field that is fixed after registration
    #[error("Field cannot be changed: {0}")]
    ImmutableField(&'static str),

    /// Required text field is empty after trimming
    #[error("Field must not be blank: {0}")]
    BlankField(&'static str),

    /// Update request carries no changes
    #[error("No fields to update")]
    NoChanges,

    /// Sort column outside the directory whitelist
    #[error("Unsupported sort field: {0}")]
    InvalidSortField(String),

    /// Non-admin directory access without a collector record
    #[error("Collector ID not found")]
    CollectorRequired,
}

impl DomainError {
    /// The request named a member that does not exist. Every other variant
    /// rejects the input itself.
    pub fn is_lookup_miss(&self) -> bool {
        matches!(self, Self::MemberNotFound(_))
    }
}

/// Validate an email address the way the reset and edit forms do:
/// something, `@`, something, `.`, something, with no whitespace.
pub fn validate_email(email: &str) -> Result<(), DomainError> {
    let invalid = || DomainError::InvalidEmail(email.to_string());

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) if !host.is_empty() && !tld.is_empty() => Ok(()),
        _ => Err(invalid()),
    }
}
