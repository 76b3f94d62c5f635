//! Principal and member-number types
//!
//! Identity values handed to the profile pipeline by the auth collaborator
//! and the email audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use super::DomainError;

/// Metadata key under which the auth collaborator stores a member-number hint
pub const MEMBER_NUMBER_HINT_KEY: &str = "member_number";

/// Association member number (e.g. `M0042`).
///
/// # Invariants
/// - Never empty
/// - No leading or trailing whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemberNumber(String);

impl MemberNumber {
    /// Parse a raw value, trimming whitespace. Blank input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MemberNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        MemberNumber::parse(&value).ok_or(DomainError::InvalidMemberNumber)
    }
}

impl From<MemberNumber> for String {
    fn from(number: MemberNumber) -> Self {
        number.0
    }
}

/// Authenticated identity issued by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Principal {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Member number embedded in the account metadata, if any
    pub fn member_number_hint(&self) -> Option<MemberNumber> {
        self.metadata
            .get(MEMBER_NUMBER_HINT_KEY)
            .and_then(Value::as_str)
            .and_then(MemberNumber::parse)
    }
}

/// One row of the email audit trail: which member number a principal used.
///
/// Rows are written by the sign-up flow and are only ever read here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub auth_user_id: Uuid,
    pub member_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn member_number(&self) -> Option<MemberNumber> {
        self.member_number.as_deref().and_then(MemberNumber::parse)
    }
}
