//! Collaborator ports
//!
//! Traits the profile pipeline depends on. Postgres implementations live in
//! `crate::store`; in-process ones in [`super::memory`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AuditRecord, MemberNumber, MemberRecord, Notification, Principal, UserRole};

use super::FetchError;

/// Supplies the principal behind an access token.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// `Ok(None)` means there is no live session.
    async fn current_principal(&self, access_token: &str) -> Result<Option<Principal>, FetchError>;

    /// End the session behind `access_token`. Unknown tokens are ignored.
    async fn end_session(&self, access_token: &str) -> Result<(), FetchError>;
}

/// Read-only queries over members, roles and the email audit trail.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Most recent audit record for the principal
    async fn latest_audit_record(&self, principal_id: Uuid) -> Result<Option<AuditRecord>, FetchError>;

    /// Members linked to the principal with nested relations, newest
    /// `updated_at` first, at most `limit` rows
    async fn linked_members(&self, principal_id: Uuid, limit: i64) -> Result<Vec<MemberRecord>, FetchError>;

    /// Whether any member is already linked to the principal
    async fn has_linked_member(&self, principal_id: Uuid) -> Result<bool, FetchError>;

    async fn role_assignments(&self, principal_id: Uuid) -> Result<Vec<UserRole>, FetchError>;
}

/// Result reported by the profile matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MatchOutcome {
    pub fn linked() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Links a principal to the member record carrying `member_number`.
///
/// Implementations are a no-op when the link already exists.
#[async_trait]
pub trait ProfileMatcher: Send + Sync {
    async fn match_and_link(&self, principal_id: Uuid, member_number: &MemberNumber) -> MatchOutcome;
}

/// Receives user-visible notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}
