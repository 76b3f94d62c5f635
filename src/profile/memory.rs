//! In-process collaborators
//!
//! Memory-backed implementations of the profile ports, for tests and local
//! runs without Postgres. Each keeps counters so callers can observe how
//! often the pipeline hit it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{AuditRecord, MemberNumber, MemberRecord, Principal, UserRole};

use super::ports::{AuthProvider, MatchOutcome, ProfileMatcher, ProfileStore};
use super::FetchError;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct StoreState {
    audit: Vec<AuditRecord>,
    members: Vec<(Uuid, MemberRecord)>,
    roles: Vec<(Uuid, UserRole)>,
    member_failures: u32,
    audit_unavailable: bool,
    latency: Duration,
}

/// Memory-backed [`ProfileStore`].
#[derive(Default)]
pub struct InMemoryProfileStore {
    state: Mutex<StoreState>,
    member_queries: AtomicUsize,
    role_queries: AtomicUsize,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_audit_record(&self, record: AuditRecord) {
        locked(&self.state).audit.push(record);
    }

    /// Link a member record to a principal
    pub fn link_member(&self, principal_id: Uuid, record: MemberRecord) {
        locked(&self.state).members.push((principal_id, record));
    }

    pub fn assign_role(&self, principal_id: Uuid, role: &str) {
        locked(&self.state).roles.push((principal_id, UserRole::new(role)));
    }

    /// Make the next `count` member queries fail
    pub fn fail_member_queries(&self, count: u32) {
        locked(&self.state).member_failures = count;
    }

    /// Make audit lookups fail until further notice
    pub fn set_audit_unavailable(&self, unavailable: bool) {
        locked(&self.state).audit_unavailable = unavailable;
    }

    /// Delay applied to every member query
    pub fn set_latency(&self, latency: Duration) {
        locked(&self.state).latency = latency;
    }

    pub fn member_query_count(&self) -> usize {
        self.member_queries.load(Ordering::SeqCst)
    }

    pub fn role_query_count(&self) -> usize {
        self.role_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn latest_audit_record(&self, principal_id: Uuid) -> Result<Option<AuditRecord>, FetchError> {
        let state = locked(&self.state);
        if state.audit_unavailable {
            return Err(FetchError::new("email audit query", "audit trail unavailable"));
        }
        Ok(state
            .audit
            .iter()
            .filter(|r| r.auth_user_id == principal_id)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn linked_members(&self, principal_id: Uuid, limit: i64) -> Result<Vec<MemberRecord>, FetchError> {
        self.member_queries.fetch_add(1, Ordering::SeqCst);

        let latency = locked(&self.state).latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = locked(&self.state);
        if state.member_failures > 0 {
            state.member_failures -= 1;
            return Err(FetchError::new("member query", "connection refused"));
        }

        let mut members: Vec<MemberRecord> = state
            .members
            .iter()
            .filter(|(owner, _)| *owner == principal_id)
            .map(|(_, record)| record.clone())
            .collect();
        members.sort_by(|a, b| b.profile.updated_at.cmp(&a.profile.updated_at));
        members.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(members)
    }

    async fn has_linked_member(&self, principal_id: Uuid) -> Result<bool, FetchError> {
        Ok(locked(&self.state)
            .members
            .iter()
            .any(|(owner, _)| *owner == principal_id))
    }

    async fn role_assignments(&self, principal_id: Uuid) -> Result<Vec<UserRole>, FetchError> {
        self.role_queries.fetch_add(1, Ordering::SeqCst);
        Ok(locked(&self.state)
            .roles
            .iter()
            .filter(|(owner, _)| *owner == principal_id)
            .map(|(_, role)| role.clone())
            .collect())
    }
}

/// Token → principal table standing in for the auth service.
#[derive(Default)]
pub struct StaticAuthProvider {
    sessions: Mutex<HashMap<String, Principal>>,
}

impl StaticAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, access_token: &str, principal: Principal) {
        locked(&self.sessions).insert(access_token.to_string(), principal);
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn current_principal(&self, access_token: &str) -> Result<Option<Principal>, FetchError> {
        Ok(locked(&self.sessions).get(access_token).cloned())
    }

    async fn end_session(&self, access_token: &str) -> Result<(), FetchError> {
        locked(&self.sessions).remove(access_token);
        Ok(())
    }
}

/// [`ProfileMatcher`] that records every call and answers with a fixed outcome.
pub struct RecordingMatcher {
    outcome: MatchOutcome,
    calls: Mutex<Vec<(Uuid, MemberNumber)>>,
}

impl RecordingMatcher {
    pub fn succeeding() -> Self {
        Self::with_outcome(MatchOutcome::linked())
    }

    pub fn with_outcome(outcome: MatchOutcome) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Uuid, MemberNumber)> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl ProfileMatcher for RecordingMatcher {
    async fn match_and_link(&self, principal_id: Uuid, member_number: &MemberNumber) -> MatchOutcome {
        locked(&self.calls).push((principal_id, member_number.clone()));
        self.outcome.clone()
    }
}
