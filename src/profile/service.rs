//! Profile service
//!
//! Entry point used by the HTTP layer: authenticates the caller, runs the
//! orchestrated load and turns outcomes into user notifications.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{MemberAggregate, Notification, Principal};

use super::loader::MemberAggregateLoader;
use super::orchestrator::{FetchOrchestrator, FetchOutcome, FetchPolicy};
use super::ports::{AuthProvider, Notifier, ProfileMatcher, ProfileStore};
use super::resolver::IdentityResolver;
use super::{FetchError, ProfileError};

pub struct ProfileService {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn ProfileStore>,
    orchestrator: FetchOrchestrator,
}

impl ProfileService {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn ProfileStore>,
        matcher: Arc<dyn ProfileMatcher>,
        policy: FetchPolicy,
    ) -> Self {
        let resolver = IdentityResolver::new(Arc::clone(&store), matcher);
        let loader = Arc::new(MemberAggregateLoader::new(Arc::clone(&store), resolver));

        Self {
            auth,
            store,
            orchestrator: FetchOrchestrator::new(loader, policy),
        }
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator {
        &self.orchestrator
    }

    /// Principal behind `access_token`. A missing session raises the
    /// "Session Expired" notification.
    pub async fn authenticate(
        &self,
        access_token: &str,
        notifier: &dyn Notifier,
    ) -> Result<Principal, ProfileError> {
        match self.auth.current_principal(access_token).await? {
            Some(principal) => Ok(principal),
            None => {
                tracing::info!("No active session for access token");
                notifier.notify(Notification::session_expired());
                Err(ProfileError::Unauthenticated)
            }
        }
    }

    /// Current member aggregate of the caller; `Ok(None)` when no member
    /// record is linked yet.
    pub async fn load(
        &self,
        access_token: &str,
        notifier: &dyn Notifier,
    ) -> Result<Option<MemberAggregate>, ProfileError> {
        let principal = self.authenticate(access_token, notifier).await?;
        Ok(self.load_for(&principal, notifier).await?.aggregate)
    }

    /// Orchestrated load for an already authenticated principal.
    pub async fn load_for(
        &self,
        principal: &Principal,
        notifier: &dyn Notifier,
    ) -> Result<FetchOutcome, ProfileError> {
        match self.orchestrator.load(principal).await {
            Ok(outcome) => {
                for warning in &outcome.warnings {
                    notifier.notify(warning.notification());
                }
                if let Some(err) = &outcome.refresh_error {
                    tracing::info!(principal_id = %principal.id, error = %err, "Reporting failed background refresh");
                    if matches!(err, ProfileError::Exhausted { .. }) {
                        notifier.notify(Notification::fetch_exhausted());
                    }
                }
                Ok(outcome)
            }
            Err(err) => {
                if matches!(err, ProfileError::Exhausted { .. }) {
                    notifier.notify(Notification::fetch_exhausted());
                }
                Err(err)
            }
        }
    }

    /// End the session and forget the cached profile.
    pub async fn logout(&self, access_token: &str) -> Result<(), ProfileError> {
        let principal = self.auth.current_principal(access_token).await?;
        self.auth.end_session(access_token).await?;

        if let Some(principal) = principal {
            self.orchestrator.reset(principal.id).await;
            tracing::info!(principal_id = %principal.id, "Logged out");
        }
        Ok(())
    }

    /// Role names of a principal, read straight from the role query.
    pub async fn roles(&self, principal_id: Uuid) -> Result<Vec<String>, FetchError> {
        Ok(self
            .store
            .role_assignments(principal_id)
            .await?
            .into_iter()
            .map(|r| r.role)
            .collect())
    }

    /// Forget the cached profile of `principal_id`, e.g. after an edit.
    pub async fn invalidate(&self, principal_id: Uuid) {
        self.orchestrator.reset(principal_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::member::fixtures;
    use crate::domain::{MemberRecord, Severity};
    use crate::profile::memory::{InMemoryProfileStore, RecordingMatcher, StaticAuthProvider};
    use crate::profile::{MatchOutcome, NotificationBuffer};
    use chrono::Utc;

    struct Harness {
        service: ProfileService,
        store: Arc<InMemoryProfileStore>,
        auth: Arc<StaticAuthProvider>,
        principal: Principal,
    }

    fn harness(matcher: RecordingMatcher) -> Harness {
        let store = Arc::new(InMemoryProfileStore::new());
        let auth = Arc::new(StaticAuthProvider::new());
        let principal = Principal::new(Uuid::new_v4()).with_metadata("member_number", "M0042");
        auth.issue("token-1", principal.clone());
        store.link_member(principal.id, MemberRecord::new(fixtures::profile("M0042", Utc::now())));

        let service = ProfileService::new(auth.clone(), store.clone(), Arc::new(matcher), FetchPolicy::default());
        Harness {
            service,
            store,
            auth,
            principal,
        }
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthenticated() {
        let h = harness(RecordingMatcher::succeeding());
        let notifications = NotificationBuffer::new();

        let err = h.service.load("nope", &notifications).await.unwrap_err();

        assert_eq!(err, ProfileError::Unauthenticated);
        assert_eq!(notifications.take(), vec![Notification::session_expired()]);
        assert_eq!(h.store.member_query_count(), 0);
    }

    #[tokio::test]
    async fn test_load_returns_aggregate() {
        let h = harness(RecordingMatcher::succeeding());
        let notifications = NotificationBuffer::new();

        let member = h.service.load("token-1", &notifications).await.unwrap().unwrap();

        assert_eq!(member.member_number(), "M0042");
        assert!(notifications.take().is_empty());
    }

    #[tokio::test]
    async fn test_linking_failure_notifies() {
        let h = harness(RecordingMatcher::with_outcome(MatchOutcome::failed("No member found")));
        h.auth.issue(
            "token-2",
            Principal::new(Uuid::new_v4()).with_metadata("member_number", "M0077"),
        );
        let notifications = NotificationBuffer::new();

        let member = h.service.load("token-2", &notifications).await.unwrap();

        assert!(member.is_none());
        let raised = notifications.take();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].severity, Severity::Destructive);
        assert_eq!(raised[0].description, "No member found");
    }

    #[tokio::test]
    async fn test_linked_principal_gets_no_linking_notification() {
        let h = harness(RecordingMatcher::with_outcome(MatchOutcome::failed("No member found")));
        let notifications = NotificationBuffer::new();

        let member = h.service.load("token-1", &notifications).await.unwrap();

        assert_eq!(member.unwrap().member_number(), "M0042");
        assert!(notifications.take().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_notifies() {
        let h = harness(RecordingMatcher::succeeding());
        h.store.fail_member_queries(u32::MAX);
        let notifications = NotificationBuffer::new();

        let err = h.service.load("token-1", &notifications).await.unwrap_err();

        assert!(matches!(err, ProfileError::Exhausted { attempts: 3, .. }));
        assert_eq!(notifications.take(), vec![Notification::fetch_exhausted()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_background_refresh_notifies_once() {
        let h = harness(RecordingMatcher::succeeding());
        let notifications = NotificationBuffer::new();
        h.service.load("token-1", &notifications).await.unwrap();

        tokio::time::advance(std::time::Duration::from_secs(31)).await;
        h.store.fail_member_queries(3);
        assert!(h.service.load("token-1", &notifications).await.unwrap().is_some());
        assert!(notifications.take().is_empty());

        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        let member = h.service.load("token-1", &notifications).await.unwrap();

        assert_eq!(member.unwrap().member_number(), "M0042");
        assert_eq!(notifications.take(), vec![Notification::fetch_exhausted()]);

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        h.service.load("token-1", &notifications).await.unwrap();
        assert!(notifications.take().is_empty());
    }

    #[tokio::test]
    async fn test_logout_resets_cache_and_session() {
        let h = harness(RecordingMatcher::succeeding());
        let notifications = NotificationBuffer::new();
        h.service.load("token-1", &notifications).await.unwrap();
        assert_eq!(h.service.orchestrator().len().await, 1);

        h.service.logout("token-1").await.unwrap();

        assert!(h.service.orchestrator().is_empty().await);
        assert!(h.auth.current_principal("token-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_roles() {
        let h = harness(RecordingMatcher::succeeding());
        h.store.assign_role(h.principal.id, "admin");

        let roles = h.service.roles(h.principal.id).await.unwrap();

        assert_eq!(roles, vec!["admin".to_string()]);
    }
}
