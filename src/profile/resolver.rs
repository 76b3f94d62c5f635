//! Identity Resolver
//!
//! Works out which member number belongs to a principal and, when the
//! principal has no member linked yet, asks the profile matcher to link
//! the two.

use std::sync::Arc;

use crate::domain::{MemberNumber, Principal};

use super::ports::{ProfileMatcher, ProfileStore};
use super::LinkingWarning;

/// Outcome of resolving a principal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// `None` when neither the audit trail nor the metadata names a member
    pub member_number: Option<MemberNumber>,
    pub warning: Option<LinkingWarning>,
}

pub struct IdentityResolver {
    store: Arc<dyn ProfileStore>,
    matcher: Arc<dyn ProfileMatcher>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn ProfileStore>, matcher: Arc<dyn ProfileMatcher>) -> Self {
        Self { store, matcher }
    }

    /// Member number for `principal`: the latest audit record first, then
    /// the metadata hint. An unreadable audit trail counts as empty.
    pub async fn member_number_for(&self, principal: &Principal) -> Option<MemberNumber> {
        let from_audit = match self.store.latest_audit_record(principal.id).await {
            Ok(record) => record.and_then(|r| r.member_number()),
            Err(e) => {
                tracing::error!(principal_id = %principal.id, error = %e, "Failed to fetch email audit");
                None
            }
        };

        from_audit.or_else(|| principal.member_number_hint())
    }

    /// Resolve the member number and link it to the principal unless a
    /// member is already linked.
    ///
    /// A failed link is returned as a warning; it never aborts the caller.
    pub async fn resolve(&self, principal: &Principal) -> Resolution {
        let Some(member_number) = self.member_number_for(principal).await else {
            tracing::debug!(principal_id = %principal.id, "No member number for principal");
            return Resolution::default();
        };

        tracing::debug!(
            principal_id = %principal.id,
            member_number = %member_number,
            "Resolved member number"
        );

        let skip_matcher = match self.store.has_linked_member(principal.id).await {
            Ok(linked) => linked,
            // The member query that follows reports the outage
            Err(e) => {
                tracing::error!(principal_id = %principal.id, error = %e, "Link check failed, skipping matcher");
                true
            }
        };
        if skip_matcher {
            tracing::debug!(principal_id = %principal.id, "Matcher not called");
            return Resolution {
                member_number: Some(member_number),
                warning: None,
            };
        }

        let outcome = self.matcher.match_and_link(principal.id, &member_number).await;
        let warning = if outcome.success {
            None
        } else {
            let message = outcome
                .error
                .unwrap_or_else(|| "Unable to link your account to a member record".to_string());
            tracing::warn!(
                principal_id = %principal.id,
                member_number = %member_number,
                error = %message,
                "Profile matching failed"
            );
            Some(LinkingWarning {
                member_number: member_number.clone(),
                message,
            })
        };

        Resolution {
            member_number: Some(member_number),
            warning,
        }
    }
}
