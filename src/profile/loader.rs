//! Member Aggregate Loader
//!
//! One pass of the profile fetch: resolve identity, read the member and its
//! relations, read role assignments, merge.

use std::sync::Arc;

use crate::domain::{MemberAggregate, MemberRecord, Principal};

use super::ports::ProfileStore;
use super::resolver::IdentityResolver;
use super::{FetchError, LinkingWarning};

/// Member rows requested per load. Only the newest is ever used.
const MEMBER_QUERY_LIMIT: i64 = 1;

/// Result of one successful load
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Loaded {
    /// `None` when the principal has no member record yet
    pub aggregate: Option<MemberAggregate>,
    pub warnings: Vec<LinkingWarning>,
}

pub struct MemberAggregateLoader {
    store: Arc<dyn ProfileStore>,
    resolver: IdentityResolver,
}

impl MemberAggregateLoader {
    pub fn new(store: Arc<dyn ProfileStore>, resolver: IdentityResolver) -> Self {
        Self { store, resolver }
    }

    pub async fn load(&self, principal: &Principal) -> Result<Loaded, FetchError> {
        let resolution = self.resolver.resolve(principal).await;

        let members = self
            .store
            .linked_members(principal.id, MEMBER_QUERY_LIMIT)
            .await?;
        let roles = self.store.role_assignments(principal.id).await?;

        let aggregate = select_current(members).map(|record| {
            tracing::debug!(
                principal_id = %principal.id,
                member_id = %record.profile.id,
                "Loaded member record"
            );
            MemberAggregate::assemble(record, roles)
        });

        if aggregate.is_none() {
            tracing::info!(principal_id = %principal.id, "No member record linked to principal");
        }

        Ok(Loaded {
            aggregate,
            warnings: resolution.warning.into_iter().collect(),
        })
    }
}

/// The most recently updated record; ties go to the greater member id.
fn select_current(records: Vec<MemberRecord>) -> Option<MemberRecord> {
    records
        .into_iter()
        .max_by(|a, b| {
            a.profile
                .updated_at
                .cmp(&b.profile.updated_at)
                .then_with(|| a.profile.id.cmp(&b.profile.id))
        })
}
