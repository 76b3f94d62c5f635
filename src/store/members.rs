//! Member, role and email audit queries

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::EmailAuditRepository;
use crate::domain::{AuditRecord, MemberRecord, UserRole};
use crate::profile::{FetchError, ProfileStore};

/// [`ProfileStore`] over Postgres.
///
/// Each member row is returned as one JSON document with its relations
/// nested, then checked against [`MemberRecord`] by serde.
#[derive(Debug, Clone)]
pub struct PgProfileStore {
    pool: PgPool,
    email_audit: EmailAuditRepository,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            email_audit: EmailAuditRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn latest_audit_record(&self, principal_id: Uuid) -> Result<Option<AuditRecord>, FetchError> {
        self.email_audit
            .latest_for(principal_id)
            .await
            .map_err(|e| FetchError::new("email audit query", e))
    }

    async fn linked_members(&self, principal_id: Uuid, limit: i64) -> Result<Vec<MemberRecord>, FetchError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            r#"
            SELECT to_jsonb(m.*) || jsonb_build_object(
                'family_members',
                (SELECT jsonb_agg(to_jsonb(f.*) ORDER BY f.created_at)
                 FROM family_members f WHERE f.member_id = m.id),
                'member_notes',
                (SELECT jsonb_agg(to_jsonb(n.*) ORDER BY n.created_at)
                 FROM member_notes n WHERE n.member_id = m.id),
                'payment_requests',
                (SELECT jsonb_agg(to_jsonb(p.*) ORDER BY p.created_at DESC)
                 FROM payment_requests p WHERE p.member_number = m.member_number)
            )
            FROM members m
            WHERE m.auth_user_id = $1
            ORDER BY m.updated_at DESC
            LIMIT $2
            "#,
        )
        .bind(principal_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FetchError::new("member query", e))?;

        rows.into_iter()
            .map(|(document,)| {
                serde_json::from_value(document).map_err(|e| FetchError::new("member row decode", e))
            })
            .collect()
    }

    async fn has_linked_member(&self, principal_id: Uuid) -> Result<bool, FetchError> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM members WHERE auth_user_id = $1)")
            .bind(principal_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| FetchError::new("link check", e))
    }

    async fn role_assignments(&self, principal_id: Uuid) -> Result<Vec<UserRole>, FetchError> {
        let roles: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT role::text
            FROM user_roles
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FetchError::new("role query", e))?;

        Ok(roles.into_iter().map(UserRole::new).collect())
    }
}
