//! Session lookup
//!
//! Bearer tokens are matched against `auth_sessions.token_hash`; the
//! principal's metadata comes from `auth_users.raw_user_meta_data`.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::Principal;
use crate::profile::{AuthProvider, FetchError};

use super::hash_token;

#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthProvider for PgSessionStore {
    async fn current_principal(&self, access_token: &str) -> Result<Option<Principal>, FetchError> {
        let row: Option<(Uuid, Option<serde_json::Value>)> = sqlx::query_as(
            r#"
            SELECT u.id, u.raw_user_meta_data
            FROM auth_sessions s
            JOIN auth_users u ON u.id = s.user_id
            WHERE s.token_hash = $1
              AND s.revoked_at IS NULL
              AND s.expires_at > NOW()
            "#,
        )
        .bind(hash_token(access_token))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FetchError::new("session lookup", e))?;

        Ok(row.map(|(id, metadata)| {
            let mut principal = Principal::new(id);
            if let Some(serde_json::Value::Object(map)) = metadata {
                principal.metadata = map;
            }
            principal
        }))
    }

    async fn end_session(&self, access_token: &str) -> Result<(), FetchError> {
        let revoked = sqlx::query(
            r#"
            UPDATE auth_sessions
            SET revoked_at = NOW()
            WHERE token_hash = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(hash_token(access_token))
        .execute(&self.pool)
        .await
        .map_err(|e| FetchError::new("session revoke", e))?
        .rows_affected();

        tracing::debug!(revoked = revoked, "Session ended");
        Ok(())
    }
}
