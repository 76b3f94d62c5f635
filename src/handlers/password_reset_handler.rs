//! Password Reset Handler
//!
//! Verifies a member number and email pair, stores a hashed single-use
//! token and queues the reset mail.

use chrono::{Duration, Utc};
use rand::RngCore;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{DomainError, OperationContext};
use crate::email::{EmailRelay, OutboundEmail};
use crate::error::AppError;
use crate::store::hash_token;

use super::commands::{PasswordResetResult, RequestPasswordResetCommand};

/// Bytes of randomness in a reset token
const TOKEN_BYTES: usize = 32;

/// Where reset links point and how long they stay valid
#[derive(Debug, Clone)]
pub struct PasswordResetSettings {
    pub base_url: String,
    pub token_ttl: Duration,
}

impl PasswordResetSettings {
    /// `<base>/reset-password?token=<token>`
    pub fn reset_link(&self, token: &str) -> String {
        format!("{}/reset-password?token={}", self.base_url.trim_end_matches('/'), token)
    }
}

/// Fresh random reset token, hex encoded
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Case-insensitive comparison of the stored and supplied addresses
pub fn email_matches(stored: Option<&str>, supplied: &str) -> bool {
    stored.is_some_and(|stored| stored.trim().eq_ignore_ascii_case(supplied.trim()))
}

pub struct PasswordResetHandler {
    pool: PgPool,
    relay: Arc<dyn EmailRelay>,
    settings: PasswordResetSettings,
    audit: AuditLogService,
}

impl PasswordResetHandler {
    pub fn new(pool: PgPool, relay: Arc<dyn EmailRelay>, settings: PasswordResetSettings) -> Self {
        Self {
            audit: AuditLogService::new(pool.clone()),
            pool,
            relay,
            settings,
        }
    }

    pub async fn execute(
        &self,
        command: RequestPasswordResetCommand,
        context: &OperationContext,
    ) -> Result<PasswordResetResult, AppError> {
        let (member_number, email) = command.validate()?;

        tracing::info!(
            member_number = %member_number,
            correlation_id = %context.correlation_id(),
            "Starting password reset"
        );

        let member: Option<(Uuid, Option<String>)> =
            sqlx::query_as("SELECT id, email FROM members WHERE member_number = $1")
                .bind(member_number.as_str())
                .fetch_optional(&self.pool)
                .await?;

        let (member_id, stored_email) =
            member.ok_or_else(|| DomainError::MemberNotFound(member_number.to_string()))?;

        if !email_matches(stored_email.as_deref(), &email) {
            tracing::warn!(member_number = %member_number, "Password reset email mismatch");
            return Err(DomainError::EmailMismatch.into());
        }

        let token = generate_token();
        let expires_at = Utc::now() + self.settings.token_ttl;

        // Token row and outbox row share one transaction and one connection
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (id, member_id, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(member_id)
        .bind(hash_token(&token))
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        let email_id = self
            .relay
            .enqueue(
                &mut *tx,
                OutboundEmail::password_reset(&email, &member_number, &self.settings.reset_link(&token)),
            )
            .await?;

        tx.commit().await?;

        self.audit
            .record(
                AuditLogBuilder::new(AuditAction::PasswordResetRequested).resource("Member", member_id),
                context,
            )
            .await;

        tracing::info!(member_number = %member_number, email_id = %email_id, "Password reset email queued");

        Ok(PasswordResetResult {
            member_number: member_number.to_string(),
            email_id,
            expires_at,
        })
    }
}
