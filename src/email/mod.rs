//! Email relay
//!
//! Outbound mail is not delivered by this service. Messages are queued in
//! `email_outbox` for the relay worker, subject to an hourly send limit.
//! Queueing runs on the caller's connection, so the outbox row commits or
//! rolls back together with whatever the caller wrote before it.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::{validate_email, MemberNumber};

/// Template name of the password reset mail
pub const PASSWORD_RESET_TEMPLATE: &str = "password_reset";

/// A message handed to the relay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub variables: serde_json::Value,
}

impl OutboundEmail {
    pub fn password_reset(to: &str, member_number: &MemberNumber, reset_url: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Reset your password".to_string(),
            template: PASSWORD_RESET_TEMPLATE.to_string(),
            variables: json!({
                "resetUrl": reset_url,
                "memberNumber": member_number.as_str(),
            }),
        }
    }

    /// Required fields present and recipient well formed
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.subject.trim().is_empty() || self.template.trim().is_empty() {
            return Err(RelayError::Invalid(
                "Missing required fields: to, subject and template".to_string(),
            ));
        }
        validate_email(&self.to).map_err(|e| RelayError::Invalid(e.to_string()))
    }
}

/// Queues outbound email for delivery.
#[async_trait]
pub trait EmailRelay: Send + Sync {
    /// Queue `email` on `conn`, normally an open transaction of the caller.
    /// Returns the id of the queued message.
    async fn enqueue(&self, conn: &mut PgConnection, email: OutboundEmail) -> Result<Uuid, RelayError>;
}

/// [`EmailRelay`] writing to the `email_outbox` table.
#[derive(Debug, Clone)]
pub struct PgOutboxRelay {
    hourly_limit: u32,
}

impl PgOutboxRelay {
    pub fn new(hourly_limit: u32) -> Self {
        Self { hourly_limit }
    }
}

#[async_trait]
impl EmailRelay for PgOutboxRelay {
    async fn enqueue(&self, conn: &mut PgConnection, email: OutboundEmail) -> Result<Uuid, RelayError> {
        email.validate()?;

        // Held until the caller's transaction ends; the limit check and insert agree
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('email_outbox'))")
            .execute(&mut *conn)
            .await?;

        let sent_last_hour: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM email_outbox WHERE created_at > NOW() - INTERVAL '1 hour'",
        )
        .fetch_one(&mut *conn)
        .await?;

        if sent_last_hour >= i64::from(self.hourly_limit) {
            tracing::warn!(
                limit = self.hourly_limit,
                sent_last_hour = sent_last_hour,
                "Email rate limit reached"
            );
            return Err(RelayError::RateLimited {
                limit: self.hourly_limit,
            });
        }

        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO email_outbox (id, recipient, subject, template, variables, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&email.to)
        .bind(&email.subject)
        .bind(&email.template)
        .bind(&email.variables)
        .fetch_one(&mut *conn)
        .await?;

        tracing::info!(email_id = %id, template = %email.template, "Email queued");
        Ok(id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited { limit: u32 },

    #[error("Invalid email: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_reset_email() {
        let number = MemberNumber::parse("M0042").unwrap();
        let email = OutboundEmail::password_reset(
            "amina@example.org",
            &number,
            "https://members.example.org/reset-password?token=abc",
        );

        assert_eq!(email.template, PASSWORD_RESET_TEMPLATE);
        assert_eq!(email.variables["memberNumber"], "M0042");
        assert_eq!(
            email.variables["resetUrl"],
            "https://members.example.org/reset-password?token=abc"
        );
        assert!(email.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_recipient() {
        let number = MemberNumber::parse("M0042").unwrap();
        let email = OutboundEmail::password_reset("not-an-address", &number, "https://x.test");

        assert!(matches!(email.validate(), Err(RelayError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_blank_subject() {
        let number = MemberNumber::parse("M0042").unwrap();
        let mut email = OutboundEmail::password_reset("a@example.org", &number, "https://x.test");
        email.subject = "  ".to_string();

        assert!(matches!(email.validate(), Err(RelayError::Invalid(_))));
    }
}
