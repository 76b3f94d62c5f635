//! Audit trails
//!
//! Two tables live here:
//!
//! - `email_audit`, written by the auth service whenever a principal signs
//!   in with a member number. Read-only from this crate; it is the first
//!   source the identity resolver consults.
//! - `audit_logs`, the record of administrative actions taken through this
//!   API (member edits, maintenance toggles, reset requests).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::net::IpAddr;
use uuid::Uuid;

use crate::domain::{AuditRecord, OperationContext};

// =========================================================================
// Email audit
// =========================================================================

/// Reader over the `email_audit` table
#[derive(Debug, Clone)]
pub struct EmailAuditRepository {
    pool: PgPool,
}

impl EmailAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent record for a principal
    pub async fn latest_for(&self, auth_user_id: Uuid) -> Result<Option<AuditRecord>, AuditLogError> {
        let row: Option<(Uuid, Option<String>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT auth_user_id, member_number, created_at
            FROM email_audit
            WHERE auth_user_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(auth_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(auth_user_id, member_number, created_at)| AuditRecord {
            auth_user_id,
            member_number,
            created_at,
        }))
    }

    /// Records for a principal, newest first
    pub async fn history_for(&self, auth_user_id: Uuid, limit: i64) -> Result<Vec<AuditRecord>, AuditLogError> {
        let rows: Vec<(Uuid, Option<String>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT auth_user_id, member_number, created_at
            FROM email_audit
            WHERE auth_user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(auth_user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(auth_user_id, member_number, created_at)| AuditRecord {
                auth_user_id,
                member_number,
                created_at,
            })
            .collect())
    }
}

// =========================================================================
// Activity log
// =========================================================================

/// Audit log entry for database storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub request_user_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    pub changed_fields: Option<Vec<String>>,
    pub client_ip: Option<IpAddr>,
    pub created_at: DateTime<Utc>,
}

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    MemberUpdated,
    PasswordResetRequested,
    MaintenanceEnabled,
    MaintenanceDisabled,
    MaintenanceRun,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::MemberUpdated => "member.updated",
            AuditAction::PasswordResetRequested => "auth.password_reset_requested",
            AuditAction::MaintenanceEnabled => "maintenance.enabled",
            AuditAction::MaintenanceDisabled => "maintenance.disabled",
            AuditAction::MaintenanceRun => "maintenance.run",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builder for creating audit log entries
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
    action: AuditAction,
    resource_type: Option<String>,
    resource_id: Option<Uuid>,
    before_state: Option<serde_json::Value>,
    after_state: Option<serde_json::Value>,
    changed_fields: Option<Vec<String>>,
}

impl AuditLogBuilder {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            resource_type: None,
            resource_id: None,
            before_state: None,
            after_state: None,
            changed_fields: None,
        }
    }

    pub fn resource(mut self, resource_type: &str, resource_id: Uuid) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id);
        self
    }

    pub fn before_state<T: Serialize>(mut self, state: &T) -> Self {
        self.before_state = serde_json::to_value(state).ok();
        self
    }

    pub fn after_state<T: Serialize>(mut self, state: &T) -> Self {
        self.after_state = serde_json::to_value(state).ok();
        self
    }

    pub fn changed_fields(mut self, fields: Vec<String>) -> Self {
        self.changed_fields = Some(fields);
        self
    }
}

/// Writer and reader for `audit_logs`
#[derive(Debug, Clone)]
pub struct AuditLogService {
    pool: PgPool,
}

impl AuditLogService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Write an audit log entry
    pub async fn log(&self, builder: AuditLogBuilder, context: &OperationContext) -> Result<Uuid, AuditLogError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO audit_logs (
                id, request_user_id, correlation_id,
                action, resource_type, resource_id,
                before_state, after_state, changed_fields, client_ip
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10::inet)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(context.actor().principal_id())
        .bind(context.correlation_id())
        .bind(builder.action.as_str())
        .bind(&builder.resource_type)
        .bind(builder.resource_id)
        .bind(&builder.before_state)
        .bind(&builder.after_state)
        .bind(&builder.changed_fields)
        .bind(context.client_ip().map(|ip| ip.to_string()))
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(audit_id = %id, action = %builder.action, "Audit log entry created");

        Ok(id)
    }

    /// Write an entry; failures are logged and otherwise ignored.
    pub async fn record(&self, builder: AuditLogBuilder, context: &OperationContext) {
        let action = builder.action;
        if let Err(e) = self.log(builder, context).await {
            tracing::error!(action = %action, error = %e, "Failed to write audit log entry");
        }
    }

    /// Get recent audit logs
    pub async fn get_recent(&self, limit: i64) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let entries: Vec<(
            Uuid, Option<Uuid>, Option<Uuid>,
            String, Option<String>, Option<Uuid>,
            Option<serde_json::Value>, Option<serde_json::Value>, Option<Vec<String>>,
            Option<String>, DateTime<Utc>
        )> = sqlx::query_as(
            r#"
            SELECT id, request_user_id, correlation_id,
                   action, resource_type, resource_id,
                   before_state, after_state, changed_fields,
                   host(client_ip), created_at
            FROM audit_logs
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries
            .into_iter()
            .map(|(
                id, request_user_id, correlation_id,
                action, resource_type, resource_id,
                before_state, after_state, changed_fields,
                client_ip, created_at,
            )| AuditLogEntry {
                id,
                request_user_id,
                correlation_id,
                action,
                resource_type,
                resource_id,
                before_state,
                after_state,
                changed_fields,
                client_ip: client_ip.and_then(|s| s.parse().ok()),
                created_at,
            })
            .collect())
    }
}

/// Audit log errors
#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_action_as_str() {
        assert_eq!(AuditAction::MemberUpdated.as_str(), "member.updated");
        assert_eq!(AuditAction::MaintenanceEnabled.to_string(), "maintenance.enabled");
        assert_eq!(AuditAction::PasswordResetRequested.as_str(), "auth.password_reset_requested");
    }

    #[test]
    fn test_audit_log_builder() {
        let member_id = Uuid::new_v4();
        let builder = AuditLogBuilder::new(AuditAction::MemberUpdated)
            .resource("Member", member_id)
            .after_state(&serde_json::json!({ "phone": "07700 900123" }))
            .changed_fields(vec!["phone".to_string()]);

        assert_eq!(builder.action, AuditAction::MemberUpdated);
        assert_eq!(builder.resource_type.as_deref(), Some("Member"));
        assert_eq!(builder.resource_id, Some(member_id));
        assert_eq!(builder.after_state.unwrap()["phone"], "07700 900123");
        assert!(builder.before_state.is_none());
    }
}
