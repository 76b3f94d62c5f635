//! Maintenance panel
//!
//! Maintenance mode, the history of maintenance runs and system health
//! checks. The maintenance flag is cached in process so the request gate
//! does not hit the database; it is refreshed on every toggle and by the
//! job scheduler.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::jobs::MaintenanceReport;

/// Expired-but-unrevoked sessions tolerated before the check degrades
const SESSION_BACKLOG_WARNING: i64 = 100;
const SESSION_BACKLOG_CRITICAL: i64 = 1_000;

/// Emails pending for over an hour tolerated before the check degrades
const OUTBOX_BACKLOG_WARNING: i64 = 1;
const OUTBOX_BACKLOG_CRITICAL: i64 = 50;

/// Row of `maintenance_settings`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaintenanceSettings {
    pub id: Uuid,
    pub is_enabled: bool,
    pub enabled_at: Option<DateTime<Utc>>,
    pub enabled_by: Option<Uuid>,
}

/// Row of `maintenance_history`
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceRun {
    pub id: Uuid,
    pub execution_time: DateTime<Utc>,
    pub status: String,
    pub duration_ms: i64,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    Good,
    Warning,
    Critical,
}

impl HealthStatus {
    /// Grade a backlog count against its thresholds
    pub fn for_backlog(count: i64, warning: i64, critical: i64) -> Self {
        if count >= critical {
            Self::Critical
        } else if count >= warning {
            Self::Warning
        } else {
            Self::Good
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub check_type: String,
    pub status: HealthStatus,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct MaintenanceService {
    pool: PgPool,
    enabled: Arc<AtomicBool>,
}

impl MaintenanceService {
    /// Service whose cached flag starts at `enabled`
    pub fn with_initial_state(pool: PgPool, enabled: bool) -> Self {
        Self {
            pool,
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    /// Service initialised from the stored settings
    pub async fn load(pool: PgPool) -> Result<Self, MaintenanceError> {
        let service = Self::with_initial_state(pool, false);
        service.settings().await?;
        Ok(service)
    }

    /// Cached maintenance flag
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Current settings; refreshes the cached flag
    pub async fn settings(&self) -> Result<MaintenanceSettings, MaintenanceError> {
        let row: Option<(Uuid, bool, Option<DateTime<Utc>>, Option<Uuid>)> = sqlx::query_as(
            "SELECT id, is_enabled, enabled_at, enabled_by FROM maintenance_settings LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let (id, is_enabled, enabled_at, enabled_by) = row.ok_or(MaintenanceError::SettingsMissing)?;
        self.enabled.store(is_enabled, Ordering::Relaxed);

        Ok(MaintenanceSettings {
            id,
            is_enabled,
            enabled_at,
            enabled_by,
        })
    }

    pub async fn set_enabled(&self, enabled: bool, actor: Uuid) -> Result<MaintenanceSettings, MaintenanceError> {
        let row: Option<(Uuid, bool, Option<DateTime<Utc>>, Option<Uuid>)> = sqlx::query_as(
            r#"
            UPDATE maintenance_settings
            SET is_enabled = $1,
                enabled_at = CASE WHEN $1 THEN NOW() ELSE NULL END,
                enabled_by = CASE WHEN $1 THEN $2 ELSE NULL END
            RETURNING id, is_enabled, enabled_at, enabled_by
            "#,
        )
        .bind(enabled)
        .bind(actor)
        .fetch_optional(&self.pool)
        .await?;

        let (id, is_enabled, enabled_at, enabled_by) = row.ok_or(MaintenanceError::SettingsMissing)?;
        self.enabled.store(is_enabled, Ordering::Relaxed);

        tracing::warn!(enabled = is_enabled, actor = %actor, "Maintenance mode changed");

        Ok(MaintenanceSettings {
            id,
            is_enabled,
            enabled_at,
            enabled_by,
        })
    }

    /// Store a finished run in `maintenance_history`
    pub async fn record_run(&self, report: &MaintenanceReport) -> Result<Uuid, MaintenanceError> {
        let status = if report.errors.is_empty() {
            "completed"
        } else {
            "completed_with_errors"
        };

        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO maintenance_history (id, execution_time, status, duration_ms, details)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(report.started_at)
        .bind(status)
        .bind(report.duration_ms())
        .bind(serde_json::to_value(report)?)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Runs of the last `days` days, newest first
    pub async fn history(&self, days: i32) -> Result<Vec<MaintenanceRun>, MaintenanceError> {
        let rows: Vec<(Uuid, DateTime<Utc>, String, i64, serde_json::Value)> = sqlx::query_as(
            r#"
            SELECT id, execution_time, status, duration_ms, details
            FROM maintenance_history
            WHERE execution_time > NOW() - make_interval(days => $1)
            ORDER BY execution_time DESC
            "#,
        )
        .bind(days)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, execution_time, status, duration_ms, details)| MaintenanceRun {
                id,
                execution_time,
                status,
                duration_ms,
                details,
            })
            .collect())
    }

    /// Database reachability plus the session and outbox backlogs
    pub async fn system_health(&self) -> Vec<HealthCheck> {
        let mut checks = Vec::new();

        let database = match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => HealthCheck {
                check_type: "Database Connection".to_string(),
                status: HealthStatus::Good,
                details: serde_json::json!({}),
            },
            Err(e) => {
                tracing::error!(error = %e, "Health check: database unreachable");
                return vec![HealthCheck {
                    check_type: "Database Connection".to_string(),
                    status: HealthStatus::Critical,
                    details: serde_json::json!({ "error": e.to_string() }),
                }];
            }
        };
        checks.push(database);

        checks.push(
            self.backlog_check(
                "Expired Sessions",
                "SELECT COUNT(*) FROM auth_sessions WHERE revoked_at IS NULL AND expires_at < NOW()",
                SESSION_BACKLOG_WARNING,
                SESSION_BACKLOG_CRITICAL,
            )
            .await,
        );
        checks.push(
            self.backlog_check(
                "Pending Emails",
                "SELECT COUNT(*) FROM email_outbox WHERE status = 'pending' AND created_at < NOW() - INTERVAL '1 hour'",
                OUTBOX_BACKLOG_WARNING,
                OUTBOX_BACKLOG_CRITICAL,
            )
            .await,
        );

        checks
    }

    async fn backlog_check(&self, check_type: &str, sql: &str, warning: i64, critical: i64) -> HealthCheck {
        match sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.pool).await {
            Ok(count) => HealthCheck {
                check_type: check_type.to_string(),
                status: HealthStatus::for_backlog(count, warning, critical),
                details: serde_json::json!({ "count": count }),
            },
            Err(e) => {
                tracing::error!(check = check_type, error = %e, "Health check query failed");
                HealthCheck {
                    check_type: check_type.to_string(),
                    status: HealthStatus::Critical,
                    details: serde_json::json!({ "error": e.to_string() }),
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    #[error("Maintenance settings row is missing")]
    SettingsMissing,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
