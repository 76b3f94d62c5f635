//! Scheduled Jobs
//!
//! Background jobs for periodic maintenance tasks.
//! These jobs clean up expired credentials and old outbox rows, sweep the
//! profile cache and keep the maintenance flag in sync.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::interval;

use crate::maintenance::MaintenanceService;
use crate::profile::FetchOrchestrator;

// =========================================================================
// Reset token cleanup
// =========================================================================

/// Delete password reset tokens that expired or were used over a day ago
pub async fn cleanup_expired_reset_tokens(pool: &PgPool) -> Result<u64, JobError> {
    let result = sqlx::query(
        r#"
        DELETE FROM password_reset_tokens
        WHERE expires_at < NOW()
           OR used_at < NOW() - INTERVAL '1 day'
        "#,
    )
    .execute(pool)
    .await?;

    let rows_deleted = result.rows_affected();

    if rows_deleted > 0 {
        tracing::info!(rows_deleted = rows_deleted, "Deleted expired password reset tokens");
    }

    Ok(rows_deleted)
}

// =========================================================================
// Session cleanup
// =========================================================================

/// Delete sessions that expired or were revoked over a day ago
pub async fn cleanup_expired_sessions(pool: &PgPool) -> Result<u64, JobError> {
    let result = sqlx::query(
        r#"
        DELETE FROM auth_sessions
        WHERE expires_at < NOW() - INTERVAL '1 day'
           OR revoked_at < NOW() - INTERVAL '1 day'
        "#,
    )
    .execute(pool)
    .await?;

    let rows_deleted = result.rows_affected();

    if rows_deleted > 0 {
        tracing::info!(rows_deleted = rows_deleted, "Deleted expired sessions");
    }

    Ok(rows_deleted)
}

// =========================================================================
// Outbox cleanup
// =========================================================================

/// Delete delivered or failed outbox rows older than 30 days
pub async fn cleanup_old_outbox_rows(pool: &PgPool) -> Result<u64, JobError> {
    let result = sqlx::query(
        r#"
        DELETE FROM email_outbox
        WHERE status IN ('sent', 'failed')
          AND created_at < NOW() - INTERVAL '30 days'
        "#,
    )
    .execute(pool)
    .await?;

    let rows_deleted = result.rows_affected();

    if rows_deleted > 0 {
        tracing::info!(rows_deleted = rows_deleted, "Deleted old outbox rows");
    }

    Ok(rows_deleted)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for credential and outbox cleanup (default: 1 hour)
    pub cleanup_interval: Duration,
    /// Interval for the profile cache sweep (default: 1 minute)
    pub cache_sweep_interval: Duration,
    /// Interval for re-reading the maintenance flag (default: 30 seconds)
    pub maintenance_refresh_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(3600),
            cache_sweep_interval: Duration::from_secs(60),
            maintenance_refresh_interval: Duration::from_secs(30),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    pool: PgPool,
    profiles: FetchOrchestrator,
    maintenance: Option<MaintenanceService>,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn new(pool: PgPool, profiles: FetchOrchestrator) -> Self {
        Self {
            pool,
            profiles,
            maintenance: None,
            config: JobSchedulerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: JobSchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Keep this service's cached maintenance flag in sync
    pub fn with_maintenance(mut self, maintenance: MaintenanceService) -> Self {
        self.maintenance = Some(maintenance);
        self
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut cleanup_interval = interval(self.config.cleanup_interval);
        let mut sweep_interval = interval(self.config.cache_sweep_interval);
        let mut maintenance_interval = interval(self.config.maintenance_refresh_interval);

        loop {
            tokio::select! {
                _ = cleanup_interval.tick() => {
                    let report = self.run_cleanup(MaintenanceReport::start()).await;
                    for error in &report.errors {
                        tracing::error!(error = %error, "Scheduled cleanup failed");
                    }
                }
                _ = sweep_interval.tick() => {
                    let evicted = self.profiles.evict_expired().await;
                    if evicted > 0 {
                        tracing::debug!(evicted = evicted, "Swept profile cache");
                    }
                }
                _ = maintenance_interval.tick() => {
                    if let Some(maintenance) = &self.maintenance {
                        if let Err(e) = maintenance.settings().await {
                            tracing::error!(error = %e, "Maintenance flag refresh failed");
                        }
                    }
                }
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = self.run_cleanup(MaintenanceReport::start()).await;
        report.cache_entries_evicted = self.profiles.evict_expired().await;
        report.completed_at = Utc::now();
        report
    }

    async fn run_cleanup(&self, mut report: MaintenanceReport) -> MaintenanceReport {
        match cleanup_expired_reset_tokens(&self.pool).await {
            Ok(count) => report.reset_tokens_deleted = count,
            Err(e) => report.errors.push(format!("Reset token cleanup: {}", e)),
        }

        match cleanup_expired_sessions(&self.pool).await {
            Ok(count) => report.sessions_deleted = count,
            Err(e) => report.errors.push(format!("Session cleanup: {}", e)),
        }

        match cleanup_old_outbox_rows(&self.pool).await {
            Ok(count) => report.outbox_rows_deleted = count,
            Err(e) => report.errors.push(format!("Outbox cleanup: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceReport {
    pub reset_tokens_deleted: u64,
    pub sessions_deleted: u64,
    pub outbox_rows_deleted: u64,
    pub cache_entries_evicted: usize,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl MaintenanceReport {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            reset_tokens_deleted: 0,
            sessions_deleted: 0,
            outbox_rows_deleted: 0,
            cache_entries_evicted: 0,
            errors: Vec::new(),
            started_at: now,
            completed_at: now,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =========================================================================
// Tests
// =========================================================================
