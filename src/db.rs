//! Database module
//!
//! Connectivity and schema checks. The schema itself lives in the SQL files
//! under migrations/.

use sqlx::PgPool;

/// Tables the service reads or writes
pub const REQUIRED_TABLES: &[&str] = &[
    "auth_users",
    "auth_sessions",
    "members",
    "members_collectors",
    "family_members",
    "member_notes",
    "payment_requests",
    "user_roles",
    "email_audit",
    "audit_logs",
    "email_outbox",
    "password_reset_tokens",
    "maintenance_settings",
    "maintenance_history",
];

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    check_maintenance_settings(pool).await
}

/// The maintenance panel expects exactly one settings row
async fn check_maintenance_settings(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM maintenance_settings")
        .fetch_one(pool)
        .await?;

    if rows != 1 {
        tracing::error!(
            rows = rows,
            "maintenance_settings must hold exactly one row. Please run database seed."
        );
        return Ok(false);
    }

    tracing::info!("Maintenance settings verified");
    Ok(true)
}
