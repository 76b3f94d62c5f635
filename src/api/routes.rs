//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogEntry, AuditLogService, EmailAuditRepository};
use crate::directory::{
    scope_for, CollectorFilter, MemberDirectory, MemberPage, MemberSearch, SortDirection, SortField,
    DEFAULT_PER_PAGE,
};
use crate::domain::{
    AuditRecord, MemberAggregate, Notification, OperationContext, PaymentStats, Principal,
    ADMIN_ROLE,
};
use crate::error::AppError;
use crate::handlers::{
    Editor, MemberChanges, PasswordResetHandler, RequestPasswordResetCommand, UpdateMemberCommand,
    UpdateMemberHandler, UpdateMemberResult,
};
use crate::jobs::{JobScheduler, MaintenanceReport};
use crate::maintenance::{HealthCheck, MaintenanceRun, MaintenanceSettings};
use crate::profile::{FetchStatus, Freshness, NotificationBuffer, ProfileError};

use super::middleware::{operation_context, AccessToken};
use super::state::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    /// `null` until a member record is linked to the account
    pub member: Option<MemberAggregate>,
    pub freshness: Freshness,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Serialize)]
pub struct ProfileStatusResponse {
    pub status: FetchStatus,
}

#[derive(Debug, Deserialize)]
pub struct MembersQuery {
    #[serde(default)]
    pub search: Option<String>,
    /// `all` or a collector id; only honoured for admins
    #[serde(default)]
    pub collector: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub member_number: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct PasswordResetResponse {
    pub member_number: String,
    pub notification: Notification,
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceToggleRequest {
    pub is_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct MaintenanceRunResponse {
    pub id: Uuid,
    pub report: MaintenanceReport,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_days")]
    pub days: i32,
}

fn default_history_days() -> i32 {
    7
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

// =========================================================================
// API Router
// =========================================================================

/// Routes that need a session
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Own profile
        .route("/profile", get(get_profile))
        .route("/profile/refresh", post(refresh_profile))
        .route("/profile/status", get(get_profile_status))
        .route("/profile/payments/summary", get(get_payment_summary))
        .route("/auth/logout", post(logout))
        // Member directory
        .route("/members", get(list_members))
        .route("/members/:member_id", patch(update_member))
        // Admin
        .route("/admin/maintenance", get(get_maintenance).put(set_maintenance))
        .route("/admin/maintenance/run", post(run_maintenance))
        .route("/admin/maintenance/history", get(get_maintenance_history))
        .route("/admin/system-health", get(get_system_health))
        .route("/admin/email-audit/:auth_user_id", get(get_email_audit))
        .route("/admin/audit-logs", get(get_audit_logs))
}

/// Routes reachable without a session
pub fn create_public_router() -> Router<AppState> {
    Router::new().route("/password-reset", post(request_password_reset))
}

// =========================================================================
// Caller helpers
// =========================================================================

/// Principal behind the request token. An unknown token carries the
/// session-expired notification.
async fn authenticate(state: &AppState, token: &AccessToken) -> Result<Principal, AppError> {
    let notifications = NotificationBuffer::new();
    state
        .profiles
        .authenticate(token.as_str(), &notifications)
        .await
        .map_err(|err| AppError::profile(err, notifications.take()))
}

async fn is_admin(state: &AppState, principal_id: Uuid) -> Result<bool, AppError> {
    let roles = state
        .profiles
        .roles(principal_id)
        .await
        .map_err(ProfileError::from)?;
    Ok(roles.iter().any(|r| r == ADMIN_ROLE))
}

async fn require_admin(state: &AppState, token: &AccessToken) -> Result<Principal, AppError> {
    let principal = authenticate(state, token).await?;
    if !is_admin(state, principal.id).await? {
        return Err(AppError::Forbidden("admin role required".to_string()));
    }
    Ok(principal)
}

// =========================================================================
// GET /profile
// =========================================================================

/// Member aggregate of the caller with any notifications the load raised
async fn get_profile(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
) -> Result<Json<ProfileResponse>, AppError> {
    let principal = authenticate(&state, &token).await?;

    let notifications = NotificationBuffer::new();
    match state.profiles.load_for(&principal, &notifications).await {
        Ok(outcome) => Ok(Json(ProfileResponse {
            member: outcome.aggregate,
            freshness: outcome.freshness,
            notifications: notifications.take(),
        })),
        Err(err) => Err(AppError::profile(err, notifications.take())),
    }
}

// =========================================================================
// POST /profile/refresh, GET /profile/status
// =========================================================================

async fn refresh_profile(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
) -> Result<(StatusCode, Json<ProfileStatusResponse>), AppError> {
    let principal = authenticate(&state, &token).await?;
    state.profiles.orchestrator().refetch(&principal).await;

    let status = state.profiles.orchestrator().status(principal.id).await;
    Ok((StatusCode::ACCEPTED, Json(ProfileStatusResponse { status })))
}

async fn get_profile_status(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
) -> Result<Json<ProfileStatusResponse>, AppError> {
    let principal = authenticate(&state, &token).await?;
    let status = state.profiles.orchestrator().status(principal.id).await;
    Ok(Json(ProfileStatusResponse { status }))
}

// =========================================================================
// GET /profile/payments/summary
// =========================================================================

async fn get_payment_summary(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
) -> Result<Json<PaymentStats>, AppError> {
    let principal = authenticate(&state, &token).await?;

    let notifications = NotificationBuffer::new();
    let outcome = state
        .profiles
        .load_for(&principal, &notifications)
        .await
        .map_err(|err| AppError::profile(err, notifications.take()))?;

    let stats = outcome
        .aggregate
        .map(|member| PaymentStats::calculate(&member.payment_requests))
        .unwrap_or_default();

    Ok(Json(stats))
}

// =========================================================================
// POST /auth/logout
// =========================================================================

async fn logout(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
) -> Result<StatusCode, AppError> {
    state.profiles.logout(token.as_str()).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// GET /members
// =========================================================================

/// Directory listing. Collectors see only their own members.
async fn list_members(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
    Query(query): Query<MembersQuery>,
) -> Result<Json<MemberPage>, AppError> {
    let principal = authenticate(&state, &token).await?;
    let admin = is_admin(&state, principal.id).await?;

    let directory = MemberDirectory::new(state.pool.clone());
    let own_collector = directory.collector_for(principal.id).await?;

    let requested = match query.collector.as_deref() {
        None => CollectorFilter::All,
        Some(raw) => CollectorFilter::parse(raw)
            .ok_or_else(|| AppError::InvalidRequest(format!("Invalid collector filter: {}", raw)))?,
    };
    let collector = scope_for(admin, own_collector, requested)?;

    let sort = match query.sort.as_deref() {
        Some(raw) => SortField::parse(raw)?,
        None => SortField::default(),
    };

    let mut search = MemberSearch::new(collector)
        .with_sort(sort, query.direction)
        .with_page(query.page, query.per_page);
    if let Some(term) = query.search.as_deref() {
        search = search.with_term(term);
    }

    Ok(Json(directory.search(&search).await?))
}

// =========================================================================
// PATCH /members/:member_id
// =========================================================================

async fn update_member(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
    Extension(context): Extension<OperationContext>,
    Path(member_id): Path<Uuid>,
    Json(changes): Json<MemberChanges>,
) -> Result<Json<UpdateMemberResult>, AppError> {
    let principal = authenticate(&state, &token).await?;
    let editor = Editor {
        principal_id: principal.id,
        is_admin: is_admin(&state, principal.id).await?,
        collector_id: MemberDirectory::new(state.pool.clone())
            .collector_for(principal.id)
            .await?,
    };

    let context = context.acting_as(&principal);
    let result = UpdateMemberHandler::new(state.pool.clone())
        .execute(UpdateMemberCommand::new(member_id, changes), &editor, &context)
        .await?;

    // The linked member sees the edit on their next load
    if let Some(auth_user_id) = result.auth_user_id {
        state.profiles.invalidate(auth_user_id).await;
    }

    Ok(Json(result))
}

// =========================================================================
// POST /password-reset
// =========================================================================

async fn request_password_reset(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(request): Json<PasswordResetRequest>,
) -> Result<(StatusCode, Json<PasswordResetResponse>), AppError> {
    let context = operation_context(&headers);
    let handler = PasswordResetHandler::new(
        state.pool.clone(),
        state.relay.clone(),
        state.password_reset.clone(),
    );

    let command = RequestPasswordResetCommand::new(request.member_number, request.email);
    let result = handler.execute(command, &context).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PasswordResetResponse {
            member_number: result.member_number,
            notification: Notification::reset_sent(),
        }),
    ))
}

// =========================================================================
// Admin: maintenance
// =========================================================================

async fn get_maintenance(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
) -> Result<Json<MaintenanceSettings>, AppError> {
    require_admin(&state, &token).await?;
    Ok(Json(state.maintenance.settings().await?))
}

async fn set_maintenance(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<MaintenanceToggleRequest>,
) -> Result<Json<MaintenanceSettings>, AppError> {
    let admin = require_admin(&state, &token).await?;
    let settings = state.maintenance.set_enabled(request.is_enabled, admin.id).await?;

    let action = if settings.is_enabled {
        AuditAction::MaintenanceEnabled
    } else {
        AuditAction::MaintenanceDisabled
    };
    AuditLogService::new(state.pool.clone())
        .record(
            AuditLogBuilder::new(action)
                .resource("MaintenanceSettings", settings.id)
                .after_state(&settings),
            &context.acting_as(&admin),
        )
        .await;

    Ok(Json(settings))
}

/// Run every cleanup job now and store the run
async fn run_maintenance(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
    Extension(context): Extension<OperationContext>,
) -> Result<Json<MaintenanceRunResponse>, AppError> {
    let admin = require_admin(&state, &token).await?;

    let report = JobScheduler::new(state.pool.clone(), state.profiles.orchestrator().clone())
        .run_all_once()
        .await;
    let id = state.maintenance.record_run(&report).await?;

    AuditLogService::new(state.pool.clone())
        .record(
            AuditLogBuilder::new(AuditAction::MaintenanceRun)
                .resource("MaintenanceRun", id)
                .after_state(&report),
            &context.acting_as(&admin),
        )
        .await;

    tracing::info!(
        run_id = %id,
        duration_ms = report.duration_ms(),
        errors = report.errors.len(),
        "Manual maintenance run finished"
    );

    Ok(Json(MaintenanceRunResponse { id, report }))
}

async fn get_maintenance_history(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MaintenanceRun>>, AppError> {
    require_admin(&state, &token).await?;
    if query.days < 1 {
        return Err(AppError::InvalidRequest("days must be positive".to_string()));
    }
    Ok(Json(state.maintenance.history(query.days).await?))
}

async fn get_system_health(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
) -> Result<Json<Vec<HealthCheck>>, AppError> {
    require_admin(&state, &token).await?;
    Ok(Json(state.maintenance.system_health().await))
}

// =========================================================================
// Admin: audit trails
// =========================================================================

async fn get_email_audit(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
    Path(auth_user_id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<AuditRecord>>, AppError> {
    require_admin(&state, &token).await?;
    let records = EmailAuditRepository::new(state.pool.clone())
        .history_for(auth_user_id, query.limit.clamp(1, 500))
        .await?;
    Ok(Json(records))
}

async fn get_audit_logs(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    require_admin(&state, &token).await?;
    let entries = AuditLogService::new(state.pool.clone())
        .get_recent(query.limit.clamp(1, 1000))
        .await?;
    Ok(Json(entries))
}
