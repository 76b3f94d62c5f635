//! Shared handler state

use std::sync::Arc;

use sqlx::PgPool;

use crate::email::EmailRelay;
use crate::handlers::PasswordResetSettings;
use crate::maintenance::MaintenanceService;
use crate::profile::ProfileService;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub profiles: Arc<ProfileService>,
    pub relay: Arc<dyn EmailRelay>,
    pub maintenance: MaintenanceService,
    pub password_reset: PasswordResetSettings,
}
