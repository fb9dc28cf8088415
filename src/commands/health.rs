//! Health Check Commands
//!
//! Commands for checking the health status of local services.

use crate::models::response::{CommandResponse, HealthResponse};
use crate::state::AppState;

/// Get the health status of all local services
pub async fn get_health(state: &AppState) -> CommandResponse<HealthResponse> {
    let mut health = HealthResponse::default();

    // Check database health
    health.database = state.is_database_healthy();

    // Check secret store health
    health.secrets = state.is_secrets_healthy();

    // Check config health
    health.config = state.is_config_healthy();

    // Overall status
    health.status = if health.database && health.secrets && health.config {
        "healthy".to_string()
    } else {
        "degraded".to_string()
    };

    CommandResponse::ok(health)
}
