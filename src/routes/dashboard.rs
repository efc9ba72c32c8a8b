//! Dashboard aggregate endpoints.

use axum::extract::State;
use axum::{routing::get, Json, Router};

use crate::aggregate::{self, DashboardSummary, ZoneStats};

use super::{ApiResult, AppState};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/dashboard", get(summary))
        .route("/api/dashboard/zones", get(zones))
}

/// Handle `GET /api/dashboard`: fleet counts by status and severity plus
/// ticket totals.
async fn summary(State(state): State<AppState>) -> ApiResult<Json<DashboardSummary>> {
    Ok(Json(aggregate::dashboard_summary(&state.store).await?))
}

/// Handle `GET /api/dashboard/zones`: health counts per zone.
async fn zones(State(state): State<AppState>) -> ApiResult<Json<Vec<ZoneStats>>> {
    Ok(Json(aggregate::zone_statistics(&state.store).await?))
}
