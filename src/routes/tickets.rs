//! Maintenance ticket endpoints.

use axum::extract::{Path, Query, State};
use axum::{routing::get, routing::patch, Json, Router};
use serde::Deserialize;
use tracing::info;

use crate::models::{Ticket, TicketStatus};

use super::{ApiResult, AppState};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/tickets", get(list))
        .route("/api/tickets/{id}", patch(update))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<TicketStatus>,
}

/// Handle `GET /api/tickets`, optionally filtered by `?status=`.
async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> ApiResult<Json<Vec<Ticket>>> {
    // ---
    Ok(Json(state.tickets.list(params.status).await?))
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    status: TicketStatus,
}

/// Handle `PATCH /api/tickets/{id}`: move a ticket through its lifecycle.
/// Transitions outside Open → InProgress → Resolved come back as 409.
async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateRequest>,
) -> ApiResult<Json<Ticket>> {
    // ---
    let ticket = state.tickets.update_status(id, req.status).await?;
    info!("Ticket {} moved to {}", ticket.id, ticket.status);
    Ok(Json(ticket))
}
