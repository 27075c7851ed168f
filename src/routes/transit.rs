use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppState;
use crate::NextDeparturesResponse;

// ---

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: usize = 20;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/transit/next", get(next_departures))
}

/// Query parameters for `GET /api/transit/next`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextQuery {
    stop_name: String,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct NextResponse {
    #[serde(flatten)]
    departures: NextDeparturesResponse,
    message: String,
}

async fn next_departures(
    State(state): State<AppState>,
    Query(params): Query<NextQuery>,
) -> Json<NextResponse> {
    // ---
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    info!("GET /api/transit/next - stop '{}', limit {}", params.stop_name, limit);

    let departures = state
        .departures
        .get_next_departures(&params.stop_name, limit)
        .await;
    let message = departures.summary();

    Json(NextResponse {
        departures,
        message,
    })
}
