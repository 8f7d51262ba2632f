pub mod health;
pub mod ingest;

use axum::Router;

use crate::state::AppState;

/// All routes mounted under `/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(ingest::router())
}
