use axum::{routing::post, Router};

use crate::handlers::ingest;
use crate::state::AppState;

/// Mount ingest routes under `/v1`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ingest/syslog", post(ingest::ingest_syslog))
        .route("/ingest/syslog/bulk", post(ingest::ingest_syslog_bulk))
}
