pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::screening::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/screening/extract", post(handlers::handle_extract))
        .route("/api/v1/screening/batch", post(handlers::handle_batch))
        .route("/api/v1/screening/csv", post(handlers::handle_csv))
        .route("/api/v1/screening/resume", post(handlers::handle_resume))
        .with_state(state)
}
