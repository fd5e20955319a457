pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    http::Uri,
    routing::{get, post},
    Router,
};

use crate::errors::AppError;
use crate::extraction::handlers as extraction;
use crate::state::AppState;
use crate::validation::handlers as validation;

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("no route for {uri}"))
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_handler))
        // Extraction API
        .route("/api/v1/documents/parse", post(extraction::handle_parse))
        .route("/api/v1/documents/analyze", post(extraction::handle_analyze))
        .route("/api/v1/parser/config", get(extraction::handle_parser_config))
        // Validation API
        .route("/api/v1/resumes/validate", post(validation::handle_validate))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
