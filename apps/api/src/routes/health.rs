use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns a simple status object with service version and active preset.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let parser = state.parser.config();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "resume-ingest",
        "preset": parser.preset,
        "ocr_enabled": parser.enable_ocr
    }))
}
