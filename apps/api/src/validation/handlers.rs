use axum::{extract::State, Json};

use crate::models::ResumeData;
use crate::state::AppState;
use crate::validation::ValidationReport;

/// POST /api/v1/resumes/validate
/// Runs every configured rule over the submitted resume; findings never fail the request.
pub async fn handle_validate(
    State(state): State<AppState>,
    Json(data): Json<ResumeData>,
) -> Json<ValidationReport> {
    Json(state.validator.report(&data))
}
