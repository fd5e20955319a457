use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::errors::AppError;
use crate::extraction::analyzer::Approach;
use crate::extraction::registry::FallbackRule;
use crate::extraction::{AnalysisResult, ParseOutcome, ParserConfig};
use crate::models::Document;
use crate::state::AppState;

const UPLOAD_FIELD: &str = "file";

#[derive(Serialize)]
pub struct StrategyInfo {
    pub name: &'static str,
    pub priority: u32,
    pub approach: Approach,
}

#[derive(Serialize)]
pub struct ParserConfigResponse {
    pub config: ParserConfig,
    pub strategies: Vec<StrategyInfo>,
    pub fallback_rules: Vec<FallbackRule>,
}

/// POST /api/v1/documents/parse
/// Multipart upload with a `file` part; returns the extracted text and attempt history.
pub async fn handle_parse(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ParseOutcome>, AppError> {
    let document = read_upload(multipart).await?;
    let outcome = state.parser.parse(&document).await?;
    info!(
        document_id = %outcome.document_id,
        strategy = %outcome.strategy,
        attempts = outcome.attempts,
        "Document parsed"
    );
    Ok(Json(outcome))
}

/// POST /api/v1/documents/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnalysisResult>, AppError> {
    let document = read_upload(multipart).await?;
    Ok(Json(state.parser.analyze(&document).await))
}

/// GET /api/v1/parser/config
pub async fn handle_parser_config(State(state): State<AppState>) -> Json<ParserConfigResponse> {
    let registry = state.parser.registry();
    Json(ParserConfigResponse {
        config: state.parser.config().clone(),
        strategies: registry
            .strategies()
            .iter()
            .map(|s| StrategyInfo {
                name: s.name(),
                priority: s.priority(),
                approach: s.approach(),
            })
            .collect(),
        fallback_rules: registry.fallbacks().rules().to_vec(),
    })
}

async fn read_upload(mut multipart: Multipart) -> Result<Document, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("upload")
            .to_string();
        let declared = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        return Ok(Document::from_upload(&file_name, declared.as_deref(), bytes));
    }
    Err(AppError::BadRequest(format!(
        "multipart field '{UPLOAD_FIELD}' is required"
    )))
}
