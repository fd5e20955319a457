//! Multi-strategy orchestration for one document.
//!
//! Flow:
//! 1. Analyze the document on the blocking pool; warnings seed the progress.
//! 2. Rank every allowed strategy that can handle it.
//! 3. Attempt strategies one at a time under the per-attempt timeout. A failed
//!    attempt consults the fallback table first, then the next untried rank.
//! 4. Stop on success, on a fatal error, after `max_retries` attempts, when the
//!    document deadline has passed, or when nothing untried remains.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::extraction::analyzer::{AnalysisResult, Approach, DocumentAnalyzer};
use crate::extraction::cleaning::{clean_text, quality_score};
use crate::extraction::error::{ErrorKind, ParseFailure, ParserError};
use crate::extraction::progress::{
    PageProgress, Phase, ProcessingProgress, ProgressSink, ProgressTracker, TracingProgressSink,
};
use crate::extraction::registry::{FallbackTable, RankedStrategy, StrategyRegistry};
use crate::extraction::settings::ParserConfig;
use crate::extraction::strategies::{standard_strategies, StrategyTools};
use crate::extraction::strategy::{validate_output, with_timeout, ExtractionContext, ExtractionStrategy};
use crate::models::Document;

/// Below this the outcome carries a quality warning.
const LOW_QUALITY: f32 = 0.4;

#[derive(Debug, Clone, Serialize)]
pub struct ParseOutcome {
    pub document_id: Uuid,
    pub file_name: String,
    pub text: String,
    pub strategy: String,
    pub confidence: u8,
    pub attempts: u32,
    pub analysis: AnalysisResult,
    pub warnings: Vec<String>,
    pub failed_attempts: Vec<ParserError>,
    pub quality_score: f32,
    pub progress: ProcessingProgress,
    pub completed_at: DateTime<Utc>,
}

pub struct MultiStrategyParser {
    config: ParserConfig,
    registry: StrategyRegistry,
    analyzer: DocumentAnalyzer,
}

impl MultiStrategyParser {
    pub fn new(config: ParserConfig, registry: StrategyRegistry, analyzer: DocumentAnalyzer) -> Self {
        Self {
            config,
            registry,
            analyzer,
        }
    }

    /// Built-in strategies and fallback rules over the given tools.
    pub fn standard(config: ParserConfig, tools: StrategyTools) -> Self {
        let registry = StrategyRegistry::new(standard_strategies(&tools), FallbackTable::standard());
        let analyzer = DocumentAnalyzer::new(tools.pdf.clone());
        Self::new(config, registry, analyzer)
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Runs the analyzer on the blocking pool. Never fails.
    pub async fn analyze(&self, document: &Document) -> AnalysisResult {
        let analyzer = self.analyzer.clone();
        let doc = document.clone();
        tokio::task::spawn_blocking(move || analyzer.analyze(&doc))
            .await
            .unwrap_or_else(|e| AnalysisResult::degraded(format!("analysis task failed: {e}")))
    }

    /// `parse_document` with tracing progress and no external cancellation.
    pub async fn parse(&self, document: &Document) -> Result<ParseOutcome, ParseFailure> {
        self.parse_document(document, Arc::new(TracingProgressSink), CancellationToken::new())
            .await
    }

    pub async fn parse_document(
        &self,
        document: &Document,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<ParseOutcome, ParseFailure> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.document_timeout();
        let mut tracker = ProgressTracker::new(sink);
        let mut run = Run::default();

        info!(
            document_id = %document.id,
            file = %document.file_name,
            media_type = %document.media_type,
            bytes = document.size(),
            "parsing document"
        );
        tracker.set_status("Preparing document");

        if cancel.is_cancelled() {
            run.errors.push(cancelled(document));
            return Err(self.fail(document, run, &mut tracker));
        }

        tracker.enter_phase(Phase::Analysis, "Analyzing document structure");
        let analysis = self.analyze(document).await;
        for warning in &analysis.warnings {
            tracker.add_warning(warning.clone());
        }
        tracker.set_phase_percent(100.0);

        let locked = analysis.is_password_protected;
        if locked && !(self.config.ocr_locked_documents && self.config.enable_ocr) {
            run.errors.push(
                ParserError::new(
                    ErrorKind::PasswordProtected,
                    "document is password protected; remove the password and upload it again",
                )
                .with_document(document),
            );
            return Err(self.fail(document, run, &mut tracker));
        }
        if locked {
            tracker.add_warning("Password-protected document; only OCR will be attempted");
        }

        let enable_ocr = self.config.enable_ocr;
        let ranked = self.registry.rank(document, &analysis, |s| {
            if locked {
                s.approach() == Approach::Ocr
            } else {
                enable_ocr || s.approach() != Approach::Ocr
            }
        });
        if ranked.is_empty() {
            run.errors.push(
                ParserError::unsupported(format!(
                    "no extraction strategy supports '{}' documents",
                    document.media_type
                ))
                .with_document(document),
            );
            return Err(self.fail(document, run, &mut tracker));
        }
        let order: Vec<(&str, u8)> = ranked.iter().map(|r| (r.strategy.name(), r.confidence)).collect();
        debug!(
            document_id = %document.id,
            ranked = ?order,
            recommended = ?analysis.recommended_strategy,
            "strategies ranked"
        );

        let mut next: Option<RankedStrategy> = ranked.first().cloned();
        while run.attempts < self.config.max_retries {
            let Some(current) = next.take().or_else(|| next_untried(&ranked, &run.attempted)) else {
                break;
            };
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                run.errors.push(self.deadline_exceeded(document));
                break;
            }
            let strategy = current.strategy.clone();
            let name = strategy.name();
            run.attempts += 1;
            run.attempted.push(name.to_string());

            let phase = match strategy.approach() {
                Approach::Ocr => Phase::OcrProcessing,
                Approach::TextExtraction | Approach::Hybrid => Phase::TextExtraction,
            };
            tracker.enter_phase(phase, format!("Extracting text with {name}"));
            tracker.begin_attempt(name, run.attempts);

            let attempt_started = Instant::now();
            let limit = self.config.timeout().min(remaining);
            let result = self
                .run_attempt(&strategy, document, limit, &mut tracker, &cancel)
                .await
                .and_then(|raw| {
                    let text = clean_text(&raw);
                    validate_output(&text, self.config.min_text_length)
                        .map(|warnings| (text, warnings))
                        .map_err(|e| e.with_phase(Phase::Validation.as_str()))
                });

            match result {
                Ok((text, short_warnings)) => {
                    info!(
                        document_id = %document.id,
                        strategy = name,
                        attempt = run.attempts,
                        chars = text.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "document parsed"
                    );
                    return Ok(self.succeed(document, &mut tracker, run, current, analysis, text, short_warnings));
                }
                Err(error) => {
                    let error = error
                        .with_context("strategy", name)
                        .with_context("attempt", run.attempts.to_string())
                        .with_phase(phase.as_str())
                        .with_document(document);
                    warn!(
                        document_id = %document.id,
                        strategy = name,
                        attempt = run.attempts,
                        code = %error.code,
                        elapsed_ms = attempt_started.elapsed().as_millis() as u64,
                        "extraction attempt failed: {}",
                        error.message
                    );
                    tracker.add_warning(format!("{name} failed: {}", error.message));

                    let exhausted = error.is_terminal()
                        || run.attempts >= self.config.max_retries
                        || tokio::time::Instant::now() >= deadline;
                    if !exhausted {
                        next = self.fallback_for(&error, document, &ranked, &run.attempted, &mut tracker);
                    }
                    run.errors.push(error);
                    if exhausted {
                        break;
                    }
                }
            }
        }

        Err(self.fail(document, run, &mut tracker))
    }

    /// Runs one strategy under the timeout while applying its page reports.
    /// The page channel is dropped at the decision point, so a losing
    /// attempt can no longer touch the tracker.
    async fn run_attempt(
        &self,
        strategy: &Arc<dyn ExtractionStrategy>,
        document: &Document,
        limit: Duration,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<String, ParserError> {
        let (progress, mut updates) = PageProgress::channel();
        let ctx = ExtractionContext::new(self.config.ocr.clone())
            .with_progress(progress)
            .with_cancellation(cancel.child_token());

        let attempt = with_timeout(strategy.name(), limit, strategy.extract(document, &ctx));
        tokio::pin!(attempt);

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(cancelled(document)),
                Some(update) = updates.recv() => tracker.apply(update),
                result = &mut attempt => break result,
            }
        };
        drop(updates);
        result
    }

    fn deadline_exceeded(&self, document: &Document) -> ParserError {
        ParserError::new(
            ErrorKind::Timeout,
            format!("document deadline of {}ms exceeded", self.config.document_timeout_ms),
        )
        .with_retryable(false)
        .with_document(document)
    }

    fn fallback_for(
        &self,
        error: &ParserError,
        document: &Document,
        ranked: &[RankedStrategy],
        attempted: &[String],
        tracker: &mut ProgressTracker,
    ) -> Option<RankedStrategy> {
        let (rule, target) = self
            .registry
            .fallbacks()
            .resolve(error, document, attempted, |target| {
                ranked.iter().any(|r| r.strategy.name() == target)
            })?;
        info!(document_id = %document.id, rule = %rule.name, fallback = target, "fallback rule matched");
        tracker.set_status(format!("Falling back to {target} ({})", rule.name));
        ranked.iter().find(|r| r.strategy.name() == target).cloned()
    }

    #[allow(clippy::too_many_arguments)]
    fn succeed(
        &self,
        document: &Document,
        tracker: &mut ProgressTracker,
        run: Run,
        chosen: RankedStrategy,
        analysis: AnalysisResult,
        text: String,
        short_warnings: Vec<String>,
    ) -> ParseOutcome {
        tracker.enter_phase(Phase::PostProcessing, "Cleaning extracted text");
        for warning in short_warnings {
            tracker.add_warning(warning);
        }
        let quality = quality_score(&text);
        if quality < LOW_QUALITY {
            tracker.add_warning(format!(
                "Extracted text looks low quality (score {quality:.2}); review before use"
            ));
        }
        tracker.set_phase_percent(100.0);

        tracker.enter_phase(Phase::Validation, "Validating extracted text");
        tracker.set_phase_percent(100.0);
        tracker.complete(format!("Extracted with {}", chosen.strategy.name()));

        let progress = tracker.snapshot();
        ParseOutcome {
            document_id: document.id,
            file_name: document.file_name.clone(),
            text,
            strategy: chosen.strategy.name().to_string(),
            confidence: chosen.confidence,
            attempts: run.attempts,
            analysis,
            warnings: progress.warnings.clone(),
            failed_attempts: run.errors,
            quality_score: quality,
            progress,
            completed_at: Utc::now(),
        }
    }

    fn fail(&self, document: &Document, mut run: Run, tracker: &mut ProgressTracker) -> ParseFailure {
        if run.errors.is_empty() {
            run.errors.push(
                ParserError::new(ErrorKind::Unknown, "no extraction attempt could be made").with_document(document),
            );
        }
        tracker.set_status(format!("Failed after {} attempt(s)", run.attempts));
        warn!(
            document_id = %document.id,
            attempts = run.attempts,
            errors = run.errors.len(),
            "document could not be parsed"
        );
        ParseFailure {
            document_id: document.id,
            file_name: document.file_name.clone(),
            attempted: run.attempted,
            errors: run.errors,
            progress: tracker.snapshot(),
        }
    }
}

/// Per-document attempt bookkeeping, owned by the orchestrator.
#[derive(Default)]
struct Run {
    attempts: u32,
    attempted: Vec<String>,
    errors: Vec<ParserError>,
}

fn next_untried(ranked: &[RankedStrategy], attempted: &[String]) -> Option<RankedStrategy> {
    ranked
        .iter()
        .find(|r| !attempted.iter().any(|a| a == r.strategy.name()))
        .cloned()
}

fn cancelled(document: &Document) -> ParserError {
    ParserError::new(ErrorKind::Cancelled, "processing was cancelled by the caller").with_document(document)
}
