//! Extraction strategy contract and the helpers every strategy shares.
//!
//! `StrategyRegistry` holds strategies as `Arc<dyn ExtractionStrategy>`;
//! selection is driven entirely by `can_handle`, `confidence_score` and the
//! fallback table, never by concrete type.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::extraction::analyzer::Approach;
use crate::extraction::error::{ErrorKind, ParserError};
use crate::extraction::progress::PageProgress;
use crate::extraction::settings::OcrSettings;
use crate::models::Document;

const EXACT_MATCH_BASE: f64 = 90.0;
const EXTENSION_MATCH_BASE: f64 = 60.0;
const LARGE_FILE_BYTES: usize = 10 * 1024 * 1024;
const HUGE_FILE_BYTES: usize = 50 * 1024 * 1024;
const SMALL_FILE_BYTES: usize = 1024;
const SMALL_FILE_MAX_PENALTY: f64 = 40.0;

// ────────────────────────────────────────────────────────────────────────────
// Per-attempt context
// ────────────────────────────────────────────────────────────────────────────

/// What the orchestrator hands a strategy for one attempt.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub progress: PageProgress,
    pub cancel: CancellationToken,
    pub ocr: OcrSettings,
}

impl ExtractionContext {
    pub fn new(ocr: OcrSettings) -> Self {
        Self {
            progress: PageProgress::disabled(),
            cancel: CancellationToken::new(),
            ocr,
        }
    }

    pub fn with_progress(mut self, progress: PageProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cooperative cancellation point for long-running strategies.
    pub fn check_cancelled(&self, strategy: &str) -> Result<(), ParserError> {
        if self.cancel.is_cancelled() {
            return Err(ParserError::new(ErrorKind::Cancelled, "processing was cancelled")
                .with_context("strategy", strategy));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Stable identifier, also used as the fallback-table target.
    fn name(&self) -> &'static str;

    /// Static tie-breaker when confidence scores are equal.
    fn priority(&self) -> u32;

    fn approach(&self) -> Approach;

    fn supported_media_types(&self) -> &'static [&'static str];

    /// Lower-case, without the dot.
    fn supported_extensions(&self) -> &'static [&'static str];

    fn can_handle(&self, document: &Document) -> bool {
        matches_media_type(self.supported_media_types(), document)
            || matches_extension(self.supported_extensions(), document)
    }

    /// 0 – 100; exactly 0 when `can_handle` is false.
    fn confidence_score(&self, document: &Document) -> u8 {
        default_confidence(self.supported_media_types(), self.supported_extensions(), document)
    }

    /// Turns the document into raw text. Cleaning happens in the orchestrator.
    async fn extract(&self, document: &Document, ctx: &ExtractionContext) -> Result<String, ParserError>;
}

/// Media type without parameters, e.g. `text/plain` from `text/plain; charset=utf-8`.
pub fn media_essence(document: &Document) -> &str {
    document
        .media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
}

fn matches_media_type(types: &[&str], document: &Document) -> bool {
    let essence = media_essence(document);
    types.iter().any(|t| *t == essence)
}

fn matches_extension(extensions: &[&str], document: &Document) -> bool {
    document
        .extension()
        .is_some_and(|ext| extensions.iter().any(|e| *e == ext))
}

/// Base score from how the document matched, minus size penalties. Tiny files
/// are penalized harder than huge ones.
pub fn default_confidence(types: &[&str], extensions: &[&str], document: &Document) -> u8 {
    let base = if matches_media_type(types, document) {
        EXACT_MATCH_BASE
    } else if matches_extension(extensions, document) {
        EXTENSION_MATCH_BASE
    } else {
        return 0;
    };

    let size = document.size();
    let large_penalty = if size > HUGE_FILE_BYTES {
        30.0
    } else if size > LARGE_FILE_BYTES {
        15.0
    } else {
        0.0
    };
    let small_penalty = if size < SMALL_FILE_BYTES {
        (1.0 - size as f64 / SMALL_FILE_BYTES as f64) * SMALL_FILE_MAX_PENALTY
    } else {
        0.0
    };

    (base - large_penalty - small_penalty).round().clamp(1.0, 100.0) as u8
}

// ────────────────────────────────────────────────────────────────────────────
// Shared helpers
// ────────────────────────────────────────────────────────────────────────────

/// Rejects documents the strategy must not even start on.
pub fn preflight<S: ExtractionStrategy + ?Sized>(strategy: &S, document: &Document) -> Result<(), ParserError> {
    if document.is_empty() {
        return Err(ParserError::empty_or_corrupt("document is empty (0 bytes)")
            .with_context("strategy", strategy.name())
            .with_document(document));
    }
    if !strategy.can_handle(document) {
        return Err(ParserError::unsupported(format!(
            "strategy '{}' does not support {} documents",
            strategy.name(),
            document.media_type
        ))
        .with_context("strategy", strategy.name())
        .with_document(document));
    }
    Ok(())
}

/// Empty output fails; short output only warns.
pub fn validate_output(text: &str, min_length: usize) -> Result<Vec<String>, ParserError> {
    let chars = text.trim().chars().count();
    if chars == 0 {
        return Err(ParserError::new(ErrorKind::ValidationFailed, "no text extracted"));
    }
    if chars < min_length {
        return Ok(vec![format!(
            "Extracted text is unusually short ({chars} characters, expected at least {min_length})"
        )]);
    }
    Ok(Vec::new())
}

/// Races `fut` against `limit`. When the deadline wins the future is dropped,
/// so nothing it would have produced is observed.
pub async fn with_timeout<T, F>(strategy: &str, limit: Duration, fut: F) -> Result<T, ParserError>
where
    F: Future<Output = Result<T, ParserError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ParserError::timeout(strategy, limit.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MarkdownOnly;

    #[async_trait]
    impl ExtractionStrategy for MarkdownOnly {
        fn name(&self) -> &'static str {
            "markdown-only"
        }
        fn priority(&self) -> u32 {
            1
        }
        fn approach(&self) -> Approach {
            Approach::TextExtraction
        }
        fn supported_media_types(&self) -> &'static [&'static str] {
            &["text/markdown"]
        }
        fn supported_extensions(&self) -> &'static [&'static str] {
            &["md"]
        }
        async fn extract(&self, document: &Document, _ctx: &ExtractionContext) -> Result<String, ParserError> {
            preflight(self, document)?;
            Ok(String::from_utf8_lossy(document.bytes()).into_owned())
        }
    }

    fn doc(name: &str, media_type: &str, size: usize) -> Document {
        Document::new(name, media_type, vec![b'a'; size])
    }

    #[test]
    fn test_confidence_zero_when_unhandled() {
        let d = doc("photo.png", "image/png", 4096);
        assert!(!MarkdownOnly.can_handle(&d));
        assert_eq!(MarkdownOnly.confidence_score(&d), 0);
    }

    #[test]
    fn test_exact_match_beats_extension_match() {
        let exact = doc("notes.txt", "text/markdown", 4096);
        let by_ext = doc("notes.md", "application/octet-stream", 4096);
        assert_eq!(MarkdownOnly.confidence_score(&exact), 90);
        assert_eq!(MarkdownOnly.confidence_score(&by_ext), 60);
    }

    #[test]
    fn test_media_type_parameters_ignored() {
        let d = doc("notes", "text/markdown; charset=utf-8", 4096);
        assert!(MarkdownOnly.can_handle(&d));
    }

    #[test]
    fn test_small_files_penalized_more_than_large() {
        let normal = MarkdownOnly.confidence_score(&doc("a.md", "text/markdown", 4096));
        let tiny = MarkdownOnly.confidence_score(&doc("a.md", "text/markdown", 64));
        let large = MarkdownOnly.confidence_score(&doc("a.md", "text/markdown", LARGE_FILE_BYTES + 1));
        assert!(tiny < large, "tiny={tiny} large={large}");
        assert!(large < normal);
    }

    #[test]
    fn test_empty_handled_file_keeps_nonzero_score() {
        assert!(MarkdownOnly.confidence_score(&doc("a.md", "text/markdown", 0)) > 0);
    }

    #[tokio::test]
    async fn test_preflight_rejects_empty_before_extraction() {
        let ctx = ExtractionContext::new(OcrSettings::default());
        let err = MarkdownOnly
            .extract(&doc("a.md", "text/markdown", 0), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::EmptyOrCorruptInput);
        assert_eq!(err.strategy(), Some("markdown-only"));
    }

    #[test]
    fn test_preflight_rejects_unsupported() {
        let err = preflight(&MarkdownOnly, &doc("a.png", "image/png", 10)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedType);
    }

    #[test]
    fn test_validate_output() {
        assert_eq!(validate_output("  \n ", 20).unwrap_err().kind, ErrorKind::ValidationFailed);
        assert_eq!(validate_output("Jane Doe", 20).unwrap().len(), 1);
        assert!(validate_output("Jane Doe, Senior Engineer at Acme", 20).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_names_strategy() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, ParserError>("late".to_string())
        };
        let err = with_timeout("slow-strategy", Duration::from_secs(1), slow)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(err.strategy(), Some("slow-strategy"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_passes_fast_result() {
        let fast = async { Ok::<_, ParserError>(7) };
        assert_eq!(with_timeout("fast", Duration::from_millis(10), fast).await.unwrap(), 7);
    }

    #[test]
    fn test_check_cancelled() {
        let token = CancellationToken::new();
        let ctx = ExtractionContext::new(OcrSettings::default()).with_cancellation(token.clone());
        assert!(ctx.check_cancelled("x").is_ok());
        token.cancel();
        assert_eq!(ctx.check_cancelled("x").unwrap_err().kind, ErrorKind::Cancelled);
    }
}
