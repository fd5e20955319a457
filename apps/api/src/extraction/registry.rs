//! Strategy registry and the data-driven fallback table.
//!
//! Fallback rules are plain data: a set of error kinds, a document predicate
//! and message keywords mapped to an ordered list of successor strategies.

use std::cmp::Reverse;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::extraction::analyzer::AnalysisResult;
use crate::extraction::error::{ErrorKind, ParserError};
use crate::extraction::strategies::is_word_processor;
use crate::extraction::strategy::ExtractionStrategy;
use crate::models::Document;

// ────────────────────────────────────────────────────────────────────────────
// Fallback table
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DocumentMatch {
    Any,
    /// PDF media type or `.pdf` extension.
    PdfLike,
    /// An image media type uploaded under a `.pdf` name.
    ImageNamedPdf,
    WordProcessor,
    Extensions(Vec<String>),
}

impl DocumentMatch {
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            DocumentMatch::Any => true,
            DocumentMatch::PdfLike => document.is_pdf_like(),
            DocumentMatch::ImageNamedPdf => {
                document.is_image() && document.extension().as_deref() == Some("pdf")
            }
            DocumentMatch::WordProcessor => is_word_processor(document),
            DocumentMatch::Extensions(extensions) => document
                .extension()
                .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackRule {
    pub name: String,
    pub priority: u32,
    /// Empty means any kind.
    #[serde(default)]
    pub error_kinds: Vec<ErrorKind>,
    #[serde(default)]
    pub excluded_kinds: Vec<ErrorKind>,
    pub document: DocumentMatch,
    /// Lower-case keywords; empty means any message.
    #[serde(default)]
    pub message_any: Vec<String>,
    /// Successors in preference order; the first eligible one is chosen.
    pub next: Vec<String>,
}

impl FallbackRule {
    pub fn matches(&self, error: &ParserError, document: &Document) -> bool {
        if !self.error_kinds.is_empty() && !self.error_kinds.contains(&error.kind) {
            return false;
        }
        if self.excluded_kinds.contains(&error.kind) {
            return false;
        }
        if !self.document.matches(document) {
            return false;
        }
        if self.message_any.is_empty() {
            return true;
        }
        let message = error.message_lower();
        self.message_any.iter().any(|keyword| message.contains(keyword.as_str()))
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackTable {
    rules: Vec<FallbackRule>,
}

impl FallbackTable {
    /// Sorts rules by descending priority; equal priorities keep their order.
    pub fn new(mut rules: Vec<FallbackRule>) -> Self {
        rules.sort_by_key(|r| Reverse(r.priority));
        Self { rules }
    }

    pub fn rules(&self) -> &[FallbackRule] {
        &self.rules
    }

    /// The built-in rules.
    pub fn standard() -> Self {
        let empty_text = strings(&["empty", "no text", "unextractable", "could not extract"]);
        Self::new(vec![
            FallbackRule {
                name: "image-named-pdf-to-ocr".to_string(),
                priority: 100,
                error_kinds: vec![ErrorKind::TextExtractionFailed, ErrorKind::ValidationFailed],
                excluded_kinds: Vec::new(),
                document: DocumentMatch::ImageNamedPdf,
                message_any: empty_text.clone(),
                next: strings(&["image-ocr"]),
            },
            FallbackRule {
                name: "scanned-pdf-to-ocr".to_string(),
                priority: 90,
                error_kinds: vec![ErrorKind::TextExtractionFailed, ErrorKind::ValidationFailed],
                excluded_kinds: Vec::new(),
                document: DocumentMatch::PdfLike,
                message_any: empty_text,
                next: strings(&["pdf-ocr"]),
            },
            FallbackRule {
                name: "corrupt-word-document".to_string(),
                priority: 80,
                error_kinds: Vec::new(),
                excluded_kinds: Vec::new(),
                document: DocumentMatch::WordProcessor,
                message_any: strings(&["corrupt", "zip", "container"]),
                next: strings(&["text-fallback"]),
            },
            FallbackRule {
                name: "ocr-last-resort".to_string(),
                priority: 10,
                error_kinds: Vec::new(),
                excluded_kinds: vec![ErrorKind::OcrFailed],
                document: DocumentMatch::Any,
                message_any: Vec::new(),
                next: strings(&["pdf-ocr", "image-ocr"]),
            },
        ])
    }

    /// Picks the successor for a failed attempt. Only retryable errors are
    /// considered; a target must pass `eligible` and not have been attempted.
    pub fn resolve<'a>(
        &'a self,
        error: &ParserError,
        document: &Document,
        attempted: &[String],
        eligible: impl Fn(&str) -> bool,
    ) -> Option<(&'a FallbackRule, &'a str)> {
        if !error.retryable {
            return None;
        }
        self.rules
            .iter()
            .filter(|rule| rule.matches(error, document))
            .find_map(|rule| {
                rule.next
                    .iter()
                    .find(|target| !attempted.iter().any(|a| a == *target) && eligible(target))
                    .map(|target| (rule, target.as_str()))
            })
    }
}

impl Default for FallbackTable {
    fn default() -> Self {
        Self::standard()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Registry
// ────────────────────────────────────────────────────────────────────────────

/// A strategy that can handle a document, with its score for that document.
#[derive(Clone)]
pub struct RankedStrategy {
    pub strategy: Arc<dyn ExtractionStrategy>,
    pub confidence: u8,
}

pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
    fallbacks: FallbackTable,
}

impl StrategyRegistry {
    pub fn new(mut strategies: Vec<Arc<dyn ExtractionStrategy>>, fallbacks: FallbackTable) -> Self {
        strategies.sort_by_key(|s| Reverse(s.priority()));
        Self { strategies, fallbacks }
    }

    /// Strategies in descending priority order.
    pub fn strategies(&self) -> &[Arc<dyn ExtractionStrategy>] {
        &self.strategies
    }

    pub fn fallbacks(&self) -> &FallbackTable {
        &self.fallbacks
    }

    /// Strategies that can handle the document and pass `allowed`, ordered by
    /// confidence, then agreement with the analyzer's recommendation, then
    /// static priority.
    pub fn rank(
        &self,
        document: &Document,
        analysis: &AnalysisResult,
        allowed: impl Fn(&dyn ExtractionStrategy) -> bool,
    ) -> Vec<RankedStrategy> {
        let mut ranked: Vec<RankedStrategy> = self
            .strategies
            .iter()
            .filter(|s| allowed(s.as_ref()) && s.can_handle(document))
            .map(|s| RankedStrategy {
                confidence: s.confidence_score(document),
                strategy: s.clone(),
            })
            .collect();

        ranked.sort_by_key(|r| {
            (
                Reverse(r.confidence),
                Reverse(r.strategy.approach() == analysis.recommended_strategy),
                Reverse(r.strategy.priority()),
            )
        });
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::extraction::analyzer::{Approach, LayoutComplexity};
    use crate::extraction::strategy::ExtractionContext;

    struct Named {
        name: &'static str,
        priority: u32,
        approach: Approach,
        types: &'static [&'static str],
    }

    #[async_trait]
    impl ExtractionStrategy for Named {
        fn name(&self) -> &'static str {
            self.name
        }
        fn priority(&self) -> u32 {
            self.priority
        }
        fn approach(&self) -> Approach {
            self.approach
        }
        fn supported_media_types(&self) -> &'static [&'static str] {
            self.types
        }
        fn supported_extensions(&self) -> &'static [&'static str] {
            &[]
        }
        async fn extract(&self, _document: &Document, _ctx: &ExtractionContext) -> Result<String, ParserError> {
            Ok(String::new())
        }
    }

    fn named(name: &'static str, priority: u32, approach: Approach) -> Arc<dyn ExtractionStrategy> {
        Arc::new(Named {
            name,
            priority,
            approach,
            types: &["application/pdf"],
        })
    }

    fn analysis(recommended: Approach) -> AnalysisResult {
        let mut result = AnalysisResult::degraded("unused");
        result.warnings.clear();
        result.is_image_based = false;
        result.layout_complexity = LayoutComplexity::Simple;
        result.recommended_strategy = recommended;
        result
    }

    fn pdf() -> Document {
        Document::new("cv.pdf", "application/pdf", vec![1u8; 4096])
    }

    #[test]
    fn test_registry_orders_by_priority() {
        let registry = StrategyRegistry::new(
            vec![named("low", 1, Approach::Ocr), named("high", 9, Approach::Ocr)],
            FallbackTable::standard(),
        );
        let names: Vec<&str> = registry.strategies().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["high", "low"]);
    }

    #[test]
    fn test_rank_prefers_recommended_approach_on_ties() {
        let registry = StrategyRegistry::new(
            vec![named("text", 100, Approach::TextExtraction), named("ocr", 60, Approach::Ocr)],
            FallbackTable::standard(),
        );
        let ranked = registry.rank(&pdf(), &analysis(Approach::Ocr), |_| true);
        assert_eq!(ranked[0].strategy.name(), "ocr");

        let ranked = registry.rank(&pdf(), &analysis(Approach::TextExtraction), |_| true);
        assert_eq!(ranked[0].strategy.name(), "text");
    }

    #[test]
    fn test_rank_skips_disallowed_and_unhandled() {
        let registry = StrategyRegistry::new(
            vec![
                named("text", 100, Approach::TextExtraction),
                named("ocr", 60, Approach::Ocr),
                Arc::new(Named {
                    name: "images",
                    priority: 80,
                    approach: Approach::Ocr,
                    types: &["image/png"],
                }),
            ],
            FallbackTable::standard(),
        );
        let ranked = registry.rank(&pdf(), &analysis(Approach::Ocr), |s| s.approach() != Approach::Ocr);
        let names: Vec<&str> = ranked.iter().map(|r| r.strategy.name()).collect();
        assert_eq!(names, vec!["text"]);
    }

    #[test]
    fn test_scanned_pdf_rule_targets_pdf_ocr() {
        let table = FallbackTable::standard();
        let error = ParserError::text_extraction("PDF text layer is empty; the document is likely scanned");
        let (rule, target) = table.resolve(&error, &pdf(), &["pdf-text".to_string()], |_| true).unwrap();
        assert_eq!(rule.name, "scanned-pdf-to-ocr");
        assert_eq!(target, "pdf-ocr");
    }

    #[test]
    fn test_image_named_pdf_rule_targets_image_ocr() {
        let table = FallbackTable::standard();
        let doc = Document::new("scan.pdf", "image/jpeg", vec![1u8; 4096]);
        let error = ParserError::text_extraction("could not extract PDF text layer: invalid header");
        let (rule, target) = table.resolve(&error, &doc, &[], |_| true).unwrap();
        assert_eq!(rule.name, "image-named-pdf-to-ocr");
        assert_eq!(target, "image-ocr");
    }

    #[test]
    fn test_corrupt_word_rule() {
        let table = FallbackTable::standard();
        let doc = Document::new("cv.docx", "application/octet-stream", vec![1u8; 4096]);
        let error = ParserError::text_extraction("corrupt zip container: missing local file header");
        let (rule, target) = table.resolve(&error, &doc, &["docx-pandoc".to_string()], |_| true).unwrap();
        assert_eq!(rule.name, "corrupt-word-document");
        assert_eq!(target, "text-fallback");
    }

    #[test]
    fn test_last_resort_skips_ocr_failures_and_attempted() {
        let table = FallbackTable::standard();
        let ocr_error = ParserError::ocr("tesseract crashed");
        assert!(table.resolve(&ocr_error, &pdf(), &[], |_| true).is_none());

        let timeout = ParserError::timeout("pdf-text", 1000);
        let attempted = vec!["pdf-text".to_string(), "pdf-ocr".to_string()];
        let (_, target) = table.resolve(&timeout, &pdf(), &attempted, |_| true).unwrap();
        assert_eq!(target, "image-ocr");

        assert!(table.resolve(&timeout, &pdf(), &attempted, |t| t != "image-ocr").is_none());
    }

    #[test]
    fn test_non_retryable_errors_never_fall_back() {
        let table = FallbackTable::standard();
        let error = ParserError::text_extraction("empty").with_retryable(false);
        assert!(table.resolve(&error, &pdf(), &[], |_| true).is_none());
    }

    #[test]
    fn test_table_is_serializable_data() {
        let json = serde_json::to_value(FallbackTable::standard()).unwrap();
        assert_eq!(json["rules"][0]["name"], "image-named-pdf-to-ocr");
        assert_eq!(json["rules"][1]["document"]["type"], "pdf_like");
        let back: FallbackTable = serde_json::from_value(json).unwrap();
        assert_eq!(back.rules().len(), 4);
    }

    #[test]
    fn test_rules_sorted_by_priority() {
        let table = FallbackTable::new(vec![
            FallbackRule {
                name: "low".to_string(),
                priority: 1,
                error_kinds: Vec::new(),
                excluded_kinds: Vec::new(),
                document: DocumentMatch::Any,
                message_any: Vec::new(),
                next: strings(&["b"]),
            },
            FallbackRule {
                name: "high".to_string(),
                priority: 5,
                error_kinds: Vec::new(),
                excluded_kinds: Vec::new(),
                document: DocumentMatch::Extensions(strings(&["PDF"])),
                message_any: Vec::new(),
                next: strings(&["a"]),
            },
        ]);
        let (rule, target) = table
            .resolve(&ParserError::timeout("x", 1), &pdf(), &[], |_| true)
            .unwrap();
        assert_eq!((rule.name.as_str(), target), ("high", "a"));
    }
}
