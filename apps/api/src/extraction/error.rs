//! Typed failures shared by every extraction component.
//!
//! Strategies map their internal I/O and process failures to a `ParserError`
//! at the point they occur. The orchestrator then stamps every failed attempt
//! with document, strategy, attempt and phase context.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::extraction::progress::ProcessingProgress;
use crate::models::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedType,
    EmptyOrCorruptInput,
    PasswordProtected,
    TextExtractionFailed,
    OcrFailed,
    Timeout,
    ValidationFailed,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::UnsupportedType => "UNSUPPORTED_TYPE",
            ErrorKind::EmptyOrCorruptInput => "EMPTY_OR_CORRUPT_INPUT",
            ErrorKind::PasswordProtected => "PASSWORD_PROTECTED",
            ErrorKind::TextExtractionFailed => "TEXT_EXTRACTION_FAILED",
            ErrorKind::OcrFailed => "OCR_FAILED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::ValidationFailed => "VALIDATION_FAILED",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }

    fn default_severity(self) -> Severity {
        match self {
            ErrorKind::EmptyOrCorruptInput | ErrorKind::PasswordProtected | ErrorKind::Cancelled => {
                Severity::Fatal
            }
            ErrorKind::OcrFailed | ErrorKind::Unknown => Severity::High,
            ErrorKind::UnsupportedType
            | ErrorKind::TextExtractionFailed
            | ErrorKind::Timeout
            | ErrorKind::ValidationFailed => Severity::Medium,
        }
    }

    fn default_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::TextExtractionFailed
                | ErrorKind::OcrFailed
                | ErrorKind::Timeout
                | ErrorKind::ValidationFailed
                | ErrorKind::Unknown
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Fatal,
}

/// A single typed failure, always tied to the attempt that produced it.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ParserError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub retryable: bool,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl ParserError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code().to_string(),
            message: message.into(),
            severity: kind.default_severity(),
            retryable: kind.default_retryable(),
            context: BTreeMap::new(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedType, message)
    }

    pub fn empty_or_corrupt(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EmptyOrCorruptInput, message)
    }

    pub fn text_extraction(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TextExtractionFailed, message)
    }

    pub fn ocr(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OcrFailed, message)
    }

    pub fn timeout(strategy: &str, limit_ms: u64) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("strategy '{strategy}' timed out after {limit_ms}ms"),
        )
        .with_context("strategy", strategy)
        .with_context("timeout_ms", limit_ms.to_string())
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Adds document identity without overwriting keys that are already present.
    pub fn with_document(mut self, document: &Document) -> Self {
        self.context
            .entry("document".to_string())
            .or_insert_with(|| document.file_name.clone());
        self.context
            .entry("media_type".to_string())
            .or_insert_with(|| document.media_type.clone());
        self
    }

    /// Records the pipeline phase unless the strategy already named a narrower one.
    pub fn with_phase(mut self, phase: &str) -> Self {
        self.context
            .entry("phase".to_string())
            .or_insert_with(|| phase.to_string());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Fatal errors end the attempt loop: no other strategy can do better on the same bytes.
    pub fn is_terminal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    pub fn strategy(&self) -> Option<&str> {
        self.context.get("strategy").map(String::as_str)
    }

    /// Lower-cased message, used by fallback rule matching.
    pub fn message_lower(&self) -> String {
        self.message.to_lowercase()
    }
}

/// Terminal failure for a document: every attempted path is exhausted.
#[derive(Debug, Clone, Error, Serialize)]
#[error("document '{file_name}' could not be parsed ({} error(s) across {} attempt(s))", errors.len(), attempted.len())]
pub struct ParseFailure {
    pub document_id: Uuid,
    pub file_name: String,
    pub attempted: Vec<String>,
    pub errors: Vec<ParserError>,
    pub progress: ProcessingProgress,
}

impl ParseFailure {
    /// The most severe error, which decides how the failure is surfaced.
    pub fn primary(&self) -> Option<&ParserError> {
        self.errors.iter().max_by_key(|e| e.severity)
    }

    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }
}
