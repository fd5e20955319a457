use async_trait::async_trait;
use tracing::debug;

use crate::extraction::analyzer::Approach;
use crate::extraction::error::{ErrorKind, ParserError};
use crate::extraction::strategy::{preflight, ExtractionContext, ExtractionStrategy};
use crate::models::Document;

/// Reads the embedded text layer with `pdf-extract`.
pub struct PdfTextStrategy;

impl PdfTextStrategy {
    fn fail(&self, document: &Document, error: ParserError) -> ParserError {
        error
            .with_context("strategy", self.name())
            .with_context("phase", "text_extraction")
            .with_document(document)
    }
}

#[async_trait]
impl ExtractionStrategy for PdfTextStrategy {
    fn name(&self) -> &'static str {
        "pdf-text"
    }

    fn priority(&self) -> u32 {
        100
    }

    fn approach(&self) -> Approach {
        Approach::TextExtraction
    }

    fn supported_media_types(&self) -> &'static [&'static str] {
        &["application/pdf", "application/x-pdf"]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["pdf"]
    }

    async fn extract(&self, document: &Document, _ctx: &ExtractionContext) -> Result<String, ParserError> {
        preflight(self, document)?;

        // CPU-bound and known to panic on some malformed fonts.
        let bytes = document.bytes().clone();
        let joined = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await;

        let text = match joined {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                let message = e.to_string();
                let lower = message.to_lowercase();
                let error = if lower.contains("encrypt") || lower.contains("password") {
                    ParserError::new(ErrorKind::PasswordProtected, format!("PDF is encrypted: {message}"))
                } else {
                    ParserError::text_extraction(format!("could not extract PDF text layer: {message}"))
                };
                return Err(self.fail(document, error));
            }
            Err(e) if e.is_panic() => {
                return Err(self.fail(
                    document,
                    ParserError::text_extraction("could not extract PDF text layer: parser panicked"),
                ));
            }
            Err(e) => {
                return Err(self.fail(
                    document,
                    ParserError::new(ErrorKind::Unknown, format!("text extraction task failed: {e}")),
                ));
            }
        };

        if text.trim().is_empty() {
            return Err(self.fail(
                document,
                ParserError::text_extraction("PDF text layer is empty; the document is likely scanned"),
            ));
        }

        debug!(document = %document.file_name, chars = text.len(), "pdf text layer extracted");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::settings::OcrSettings;

    #[tokio::test]
    async fn test_garbage_pdf_is_text_extraction_failure() {
        let doc = Document::new("resume.pdf", "application/pdf", b"%PDF-1.4 this is not really a pdf".to_vec());
        let ctx = ExtractionContext::new(OcrSettings::default());
        let err = PdfTextStrategy.extract(&doc, &ctx).await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TextExtractionFailed | ErrorKind::PasswordProtected));
        assert_eq!(err.strategy(), Some("pdf-text"));
        assert_eq!(err.context.get("document").map(String::as_str), Some("resume.pdf"));
    }

    #[test]
    fn test_scanned_jpeg_named_pdf_is_extension_match() {
        let doc = Document::new("scan.pdf", "image/jpeg", vec![0xFF; 4096]);
        assert!(PdfTextStrategy.can_handle(&doc));
        assert_eq!(PdfTextStrategy.confidence_score(&doc), 60);
    }
}
