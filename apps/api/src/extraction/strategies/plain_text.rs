use async_trait::async_trait;

use crate::extraction::analyzer::Approach;
use crate::extraction::error::ParserError;
use crate::extraction::strategy::{preflight, ExtractionContext, ExtractionStrategy};
use crate::models::Document;

/// More NUL bytes than this fraction means the upload is not text at all.
const MAX_NUL_RATIO: f64 = 0.01;

/// Reads text and markdown uploads directly.
pub struct PlainTextStrategy;

#[async_trait]
impl ExtractionStrategy for PlainTextStrategy {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn priority(&self) -> u32 {
        95
    }

    fn approach(&self) -> Approach {
        Approach::TextExtraction
    }

    fn supported_media_types(&self) -> &'static [&'static str] {
        &["text/plain", "text/markdown", "text/x-markdown"]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["txt", "md", "markdown"]
    }

    async fn extract(&self, document: &Document, _ctx: &ExtractionContext) -> Result<String, ParserError> {
        preflight(self, document)?;

        let bytes = document.bytes();
        let nuls = bytes.iter().filter(|b| **b == 0).count();
        if nuls as f64 / bytes.len() as f64 > MAX_NUL_RATIO {
            return Err(ParserError::text_extraction("file content is binary, not plain text")
                .with_context("strategy", self.name())
                .with_document(document));
        }

        let text = String::from_utf8_lossy(bytes);
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::error::ErrorKind;
    use crate::extraction::settings::OcrSettings;

    fn ctx() -> ExtractionContext {
        ExtractionContext::new(OcrSettings::default())
    }

    #[tokio::test]
    async fn test_reads_utf8_and_strips_bom() {
        let doc = Document::new("cv.txt", "text/plain", "\u{feff}Jane Doe\nEngineer".as_bytes().to_vec());
        assert_eq!(PlainTextStrategy.extract(&doc, &ctx()).await.unwrap(), "Jane Doe\nEngineer");
    }

    #[tokio::test]
    async fn test_binary_content_rejected() {
        let doc = Document::new("cv.txt", "text/plain", vec![0u8, 1, 0, 2, 0, 3]);
        let err = PlainTextStrategy.extract(&doc, &ctx()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TextExtractionFailed);
    }

    #[test]
    fn test_handles_markdown_by_extension() {
        let doc = Document::new("README.md", "application/octet-stream", vec![b'#'; 2048]);
        assert!(PlainTextStrategy.can_handle(&doc));
        assert_eq!(PlainTextStrategy.confidence_score(&doc), 60);
    }
}
