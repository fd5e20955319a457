use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::extraction::analyzer::Approach;
use crate::extraction::error::ParserError;
use crate::extraction::strategies::{WORD_EXTENSIONS, WORD_MEDIA_TYPES};
use crate::extraction::strategy::{default_confidence, preflight, ExtractionContext, ExtractionStrategy};
use crate::models::Document;

static WORD_TEXT_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").expect("valid regex"));

const MIN_RUN_CHARS: usize = 4;
const MIN_RUN_LETTERS: usize = 3;

/// Last resort for damaged word-processor files: scrapes readable text
/// straight out of the raw bytes.
pub struct TextFallbackStrategy;

#[async_trait]
impl ExtractionStrategy for TextFallbackStrategy {
    fn name(&self) -> &'static str {
        "text-fallback"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn approach(&self) -> Approach {
        Approach::Hybrid
    }

    fn supported_media_types(&self) -> &'static [&'static str] {
        WORD_MEDIA_TYPES
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        WORD_EXTENSIONS
    }

    /// Half the usual score: a scrape should never outrank a real converter.
    fn confidence_score(&self, document: &Document) -> u8 {
        let score = default_confidence(self.supported_media_types(), self.supported_extensions(), document);
        score.div_ceil(2)
    }

    async fn extract(&self, document: &Document, _ctx: &ExtractionContext) -> Result<String, ParserError> {
        preflight(self, document)?;

        let text = scrape(document.bytes());
        if text.trim().is_empty() {
            return Err(ParserError::text_extraction("no readable text found in raw document bytes")
                .with_context("strategy", self.name())
                .with_document(document));
        }
        Ok(text)
    }
}

/// Uncompressed WordprocessingML text runs when present, otherwise the longer
/// of the single-byte and UTF-16LE printable runs.
fn scrape(bytes: &[u8]) -> String {
    let raw = String::from_utf8_lossy(bytes);
    let runs: Vec<&str> = WORD_TEXT_RUN
        .captures_iter(&raw)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|s| !s.trim().is_empty())
        .collect();
    if !runs.is_empty() {
        return runs.join(" ");
    }

    let narrow = printable_runs(bytes.iter().copied());
    let wide = printable_runs(
        bytes
            .chunks_exact(2)
            .filter(|pair| pair[1] == 0)
            .map(|pair| pair[0]),
    );
    if wide.len() > narrow.len() {
        wide
    } else {
        narrow
    }
}

fn printable_runs(bytes: impl Iterator<Item = u8>) -> String {
    let mut runs: Vec<String> = Vec::new();
    let mut current = String::new();
    for b in bytes {
        if b.is_ascii_graphic() || b == b' ' {
            current.push(b as char);
        } else {
            flush_run(&mut current, &mut runs);
        }
    }
    flush_run(&mut current, &mut runs);
    runs.join(" ")
}

fn flush_run(current: &mut String, runs: &mut Vec<String>) {
    let trimmed = current.trim();
    let letters = trimmed.chars().filter(|c| c.is_ascii_alphabetic()).count();
    if trimmed.len() >= MIN_RUN_CHARS && letters >= MIN_RUN_LETTERS {
        runs.push(trimmed.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::error::ErrorKind;
    use crate::extraction::settings::OcrSettings;
    use crate::extraction::strategies::{DocxPandocStrategy, DOCX_MEDIA_TYPE};

    #[test]
    fn test_scrapes_word_text_runs() {
        let xml = br#"<w:p><w:r><w:t>Jane</w:t></w:r><w:r><w:t xml:space="preserve">Doe</w:t></w:r></w:p>"#;
        assert_eq!(scrape(xml), "Jane Doe");
    }

    #[test]
    fn test_scrapes_printable_runs() {
        let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0x00];
        bytes.extend_from_slice(b"Senior Engineer");
        bytes.extend_from_slice(&[0x01, 0x02, b'a', b'b', 0x03]);
        bytes.extend_from_slice(b"Acme Corp");
        assert_eq!(scrape(&bytes), "Senior Engineer Acme Corp");
    }

    #[test]
    fn test_scrapes_utf16_runs() {
        let bytes: Vec<u8> = "Staff Engineer".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        assert_eq!(scrape(&bytes), "Staff Engineer");
    }

    #[test]
    fn test_scores_below_converter() {
        let doc = Document::new("cv.docx", DOCX_MEDIA_TYPE, vec![1u8; 4096]);
        let converter = DocxPandocStrategy::new("pandoc");
        assert!(TextFallbackStrategy.confidence_score(&doc) < converter.confidence_score(&doc));
        assert!(TextFallbackStrategy.confidence_score(&doc) > 0);
    }

    #[tokio::test]
    async fn test_unreadable_bytes_fail() {
        let ctx = ExtractionContext::new(OcrSettings::default());
        let doc = Document::new("cv.doc", "application/msword", vec![0x01; 64]);
        let err = TextFallbackStrategy.extract(&doc, &ctx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TextExtractionFailed);
    }
}
