use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::extraction::analyzer::Approach;
use crate::extraction::error::ParserError;
use crate::extraction::strategies::{DOCX_MEDIA_TYPE, ODT_MEDIA_TYPE, WORD_EXTENSIONS, WORD_MEDIA_TYPES};
use crate::extraction::strategy::{media_essence, preflight, ExtractionContext, ExtractionStrategy};
use crate::models::Document;

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";
const RTF_SIGNATURE: &[u8] = b"{\\rtf";

/// Converts word-processor documents to plain text with `pandoc`.
pub struct DocxPandocStrategy {
    binary: String,
}

impl DocxPandocStrategy {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn fail(&self, document: &Document, error: ParserError) -> ParserError {
        error
            .with_context("strategy", self.name())
            .with_context("phase", "text_extraction")
            .with_document(document)
    }
}

/// Pandoc reader name for the document, by media type first, then extension.
fn input_format(document: &Document) -> Option<&'static str> {
    match media_essence(document) {
        DOCX_MEDIA_TYPE => return Some("docx"),
        ODT_MEDIA_TYPE => return Some("odt"),
        "application/rtf" | "text/rtf" => return Some("rtf"),
        "application/msword" => return Some("doc"),
        _ => {}
    }
    match document.extension().as_deref() {
        Some("docx") => Some("docx"),
        Some("odt") => Some("odt"),
        Some("rtf") => Some("rtf"),
        Some("doc") => Some("doc"),
        _ => None,
    }
}

/// Checks the container signature before anything is spawned.
fn check_container(format: &str, bytes: &[u8]) -> Result<(), ParserError> {
    match format {
        "docx" | "odt" if !bytes.starts_with(ZIP_SIGNATURE) => Err(ParserError::text_extraction(
            "corrupt zip container: missing local file header",
        )),
        "rtf" if !bytes.starts_with(RTF_SIGNATURE) => Err(ParserError::text_extraction(
            "corrupt RTF document: missing {\\rtf header",
        )),
        "doc" => Err(ParserError::text_extraction(
            "legacy Word binary is not a zip container and cannot be converted",
        )),
        _ => Ok(()),
    }
}

#[async_trait]
impl ExtractionStrategy for DocxPandocStrategy {
    fn name(&self) -> &'static str {
        "docx-pandoc"
    }

    fn priority(&self) -> u32 {
        90
    }

    fn approach(&self) -> Approach {
        Approach::TextExtraction
    }

    fn supported_media_types(&self) -> &'static [&'static str] {
        WORD_MEDIA_TYPES
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        WORD_EXTENSIONS
    }

    async fn extract(&self, document: &Document, _ctx: &ExtractionContext) -> Result<String, ParserError> {
        preflight(self, document)?;

        let format = input_format(document)
            .ok_or_else(|| self.fail(document, ParserError::unsupported("unknown word-processor format")))?;
        check_container(format, document.bytes()).map_err(|e| self.fail(document, e))?;

        let work_dir = tempfile::Builder::new()
            .prefix("pandoc_")
            .tempdir()
            .map_err(|e| self.fail(document, ParserError::text_extraction(format!("could not create work directory: {e}"))))?;
        let input = work_dir.path().join(format!("input.{format}"));
        tokio::fs::write(&input, document.bytes())
            .await
            .map_err(|e| self.fail(document, ParserError::text_extraction(format!("could not stage document: {e}"))))?;

        let output = Command::new(&self.binary)
            .arg("--from")
            .arg(format)
            .arg("--to")
            .arg("plain")
            .arg("--wrap=none")
            .arg(&input)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                self.fail(
                    document,
                    ParserError::text_extraction(format!("{} could not be started: {e}", self.binary)),
                )
            })?;

        if !output.status.success() {
            return Err(self.fail(
                document,
                ParserError::text_extraction(format!(
                    "{} could not convert the document: {}",
                    self.binary,
                    String::from_utf8_lossy(&output.stderr).trim()
                )),
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(document = %document.file_name, format, chars = text.len(), "pandoc conversion finished");
        Ok(text)
    }
}
