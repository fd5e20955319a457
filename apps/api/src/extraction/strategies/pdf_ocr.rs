use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::extraction::analyzer::Approach;
use crate::extraction::error::{ErrorKind, ParserError};
use crate::extraction::ocr::OcrEngine;
use crate::extraction::pdf::{PdfBackend, Rasterizer};
use crate::extraction::strategy::{preflight, ExtractionContext, ExtractionStrategy};
use crate::models::Document;

/// Rasterizes each page and runs OCR on it, reporting page progress.
pub struct PdfOcrStrategy {
    pdf: Arc<dyn PdfBackend>,
    rasterizer: Arc<dyn Rasterizer>,
    engine: Arc<dyn OcrEngine>,
}

impl PdfOcrStrategy {
    pub fn new(pdf: Arc<dyn PdfBackend>, rasterizer: Arc<dyn Rasterizer>, engine: Arc<dyn OcrEngine>) -> Self {
        Self { pdf, rasterizer, engine }
    }

    fn fail(&self, document: &Document, error: ParserError) -> ParserError {
        error
            .with_context("strategy", self.name())
            .with_context("phase", "ocr_processing")
            .with_document(document)
    }

    /// Page count from the PDF structure. Encrypted files fall back to the
    /// first page only: the rasterizer can often still open owner-locked PDFs.
    async fn page_count(&self, document: &Document) -> Result<usize, ParserError> {
        let pdf = self.pdf.clone();
        let bytes = document.bytes().clone();
        let opened = tokio::task::spawn_blocking(move || pdf.open(&bytes).map(|handle| handle.page_count()))
            .await
            .map_err(|e| ParserError::new(ErrorKind::Unknown, format!("page count task failed: {e}")))?;

        match opened {
            Ok(pages) => Ok(pages),
            Err(e) if e.kind == ErrorKind::PasswordProtected => {
                warn!(document = %document.file_name, "encrypted PDF; attempting OCR of the first page only");
                Ok(1)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for PdfOcrStrategy {
    fn name(&self) -> &'static str {
        "pdf-ocr"
    }

    fn priority(&self) -> u32 {
        60
    }

    fn approach(&self) -> Approach {
        Approach::Ocr
    }

    fn supported_media_types(&self) -> &'static [&'static str] {
        &["application/pdf", "application/x-pdf"]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["pdf"]
    }

    async fn extract(&self, document: &Document, ctx: &ExtractionContext) -> Result<String, ParserError> {
        preflight(self, document)?;

        let pages = self.page_count(document).await.map_err(|e| self.fail(document, e))?;
        if pages == 0 {
            return Err(self.fail(document, ParserError::empty_or_corrupt("PDF has no pages")));
        }
        let total = pages.min(ctx.ocr.max_pages);

        let work_dir = tempfile::Builder::new()
            .prefix("pdf_ocr_")
            .tempdir()
            .map_err(|e| self.fail(document, ParserError::ocr(format!("could not create work directory: {e}"))))?;
        let pdf_path = work_dir.path().join("document.pdf");
        tokio::fs::write(&pdf_path, document.bytes())
            .await
            .map_err(|e| self.fail(document, ParserError::ocr(format!("could not stage PDF: {e}"))))?;

        let mut page_texts = Vec::with_capacity(total);
        for page in 1..=total {
            // OCR of a single page is not interrupted; cancellation is honoured between pages.
            ctx.check_cancelled(self.name())?;
            ctx.progress.report(page, total, 0.0);

            let image = self
                .rasterizer
                .rasterize(&pdf_path, page, ctx.ocr.dpi)
                .await
                .map_err(|e| self.fail(document, e.with_context("page", page.to_string())))?;
            debug!(page = image.page, dpi = image.dpi, bytes = image.png.len(), "page rasterized");
            ctx.progress.report(page, total, 0.5);

            let output = self
                .engine
                .recognize(&image.png, &ctx.ocr)
                .await
                .map_err(|e| self.fail(document, e.with_context("page", page.to_string())))?;
            ctx.progress.report(page, total, 1.0);

            debug!(document = %document.file_name, page, total, chars = output.text.len(), "page recognized");
            page_texts.push(output.text);
        }

        let text = page_texts.join("\n\n");
        if text.trim().is_empty() {
            return Err(self.fail(document, ParserError::ocr("OCR recognized no text on any page")));
        }
        if pages > total {
            debug!(document = %document.file_name, pages, total, "OCR stopped at the page limit");
        }
        Ok(text)
    }
}
