use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::extraction::analyzer::Approach;
use crate::extraction::error::ParserError;
use crate::extraction::ocr::OcrEngine;
use crate::extraction::strategy::{preflight, ExtractionContext, ExtractionStrategy};
use crate::models::Document;

/// Runs OCR on a single uploaded image.
pub struct ImageOcrStrategy {
    engine: Arc<dyn OcrEngine>,
}

impl ImageOcrStrategy {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ExtractionStrategy for ImageOcrStrategy {
    fn name(&self) -> &'static str {
        "image-ocr"
    }

    fn priority(&self) -> u32 {
        80
    }

    fn approach(&self) -> Approach {
        Approach::Ocr
    }

    fn supported_media_types(&self) -> &'static [&'static str] {
        &[
            "image/png",
            "image/jpeg",
            "image/tiff",
            "image/bmp",
            "image/webp",
            "image/gif",
        ]
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "webp", "gif"]
    }

    async fn extract(&self, document: &Document, ctx: &ExtractionContext) -> Result<String, ParserError> {
        preflight(self, document)?;
        ctx.check_cancelled(self.name())?;

        ctx.progress.report(1, 1, 0.0);
        let output = self
            .engine
            .recognize(document.bytes(), &ctx.ocr)
            .await
            .map_err(|e| {
                e.with_context("strategy", self.name())
                    .with_context("engine", self.engine.name())
                    .with_document(document)
            })?;
        ctx.progress.report(1, 1, 1.0);

        if output.text.trim().is_empty() {
            return Err(ParserError::ocr("OCR recognized no text in the image")
                .with_context("strategy", self.name())
                .with_document(document));
        }

        debug!(document = %document.file_name, chars = output.text.len(), "image OCR finished");
        Ok(output.text)
    }
}
