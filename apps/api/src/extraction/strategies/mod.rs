//! Concrete extraction strategies.

pub mod docx;
pub mod image_ocr;
pub mod pdf_ocr;
pub mod pdf_text;
pub mod plain_text;
pub mod text_fallback;

use std::sync::Arc;

pub use docx::DocxPandocStrategy;
pub use image_ocr::ImageOcrStrategy;
pub use pdf_ocr::PdfOcrStrategy;
pub use pdf_text::PdfTextStrategy;
pub use plain_text::PlainTextStrategy;
pub use text_fallback::TextFallbackStrategy;

use crate::extraction::ocr::OcrEngine;
use crate::extraction::pdf::{PdfBackend, Rasterizer};
use crate::extraction::strategy::{media_essence, ExtractionStrategy};
use crate::models::Document;

pub const DOCX_MEDIA_TYPE: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const ODT_MEDIA_TYPE: &str = "application/vnd.oasis.opendocument.text";

pub(crate) const WORD_MEDIA_TYPES: &[&str] = &[
    DOCX_MEDIA_TYPE,
    ODT_MEDIA_TYPE,
    "application/rtf",
    "text/rtf",
    "application/msword",
];
pub(crate) const WORD_EXTENSIONS: &[&str] = &["docx", "odt", "rtf", "doc"];

pub fn is_word_processor(document: &Document) -> bool {
    WORD_MEDIA_TYPES.contains(&media_essence(document))
        || document
            .extension()
            .is_some_and(|ext| WORD_EXTENSIONS.contains(&ext.as_str()))
}

/// External collaborators the standard strategies are built on.
#[derive(Clone)]
pub struct StrategyTools {
    pub pdf: Arc<dyn PdfBackend>,
    pub rasterizer: Arc<dyn Rasterizer>,
    pub ocr: Arc<dyn OcrEngine>,
    pub pandoc_bin: String,
}

/// Every built-in strategy. OCR strategies are included even when OCR is
/// disabled; the orchestrator filters them per document.
pub fn standard_strategies(tools: &StrategyTools) -> Vec<Arc<dyn ExtractionStrategy>> {
    vec![
        Arc::new(PdfTextStrategy),
        Arc::new(PlainTextStrategy),
        Arc::new(DocxPandocStrategy::new(tools.pandoc_bin.clone())),
        Arc::new(ImageOcrStrategy::new(tools.ocr.clone())),
        Arc::new(PdfOcrStrategy::new(
            tools.pdf.clone(),
            tools.rasterizer.clone(),
            tools.ocr.clone(),
        )),
        Arc::new(TextFallbackStrategy),
    ]
}
