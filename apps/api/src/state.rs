use std::sync::Arc;

use crate::config::Config;
use crate::extraction::ocr::TesseractEngine;
use crate::extraction::pdf::{LopdfBackend, PdftoppmRasterizer};
use crate::extraction::strategies::StrategyTools;
use crate::extraction::MultiStrategyParser;
use crate::validation::ResumeValidator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub parser: Arc<MultiStrategyParser>,
    pub validator: ResumeValidator,
}

impl AppState {
    /// Wires the standard strategies to the configured external tools.
    pub fn new(config: Config) -> Self {
        let tools = StrategyTools {
            pdf: Arc::new(LopdfBackend),
            rasterizer: Arc::new(PdftoppmRasterizer::new(config.tools.pdftoppm.clone())),
            ocr: Arc::new(TesseractEngine::new(config.tools.tesseract.clone())),
            pandoc_bin: config.tools.pandoc.clone(),
        };
        let validator = ResumeValidator::new(config.parser.validation.clone());
        let parser = MultiStrategyParser::standard(config.parser.clone(), tools);

        Self {
            config,
            parser: Arc::new(parser),
            validator,
        }
    }
}
