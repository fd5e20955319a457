//! Parser configuration and named presets.
//!
//! Presets only vary retry budget, timeout, whether OCR runs at all and OCR
//! tuning. They never change the orchestration algorithm.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::validation::ValidationSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserPreset {
    Fast,
    Comprehensive,
    OcrFocused,
    Production,
}

impl FromStr for ParserPreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fast" => Ok(ParserPreset::Fast),
            "comprehensive" => Ok(ParserPreset::Comprehensive),
            "ocr_focused" | "ocr" => Ok(ParserPreset::OcrFocused),
            "production" | "prod" => Ok(ParserPreset::Production),
            other => bail!("unknown parser preset '{other}'"),
        }
    }
}

/// Tesseract tuning passed through to the OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrSettings {
    pub language: String,
    pub page_seg_mode: u8,
    pub dpi: u32,
    pub preserve_interword_spaces: bool,
    /// Pages rasterized per PDF. Resumes rarely exceed a handful.
    pub max_pages: usize,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            page_seg_mode: 3,
            dpi: 300,
            preserve_interword_spaces: true,
            max_pages: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    pub preset: ParserPreset,
    pub max_retries: u32,
    /// Limit for a single strategy attempt.
    pub timeout_ms: u64,
    /// Limit for the whole document, analysis and every attempt included.
    pub document_timeout_ms: u64,
    pub enable_ocr: bool,
    pub ocr: OcrSettings,
    /// Below this many characters a successful extraction carries a warning.
    pub min_text_length: usize,
    /// Compatibility switch: send password-protected documents to OCR instead
    /// of failing them as locked.
    pub ocr_locked_documents: bool,
    pub validation: ValidationSettings,
}

impl ParserConfig {
    pub fn preset(preset: ParserPreset) -> Self {
        let base = Self {
            preset,
            max_retries: 3,
            timeout_ms: 60_000,
            document_timeout_ms: 180_000,
            enable_ocr: true,
            ocr: OcrSettings::default(),
            min_text_length: 50,
            ocr_locked_documents: false,
            validation: ValidationSettings::default(),
        };

        match preset {
            ParserPreset::Fast => Self {
                max_retries: 1,
                timeout_ms: 10_000,
                document_timeout_ms: 10_000,
                enable_ocr: false,
                ocr: OcrSettings {
                    dpi: 150,
                    ..OcrSettings::default()
                },
                ..base
            },
            ParserPreset::Comprehensive => Self {
                max_retries: 4,
                timeout_ms: 120_000,
                document_timeout_ms: 480_000,
                ocr: OcrSettings {
                    page_seg_mode: 1,
                    ..OcrSettings::default()
                },
                ..base
            },
            ParserPreset::OcrFocused => Self {
                max_retries: 3,
                timeout_ms: 180_000,
                document_timeout_ms: 540_000,
                ocr: OcrSettings {
                    page_seg_mode: 6,
                    dpi: 400,
                    ..OcrSettings::default()
                },
                ..base
            },
            ParserPreset::Production => base,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn document_timeout(&self) -> Duration {
        Duration::from_millis(self.document_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries < 1 {
            bail!("max_retries must be at least 1");
        }
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }
        if self.document_timeout_ms < self.timeout_ms {
            bail!(
                "document_timeout_ms ({}) must not be shorter than timeout_ms ({})",
                self.document_timeout_ms,
                self.timeout_ms
            );
        }
        if self.ocr.dpi < 72 || self.ocr.dpi > 1200 {
            bail!("OCR dpi {} is outside 72..=1200", self.ocr.dpi);
        }
        if self.ocr.page_seg_mode > 13 {
            bail!("OCR page segmentation mode {} is not a tesseract mode", self.ocr.page_seg_mode);
        }
        if self.ocr.max_pages == 0 {
            bail!("OCR max_pages must be at least 1");
        }
        Ok(())
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self::preset(ParserPreset::Production)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_are_valid() {
        for preset in [
            ParserPreset::Fast,
            ParserPreset::Comprehensive,
            ParserPreset::OcrFocused,
            ParserPreset::Production,
        ] {
            ParserConfig::preset(preset).validate().unwrap();
        }
    }

    #[test]
    fn test_fast_disables_ocr() {
        let cfg = ParserConfig::preset(ParserPreset::Fast);
        assert!(!cfg.enable_ocr);
        assert_eq!(cfg.max_retries, 1);
    }

    #[test]
    fn test_ocr_focused_tuning() {
        let cfg = ParserConfig::preset(ParserPreset::OcrFocused);
        assert!(cfg.enable_ocr);
        assert_eq!(cfg.ocr.page_seg_mode, 6);
        assert_eq!(cfg.ocr.dpi, 400);
    }

    #[test]
    fn test_presets_share_text_thresholds() {
        let fast = ParserConfig::preset(ParserPreset::Fast);
        let full = ParserConfig::preset(ParserPreset::Comprehensive);
        assert_eq!(fast.min_text_length, full.min_text_length);
        assert_eq!(fast.ocr_locked_documents, full.ocr_locked_documents);
    }

    #[test]
    fn test_preset_from_str() {
        assert_eq!("OCR-Focused".parse::<ParserPreset>().unwrap(), ParserPreset::OcrFocused);
        assert_eq!("prod".parse::<ParserPreset>().unwrap(), ParserPreset::Production);
        assert!("turbo".parse::<ParserPreset>().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_retries_and_timeout() {
        let mut cfg = ParserConfig::default();
        cfg.max_retries = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ParserConfig::default();
        cfg.timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_document_timeout_covers_one_attempt() {
        let mut cfg = ParserConfig::default();
        assert!(cfg.document_timeout() >= cfg.timeout());
        cfg.document_timeout_ms = cfg.timeout_ms - 1;
        assert!(cfg.validate().is_err());
    }
}
