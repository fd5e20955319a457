//! OCR engine boundary. The default engine runs the `tesseract` CLI on a
//! temporary copy of the image.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::extraction::error::ParserError;
use crate::extraction::settings::OcrSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrOutput {
    pub text: String,
    /// Mean word confidence when the engine reports one, 0 – 100.
    pub confidence: Option<f32>,
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fails with `OcrFailed`; never returns an untyped error.
    async fn recognize(&self, image: &[u8], settings: &OcrSettings) -> Result<OcrOutput, ParserError>;
}

#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: String,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn args(settings: &OcrSettings) -> Vec<String> {
        let mut args = vec![
            "stdout".to_string(),
            "-l".to_string(),
            settings.language.clone(),
            "--psm".to_string(),
            settings.page_seg_mode.to_string(),
            "--dpi".to_string(),
            settings.dpi.to_string(),
        ];
        if settings.preserve_interword_spaces {
            args.push("-c".to_string());
            args.push("preserve_interword_spaces=1".to_string());
        }
        args
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn recognize(&self, image: &[u8], settings: &OcrSettings) -> Result<OcrOutput, ParserError> {
        if image.is_empty() {
            return Err(ParserError::ocr("OCR received an empty image"));
        }

        let work_dir = tempfile::Builder::new()
            .prefix("ocr_")
            .tempdir()
            .map_err(|e| ParserError::ocr(format!("could not create OCR directory: {e}")))?;
        let image_path = work_dir.path().join("input.img");
        tokio::fs::write(&image_path, image)
            .await
            .map_err(|e| ParserError::ocr(format!("could not stage image for OCR: {e}")))?;

        let output = Command::new(&self.binary)
            .arg(&image_path)
            .args(Self::args(settings))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ParserError::ocr(format!("{} could not be started: {e}", self.binary)))?;

        if !output.status.success() {
            return Err(ParserError::ocr(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(chars = text.len(), language = %settings.language, "tesseract finished");
        Ok(OcrOutput {
            text,
            confidence: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_follow_settings() {
        let settings = OcrSettings {
            language: "deu".to_string(),
            page_seg_mode: 6,
            dpi: 400,
            preserve_interword_spaces: true,
            max_pages: 3,
        };
        let args = TesseractEngine::args(&settings);
        assert_eq!(
            args,
            vec!["stdout", "-l", "deu", "--psm", "6", "--dpi", "400", "-c", "preserve_interword_spaces=1"]
        );
    }

    #[test]
    fn test_args_without_interword_spaces() {
        let settings = OcrSettings {
            preserve_interword_spaces: false,
            ..OcrSettings::default()
        };
        assert!(!TesseractEngine::args(&settings).iter().any(|a| a.starts_with("preserve")));
    }

    #[tokio::test]
    async fn test_empty_image_is_ocr_failure() {
        let engine = TesseractEngine::new("tesseract");
        let err = engine.recognize(&[], &OcrSettings::default()).await.unwrap_err();
        assert_eq!(err.kind, crate::extraction::error::ErrorKind::OcrFailed);
    }

    #[tokio::test]
    async fn test_missing_binary_is_ocr_failure() {
        let engine = TesseractEngine::new("definitely-not-a-real-ocr-binary");
        let err = engine
            .recognize(b"\x89PNG fake", &OcrSettings::default())
            .await
            .unwrap_err();
        assert!(err.message.contains("could not be started"));
    }
}
