use std::str::FromStr;

use anyhow::{Context, Result};

use crate::extraction::settings::ParserPreset;
use crate::extraction::ParserConfig;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Paths of the external programs the strategies shell out to.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub tesseract: String,
    pub pdftoppm: String,
    pub pandoc: String,
}

/// Service configuration loaded from environment variables.
/// Everything has a default; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub max_upload_bytes: usize,
    pub parser: ParserConfig,
    pub tools: ToolPaths,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. The preset is applied first and
    /// the individual `PARSER_*` variables override it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let preset: ParserPreset = parse_or(&lookup, "PARSER_PRESET", ParserPreset::Production)?;
        let mut parser = ParserConfig::preset(preset);

        if let Some(retries) = parse_opt(&lookup, "PARSER_MAX_RETRIES")? {
            parser.max_retries = retries;
        }
        if let Some(timeout_ms) = parse_opt(&lookup, "PARSER_TIMEOUT_MS")? {
            parser.timeout_ms = timeout_ms;
        }
        match parse_opt(&lookup, "PARSER_DOCUMENT_TIMEOUT_MS")? {
            Some(document_timeout_ms) => parser.document_timeout_ms = document_timeout_ms,
            // a longer attempt limit stretches the preset's document limit with it
            None => parser.document_timeout_ms = parser.document_timeout_ms.max(parser.timeout_ms),
        }
        if let Some(enable) = lookup("PARSER_ENABLE_OCR") {
            parser.enable_ocr = parse_bool(&enable).context("PARSER_ENABLE_OCR must be a boolean")?;
        }
        if let Some(locked) = lookup("LOCKED_DOCUMENTS_TRY_OCR") {
            parser.ocr_locked_documents =
                parse_bool(&locked).context("LOCKED_DOCUMENTS_TRY_OCR must be a boolean")?;
        }
        if let Some(language) = lookup("OCR_LANGUAGE").filter(|l| !l.trim().is_empty()) {
            parser.ocr.language = language.trim().to_string();
        }
        parser.validate().context("invalid parser configuration")?;

        Ok(Config {
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            parser,
            tools: ToolPaths {
                tesseract: lookup("TESSERACT_BIN").unwrap_or_else(|| "tesseract".to_string()),
                pdftoppm: lookup("PDFTOPPM_BIN").unwrap_or_else(|| "pdftoppm".to_string()),
                pandoc: lookup("PANDOC_BIN").unwrap_or_else(|| "pandoc".to_string()),
            },
        })
    }
}

fn parse_opt<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{key} has an invalid value '{raw}': {e}")),
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("'{other}' is not a boolean"),
    }
}
