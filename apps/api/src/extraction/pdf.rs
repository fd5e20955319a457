//! PDF library boundary: open / page count / metadata / positioned text items,
//! plus page rasterization for the OCR path.
//!
//! `LopdfBackend` walks content streams with `lopdf`; positions are good enough
//! for layout heuristics, not for faithful rendering. Rasterization shells out
//! to `pdftoppm`.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lopdf::content::Content;
use lopdf::{Dictionary, Object, ObjectId};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::extraction::error::{ErrorKind, ParserError, Severity};

/// US Letter, used when a page carries no usable MediaBox.
const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);
/// Rough glyph advance as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PdfMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub producer: Option<String>,
    pub encrypted: bool,
}

/// An opened PDF. Pages are 1-based.
pub trait PdfHandle: Send {
    fn page_count(&self) -> usize;
    fn metadata(&self) -> PdfMetadata;
    fn page_size(&self, page: usize) -> (f32, f32);
    fn text_items(&self, page: usize) -> Result<Vec<TextItem>>;
    fn image_count(&self, page: usize) -> usize;
}

pub trait PdfBackend: Send + Sync {
    /// Fails with `PasswordProtected` for encrypted files and
    /// `EmptyOrCorruptInput` for anything that does not parse.
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PdfHandle>, ParserError>;
}

// ────────────────────────────────────────────────────────────────────────────
// lopdf backend
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfBackend;

impl PdfBackend for LopdfBackend {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PdfHandle>, ParserError> {
        let doc = lopdf::Document::load_mem(bytes).map_err(|e| {
            let message = e.to_string();
            let lower = message.to_lowercase();
            if lower.contains("encrypt") || lower.contains("password") || lower.contains("decrypt") {
                ParserError::new(ErrorKind::PasswordProtected, format!("PDF is encrypted: {message}"))
            } else {
                corrupt_pdf(format!("PDF could not be opened: {message}"))
            }
        })?;

        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(ParserError::new(
                ErrorKind::PasswordProtected,
                "PDF is encrypted and cannot be read without a password",
            ));
        }

        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        debug!(pages = pages.len(), "opened PDF");
        Ok(Box::new(LopdfHandle { doc, pages }))
    }
}

/// A damaged container is not necessarily unreadable by every tool, so this
/// stays retryable and below fatal.
fn corrupt_pdf(message: String) -> ParserError {
    ParserError::empty_or_corrupt(message)
        .with_severity(Severity::High)
        .with_retryable(true)
}

struct LopdfHandle {
    doc: lopdf::Document,
    pages: Vec<ObjectId>,
}

impl LopdfHandle {
    fn page_dict(&self, page: usize) -> Result<&Dictionary> {
        let id = page
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .ok_or_else(|| anyhow!("page {page} not found"))?;
        Ok(self.doc.get_object(*id)?.as_dict()?)
    }

    /// Looks up `key` on the page or, failing that, on its ancestors.
    fn inherited<'a>(&'a self, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        let mut current = page;
        for _ in 0..16 {
            if let Ok(value) = current.get(key) {
                return Some(value);
            }
            let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
            current = self.doc.get_object(parent).ok()?.as_dict().ok()?;
        }
        None
    }

    fn resolve<'a>(&'a self, obj: &'a Object) -> &'a Object {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).unwrap_or(obj),
            other => other,
        }
    }

    fn info_string(&self, info: &Dictionary, key: &[u8]) -> Option<String> {
        match self.resolve(info.get(key).ok()?) {
            Object::String(bytes, _) => {
                let text = decode_pdf_string(bytes);
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            _ => None,
        }
    }
}

impl PdfHandle for LopdfHandle {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn metadata(&self) -> PdfMetadata {
        let info = self
            .doc
            .trailer
            .get(b"Info")
            .ok()
            .map(|o| self.resolve(o))
            .and_then(|o| o.as_dict().ok());

        PdfMetadata {
            title: info.and_then(|d| self.info_string(d, b"Title")),
            author: info.and_then(|d| self.info_string(d, b"Author")),
            producer: info.and_then(|d| self.info_string(d, b"Producer")),
            encrypted: self.doc.trailer.get(b"Encrypt").is_ok(),
        }
    }

    fn page_size(&self, page: usize) -> (f32, f32) {
        let Ok(dict) = self.page_dict(page) else {
            return DEFAULT_PAGE_SIZE;
        };
        let Some(Object::Array(bounds)) = self.inherited(dict, b"MediaBox").map(|o| self.resolve(o)) else {
            return DEFAULT_PAGE_SIZE;
        };
        let nums: Vec<f32> = bounds.iter().filter_map(|o| as_number(self.resolve(o))).collect();
        match nums.as_slice() {
            [x0, y0, x1, y1] if (x1 - x0).abs() > 0.0 && (y1 - y0).abs() > 0.0 => {
                ((x1 - x0).abs(), (y1 - y0).abs())
            }
            _ => DEFAULT_PAGE_SIZE,
        }
    }

    fn text_items(&self, page: usize) -> Result<Vec<TextItem>> {
        let id = page
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .ok_or_else(|| anyhow!("page {page} not found"))?;
        let data = self
            .doc
            .get_page_content(*id)
            .with_context(|| format!("reading content stream of page {page}"))?;
        let content = Content::decode(&data).with_context(|| format!("decoding content of page {page}"))?;
        Ok(collect_text_items(&content))
    }

    fn image_count(&self, page: usize) -> usize {
        let Ok(dict) = self.page_dict(page) else {
            return 0;
        };
        let resources = match self.inherited(dict, b"Resources").map(|o| self.resolve(o)) {
            Some(Object::Dictionary(d)) => d,
            _ => return 0,
        };
        let xobjects = match resources.get(b"XObject").ok().map(|o| self.resolve(o)) {
            Some(Object::Dictionary(d)) => d,
            _ => return 0,
        };
        xobjects
            .iter()
            .filter(|(_, obj)| match self.resolve(obj) {
                Object::Stream(stream) => matches!(
                    stream.dict.get(b"Subtype").ok().map(|o| self.resolve(o)),
                    Some(Object::Name(name)) if name.as_slice() == b"Image"
                ),
                _ => false,
            })
            .count()
    }
}

/// Minimal text-state machine over content stream operators.
fn collect_text_items(content: &Content) -> Vec<TextItem> {
    let mut items = Vec::new();
    let mut font_size = 12.0_f32;
    let mut leading = 0.0_f32;
    let mut scale = 1.0_f32;
    let mut line = (0.0_f32, 0.0_f32);
    let mut pos = line;

    for op in &content.operations {
        let nums: Vec<f32> = op.operands.iter().filter_map(as_number).collect();
        match op.operator.as_str() {
            "BT" => {
                scale = 1.0;
                line = (0.0, 0.0);
                pos = line;
            }
            "Tf" => {
                if let Some(size) = nums.last() {
                    font_size = size.abs().max(1.0);
                }
            }
            "TL" => {
                if let Some(l) = nums.first() {
                    leading = *l;
                }
            }
            "Td" | "TD" => {
                if let [tx, ty, ..] = nums.as_slice() {
                    if op.operator == "TD" {
                        leading = -ty;
                    }
                    line = (line.0 + tx * scale, line.1 + ty * scale);
                    pos = line;
                }
            }
            "Tm" => {
                if let [a, _, _, d, e, f] = nums.as_slice() {
                    scale = if d.abs() > f32::EPSILON { d.abs() } else { a.abs().max(f32::EPSILON) };
                    line = (*e, *f);
                    pos = line;
                }
            }
            "T*" => {
                line.1 -= leading * scale;
                pos = line;
            }
            "Tj" | "'" | "\"" => {
                if op.operator != "Tj" {
                    line.1 -= leading * scale;
                    pos = line;
                }
                if let Some(Object::String(bytes, _)) = op.operands.last() {
                    push_item(&mut items, decode_pdf_string(bytes), &mut pos, font_size * scale);
                }
            }
            "TJ" => {
                let Some(Object::Array(parts)) = op.operands.first() else {
                    continue;
                };
                let start = pos;
                let mut text = String::new();
                let mut shift = 0.0_f32;
                for part in parts {
                    match part {
                        Object::String(bytes, _) => text.push_str(&decode_pdf_string(bytes)),
                        other => {
                            if let Some(adjust) = as_number(other) {
                                shift -= adjust / 1000.0 * font_size * scale;
                                if adjust < -200.0 {
                                    text.push(' ');
                                }
                            }
                        }
                    }
                }
                pos = start;
                push_item(&mut items, text, &mut pos, font_size * scale);
                pos.0 += shift;
            }
            _ => {}
        }
    }

    items
}

fn push_item(items: &mut Vec<TextItem>, text: String, pos: &mut (f32, f32), size: f32) {
    let width = text.chars().count() as f32 * size * AVG_GLYPH_WIDTH;
    if !text.trim().is_empty() {
        items.push(TextItem {
            text,
            x: pos.0,
            y: pos.1,
            width,
            height: size,
        });
    }
    pos.0 += width;
}

fn as_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// UTF-16BE when BOM-prefixed, otherwise a byte-per-char (Latin-1 style) decode.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Rasterization
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RasterImage {
    pub page: usize,
    pub dpi: u32,
    pub png: Vec<u8>,
}

#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Renders one 1-based page of the PDF stored at `pdf_path`.
    async fn rasterize(&self, pdf_path: &Path, page: usize, dpi: u32) -> Result<RasterImage, ParserError>;
}

#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    binary: String,
}

impl PdftoppmRasterizer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl Rasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, pdf_path: &Path, page: usize, dpi: u32) -> Result<RasterImage, ParserError> {
        let out_dir = tempfile::Builder::new()
            .prefix("raster_")
            .tempdir()
            .map_err(|e| ParserError::ocr(format!("could not create raster directory: {e}")))?;
        let prefix = out_dir.path().join("page");

        let output = Command::new(&self.binary)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-singlefile")
            .arg(pdf_path)
            .arg(&prefix)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ParserError::ocr(format!("{} could not be started: {e}", self.binary)))?;

        if !output.status.success() {
            return Err(ParserError::ocr(format!(
                "{} failed for page {page}: {}",
                self.binary,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
            .with_context("page", page.to_string()));
        }

        let png = tokio::fs::read(prefix.with_extension("png"))
            .await
            .map_err(|e| ParserError::ocr(format!("rasterized page {page} is missing: {e}")))?;

        Ok(RasterImage { page, dpi, png })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Operation;

    fn op(operator: &str, operands: Vec<Object>) -> Operation {
        Operation::new(operator, operands)
    }

    fn int(i: i64) -> Object {
        Object::Integer(i)
    }

    fn string(s: &str) -> Object {
        Object::string_literal(s)
    }

    #[test]
    fn test_collect_text_items_positions() {
        let content = Content {
            operations: vec![
                op("BT", vec![]),
                op("Tf", vec![Object::Name(b"F1".to_vec()), int(10)]),
                op("Td", vec![int(72), int(700)]),
                op("Tj", vec![string("Jane Doe")]),
                op("Td", vec![int(0), int(-14)]),
                op("Tj", vec![string("Engineer")]),
                op("ET", vec![]),
            ],
        };
        let items = collect_text_items(&content);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].text, "Jane Doe");
        assert_eq!((items[0].x, items[0].y), (72.0, 700.0));
        assert_eq!((items[1].x, items[1].y), (72.0, 686.0));
        assert_eq!(items[1].height, 10.0);
    }

    #[test]
    fn test_tj_array_joins_with_spaces() {
        let content = Content {
            operations: vec![
                op("BT", vec![]),
                op("Tm", vec![int(1), int(0), int(0), int(1), int(50), int(500)]),
                op(
                    "TJ",
                    vec![Object::Array(vec![string("Senior"), int(-300), string("Engineer")])],
                ),
            ],
        };
        let items = collect_text_items(&content);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "Senior Engineer");
        assert_eq!(items[0].x, 50.0);
    }

    #[test]
    fn test_blank_strings_are_skipped() {
        let content = Content {
            operations: vec![op("BT", vec![]), op("Tj", vec![string("   ")])],
        };
        assert!(collect_text_items(&content).is_empty());
    }

    #[test]
    fn test_decode_utf16_string() {
        let bytes = [0xFE, 0xFF, 0x00, 0x4A, 0x00, 0x6F];
        assert_eq!(decode_pdf_string(&bytes), "Jo");
        assert_eq!(decode_pdf_string(b"Plain"), "Plain");
    }

    #[test]
    fn test_open_garbage_is_corrupt_not_fatal() {
        let err = LopdfBackend.open(b"definitely not a pdf").err().unwrap();
        assert_eq!(err.kind, ErrorKind::EmptyOrCorruptInput);
        assert!(!err.is_terminal());
    }
}
