//! Pre-extraction inspection of a document.
//!
//! The analyzer never fails. If the PDF cannot be inspected it returns a
//! pessimistic result (image-based, OCR recommended) with a warning.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::extraction::error::ErrorKind;
use crate::extraction::pdf::{PdfBackend, PdfHandle, PdfMetadata, TextItem};
use crate::models::Document;

/// Only the first pages are inspected; resumes put their structure up front.
pub const MAX_SAMPLED_PAGES: usize = 5;
/// Characters per square unit below which a page is considered nearly empty.
const LOW_DENSITY: f64 = 0.001;
const ROW_BUCKET: f32 = 5.0;
const COLUMN_ROUNDING: f32 = 10.0;
const MAX_ROW_STARTS: usize = 3;
const SCATTER_FRACTION: f32 = 0.10;
const MAX_RUNS_PER_PAGE: usize = 200;
/// Fragments closer than this along a row belong to one run of text.
const RUN_GAP: f32 = 15.0;
const TABLE_TOLERANCE: f32 = 20.0;
const MIN_TABLE_ROWS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutComplexity {
    Simple,
    Moderate,
    Complex,
}

/// Broad family of extraction a strategy belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approach {
    TextExtraction,
    Ocr,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub is_password_protected: bool,
    pub is_image_based: bool,
    pub has_selectable_text: bool,
    pub has_images: bool,
    pub has_tables: bool,
    pub page_count: usize,
    pub pages_sampled: usize,
    /// Mean characters per square unit over the sampled pages.
    pub text_density: f64,
    pub layout_complexity: LayoutComplexity,
    pub recommended_strategy: Approach,
    pub warnings: Vec<String>,
    pub hints: Vec<String>,
    pub metadata: PdfMetadata,
}

impl AnalysisResult {
    fn base(recommended_strategy: Approach) -> Self {
        Self {
            is_password_protected: false,
            is_image_based: false,
            has_selectable_text: false,
            has_images: false,
            has_tables: false,
            page_count: 0,
            pages_sampled: 0,
            text_density: 0.0,
            layout_complexity: LayoutComplexity::Simple,
            recommended_strategy,
            warnings: Vec::new(),
            hints: Vec::new(),
            metadata: PdfMetadata::default(),
        }
    }

    /// Encrypted input. OCR is recommended for compatibility; the orchestrator
    /// decides whether a locked document is attempted at all.
    pub fn locked(metadata: PdfMetadata) -> Self {
        let mut result = Self::base(Approach::Ocr);
        result.is_password_protected = true;
        result.metadata = PdfMetadata {
            encrypted: true,
            ..metadata
        };
        result
            .warnings
            .push("Document is password protected; its text layer cannot be read".to_string());
        result
    }

    /// Pessimistic result used whenever inspection itself failed.
    pub fn degraded(reason: impl AsRef<str>) -> Self {
        let mut result = Self::base(Approach::Ocr);
        result.is_image_based = true;
        result
            .warnings
            .push(format!("Document analysis failed ({}); falling back to OCR", reason.as_ref()));
        result
    }
}

/// Per-page measurements feeding the document-level aggregate.
#[derive(Debug, Clone, Default, PartialEq)]
struct PageStats {
    fragments: usize,
    density: f64,
    complex: bool,
    has_table: bool,
    images: usize,
}

#[derive(Clone)]
pub struct DocumentAnalyzer {
    backend: Arc<dyn PdfBackend>,
}

impl DocumentAnalyzer {
    pub fn new(backend: Arc<dyn PdfBackend>) -> Self {
        Self { backend }
    }

    /// CPU-bound; async callers should run it on the blocking pool.
    pub fn analyze(&self, document: &Document) -> AnalysisResult {
        if !document.is_pdf_like() {
            return synthetic(document);
        }

        let handle = match self.backend.open(document.bytes()) {
            Ok(handle) => handle,
            Err(e) if e.kind == ErrorKind::PasswordProtected => {
                warn!(document = %document.file_name, "document is encrypted");
                return AnalysisResult::locked(PdfMetadata::default());
            }
            Err(e) => {
                warn!(document = %document.file_name, error = %e, "PDF inspection failed");
                return AnalysisResult::degraded(e.message);
            }
        };

        let metadata = handle.metadata();
        if metadata.encrypted {
            return AnalysisResult::locked(metadata);
        }

        match inspect(handle.as_ref(), metadata) {
            Ok(result) => {
                debug!(
                    document = %document.file_name,
                    pages = result.page_count,
                    image_based = result.is_image_based,
                    complexity = ?result.layout_complexity,
                    recommended = ?result.recommended_strategy,
                    "document analyzed"
                );
                result
            }
            Err(e) => {
                warn!(document = %document.file_name, error = %e, "PDF inspection failed");
                AnalysisResult::degraded(format!("{e:#}"))
            }
        }
    }
}

/// Analysis for inputs that have no page structure to inspect.
fn synthetic(document: &Document) -> AnalysisResult {
    if document.is_image() {
        let mut result = AnalysisResult::base(Approach::Ocr);
        result.is_image_based = true;
        result.has_images = true;
        result.page_count = 1;
        result
            .hints
            .push("Image upload; text will be recognized with OCR".to_string());
        return result;
    }

    let mut result = AnalysisResult::base(Approach::TextExtraction);
    result.has_selectable_text = !document.is_empty();
    result
        .hints
        .push("Layout analysis is only performed for PDF documents".to_string());
    result
}

fn inspect(handle: &dyn PdfHandle, metadata: PdfMetadata) -> Result<AnalysisResult> {
    let page_count = handle.page_count();
    if page_count == 0 {
        return Ok(AnalysisResult::degraded("PDF has no pages"));
    }

    let sampled = page_count.min(MAX_SAMPLED_PAGES);
    let mut pages = Vec::with_capacity(sampled);
    for page in 1..=sampled {
        let (width, height) = handle.page_size(page);
        let items = handle.text_items(page)?;
        pages.push(page_stats(&items, width, height, handle.image_count(page)));
    }

    let mut result = aggregate(&pages);
    result.page_count = page_count;
    result.metadata = metadata;
    Ok(result)
}

fn page_stats(items: &[TextItem], width: f32, height: f32, images: usize) -> PageStats {
    let chars: usize = items.iter().map(|i| i.text.chars().count()).sum();
    let area = (width * height).max(1.0) as f64;
    let rows = group_rows(items);
    let runs: Vec<Vec<(f32, f32)>> = rows.values().map(|row| merge_runs(row)).collect();
    let run_count: usize = runs.iter().map(Vec::len).sum();

    let complex = has_columns(&rows) || is_scattered(&rows, height) || run_count > MAX_RUNS_PER_PAGE;

    PageStats {
        fragments: items.len(),
        density: chars as f64 / area,
        complex,
        has_table: has_table(&runs),
        images,
    }
}

/// Buckets fragments into rows by vertical position. Keys descend the page
/// in ascending order of bucket; each row is sorted left to right.
fn group_rows(items: &[TextItem]) -> BTreeMap<i64, Vec<&TextItem>> {
    let mut rows: BTreeMap<i64, Vec<&TextItem>> = BTreeMap::new();
    for item in items {
        let bucket = (item.y / ROW_BUCKET).round() as i64;
        rows.entry(bucket).or_default().push(item);
    }
    for row in rows.values_mut() {
        row.sort_by(|a, b| a.x.total_cmp(&b.x));
    }
    rows
}

/// Merges adjacent fragments of a sorted row into `(start, end)` runs.
fn merge_runs(row: &[&TextItem]) -> Vec<(f32, f32)> {
    let mut runs: Vec<(f32, f32)> = Vec::new();
    for item in row {
        let end = item.x + item.width;
        match runs.last_mut() {
            Some(run) if item.x - run.1 < RUN_GAP => run.1 = run.1.max(end),
            _ => runs.push((item.x, end)),
        }
    }
    runs
}

/// Column detection: too many distinct left edges across rows.
fn has_columns(rows: &BTreeMap<i64, Vec<&TextItem>>) -> bool {
    let starts: BTreeSet<i64> = rows
        .values()
        .filter_map(|row| row.first())
        .map(|item| (item.x / COLUMN_ROUNDING).round() as i64)
        .collect();
    starts.len() > MAX_ROW_STARTS
}

/// Scatter detection: line spacing varies by more than a tenth of the page.
fn is_scattered(rows: &BTreeMap<i64, Vec<&TextItem>>, page_height: f32) -> bool {
    let ys: Vec<f32> = rows
        .values()
        .map(|row| row.iter().map(|i| i.y).sum::<f32>() / row.len() as f32)
        .collect();
    if ys.len() < 3 {
        return false;
    }
    let gaps: Vec<f32> = ys.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    std_dev(&gaps) > page_height * SCATTER_FRACTION
}

fn std_dev(values: &[f32]) -> f32 {
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n).sqrt()
}

/// A table is at least three rows of three or more cells whose column starts
/// line up within tolerance.
fn has_table(runs: &[Vec<(f32, f32)>]) -> bool {
    let candidates: Vec<Vec<f32>> = runs
        .iter()
        .filter(|row| row.len() > 2)
        .map(|row| row.iter().map(|(start, _)| *start).collect())
        .collect();

    candidates.iter().any(|signature| {
        candidates
            .iter()
            .filter(|other| congruent(signature, other))
            .count()
            >= MIN_TABLE_ROWS
    })
}

fn congruent(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= TABLE_TOLERANCE)
}

fn aggregate(pages: &[PageStats]) -> AnalysisResult {
    let sampled = pages.len().max(1) as f64;
    let empty_pages = pages.iter().filter(|p| p.fragments == 0).count() as f64;
    let mean_density = pages.iter().map(|p| p.density).sum::<f64>() / sampled;
    let fragments: usize = pages.iter().map(|p| p.fragments).sum();
    let images: usize = pages.iter().map(|p| p.images).sum();
    let complex_fraction = pages.iter().filter(|p| p.complex).count() as f64 / sampled;

    let is_image_based = empty_pages / sampled > 0.5 || mean_density < LOW_DENSITY;
    let has_selectable_text = fragments > 50 && !is_image_based;
    let layout_complexity = if complex_fraction < 0.3 {
        LayoutComplexity::Simple
    } else if complex_fraction < 0.7 {
        LayoutComplexity::Moderate
    } else {
        LayoutComplexity::Complex
    };

    let recommended_strategy = if is_image_based {
        Approach::Ocr
    } else if has_selectable_text && layout_complexity == LayoutComplexity::Simple {
        Approach::TextExtraction
    } else {
        Approach::Hybrid
    };

    let mut result = AnalysisResult::base(recommended_strategy);
    result.is_image_based = is_image_based;
    result.has_selectable_text = has_selectable_text;
    result.has_images = images > 0;
    result.has_tables = pages.iter().any(|p| p.has_table);
    result.pages_sampled = pages.len();
    result.text_density = mean_density;
    result.layout_complexity = layout_complexity;

    if is_image_based {
        result
            .warnings
            .push("Document appears to be scanned or image-based; OCR is required".to_string());
    }
    match layout_complexity {
        LayoutComplexity::Complex => result
            .warnings
            .push("Complex multi-column or scattered layout; reading order may be imperfect".to_string()),
        LayoutComplexity::Moderate => result
            .hints
            .push("Some pages use columns or irregular spacing".to_string()),
        LayoutComplexity::Simple => {}
    }
    if mean_density < LOW_DENSITY {
        result
            .warnings
            .push(format!("Low text density ({mean_density:.5} chars per unit area)"));
    }
    if images > 0 {
        result
            .hints
            .push(format!("Contains {images} embedded image(s); logos or photos are ignored"));
    }
    if result.has_tables {
        result
            .hints
            .push("Table-like regions detected; cell order follows rows".to_string());
    }

    result
}
