//! Document text extraction.
//!
//! A document is analyzed once, then handed to ranked strategies until one of
//! them yields text that survives cleaning and validation. Failures are typed
//! (`error`), drive the fallback table (`registry`) and are reported with the
//! full attempt history when every path is exhausted.

pub mod analyzer;
pub mod cleaning;
pub mod error;
pub mod handlers;
pub mod ocr;
pub mod parser;
pub mod pdf;
pub mod progress;
pub mod registry;
pub mod settings;
pub mod strategies;
pub mod strategy;

pub use analyzer::AnalysisResult;
pub use error::{ErrorKind, ParseFailure};
pub use parser::{MultiStrategyParser, ParseOutcome};
pub use settings::ParserConfig;
