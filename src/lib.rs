//! Boox NeoReader highlight conversion using lopdf
//!
//! This crate provides:
//! - Parsing of the NeoReader `-annotation.txt` export
//! - Location of highlighted text on a PDF page as highlight rectangles,
//!   with a tokenizing fallback for text the export could not encode
//! - Duplicate detection so repeated runs never stack identical highlights
//! - Writing standard `/Highlight` annotations back into the PDF

pub mod backup;
pub mod convert;
pub mod document;
pub mod export;
pub mod extractor;
pub mod geometry;
pub mod highlight;
pub mod layout;
pub mod merge;
pub mod search;

pub use convert::{convert_file, convert_records, ConversionReport, ConvertOptions};
pub use document::PdfDocument;
pub use export::{parse_annotations, read_annotations, AnnotationRecord};
pub use geometry::{AnnotRect, SearchRect};
pub use highlight::Highlight;
pub use search::{PageTextSource, SearchConfig, SearchError, TextSearcher};

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("PDF is encrypted")]
    Encrypted,
    #[error("Invalid PDF structure")]
    InvalidStructure,
    #[error("Page {0} does not exist")]
    PageOutOfRange(usize),
    #[error("Annotation export error on line {line}: {message}")]
    Export { line: usize, message: String },
}

impl From<lopdf::Error> for PdfError {
    fn from(e: lopdf::Error) -> Self {
        PdfError::Parse(e.to_string())
    }
}
