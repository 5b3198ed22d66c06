//! Reader for the NeoReader annotation export
//!
//! The export for `<dir>/<stem>.pdf` lives at
//! `<dir>/<stem>/<stem>-annotation.txt`. Each annotation is laid out as:
//!
//! ```text
//! Page 12  optional comment\n
//! optional comment continuation\n
//! highlighted text\r\n
//! last highlighted line\0\r\n
//! -------------------\n
//! ```

use crate::PdfError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static PAGE_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Page ([0-9]+)(?:\s{1,2}(.*))?$").unwrap());

/// Placeholder the reader writes for a word break it could not encode
const WORD_BREAK_PLACEHOLDER: char = '\u{FFFE}';
const SEPARATOR: &str = "--------------------";

/// One highlight from the export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord {
    /// 0-based page index
    pub page: usize,
    /// Highlighted text, possibly spanning several lines
    pub text: String,
    pub comment: Option<String>,
}

/// Path of the export belonging to a PDF
pub fn annotation_file_path<P: AsRef<Path>>(pdf_path: P) -> PathBuf {
    let pdf_path = pdf_path.as_ref();
    let stem = pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    pdf_path
        .with_extension("")
        .join(format!("{}-annotation.txt", stem))
}

/// Read the export for a PDF; `Ok(None)` when the PDF has none
pub fn read_annotations<P: AsRef<Path>>(
    pdf_path: P,
) -> Result<Option<Vec<AnnotationRecord>>, PdfError> {
    let path = annotation_file_path(&pdf_path);
    if !path.is_file() {
        log::debug!("Expected annotation file {} does not exist", path.display());
        return Ok(None);
    }
    // Invalid UTF-8 turns into U+FFFD, which the fallback search skips over
    let bytes = std::fs::read(&path)?;
    let content = String::from_utf8_lossy(&bytes);
    parse_annotations(&content).map(Some)
}

/// Record under construction
struct Pending {
    page: String,
    text: String,
    comment: String,
    ended: bool,
}

/// Parse the contents of an export file
pub fn parse_annotations(content: &str) -> Result<Vec<AnnotationRecord>, PdfError> {
    let mut records = Vec::new();
    let mut pending: Option<Pending> = None;

    for (idx, raw) in content.split_inclusive('\n').enumerate() {
        let line_no = idx + 1;
        let line = raw.replace(WORD_BREAK_PLACEHOLDER, "-\n");

        let Some(current) = pending.as_mut() else {
            if line.trim().is_empty() {
                continue;
            }
            let header = line.trim_end_matches(['\r', '\n']);
            let caps = PAGE_HEADER_RE.captures(header).ok_or_else(|| PdfError::Export {
                line: line_no,
                message: format!("expected a 'Page N' header, found {:?}", header),
            })?;
            pending = Some(Pending {
                page: caps[1].to_string(),
                text: String::new(),
                comment: caps.get(2).map_or("", |m| m.as_str()).to_string(),
                ended: false,
            });
            continue;
        };

        if line.contains('\0') {
            current.ended = true;
            current.text.push_str(&line.replace('\0', ""));
        } else if line.contains(SEPARATOR) {
            if !current.ended {
                return Err(PdfError::Export {
                    line: line_no,
                    message: "annotation closed without a NUL-terminated text line".into(),
                });
            }
            if let Some(done) = pending.take() {
                records.push(finish_record(done, line_no)?);
            }
        } else if line.contains("\r\n") {
            current.text.push_str(&line);
        } else if line.contains('\n') {
            current.comment.push_str(&line);
        } else if !line.trim().is_empty() {
            return Err(PdfError::Export {
                line: line_no,
                message: format!("unrecognised line {:?}", line),
            });
        }
    }

    if pending.is_some() {
        return Err(PdfError::Export {
            line: content.lines().count(),
            message: "file ended inside an annotation".into(),
        });
    }
    Ok(records)
}

fn finish_record(pending: Pending, line_no: usize) -> Result<AnnotationRecord, PdfError> {
    let page: usize = pending.page.parse().map_err(|_| PdfError::Export {
        line: line_no,
        message: format!("invalid page number {:?}", pending.page),
    })?;
    // Pages are numbered from 1 in the export
    let page = page.checked_sub(1).ok_or_else(|| PdfError::Export {
        line: line_no,
        message: "page numbers start at 1".into(),
    })?;
    let comment = pending.comment.trim_end().to_string();
    Ok(AnnotationRecord {
        page,
        text: pending.text.trim_end().to_string(),
        comment: if comment.is_empty() { None } else { Some(comment) },
    })
}
