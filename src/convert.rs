//! Conversion driver: export records in, highlight annotations out

use crate::backup::backup;
use crate::document::PdfDocument;
use crate::export::{read_annotations, AnnotationRecord};
use crate::geometry::AnnotRect;
use crate::highlight::{Highlight, DEFAULT_COLOR};
use crate::search::{PageTextSource, SearchConfig, SearchError, TextSearcher};
use crate::PdfError;
use std::path::{Path, PathBuf};

/// Destination for resolved highlights
pub trait HighlightSink {
    fn add_highlight(&mut self, page: usize, highlight: &Highlight) -> Result<(), PdfError>;
}

impl HighlightSink for PdfDocument {
    fn add_highlight(&mut self, page: usize, highlight: &Highlight) -> Result<(), PdfError> {
        PdfDocument::add_highlight(self, page, highlight).map(|_| ())
    }
}

/// Options for a conversion run
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Written as the annotation's `/T` entry
    pub author: Option<String>,
    pub color: [f32; 3],
    /// Write to `result.<name>` instead of overwriting the input
    pub new_file: bool,
    /// Keep a `.bak` copy of the input
    pub backup: bool,
    pub search: SearchConfig,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            author: None,
            color: DEFAULT_COLOR,
            new_file: false,
            backup: true,
            search: SearchConfig::default(),
        }
    }
}

/// Highlights added on one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    /// 0-based page index
    pub page: usize,
    pub added: usize,
}

/// A record that could not be turned into a highlight
#[derive(Debug, Clone)]
pub struct RecordFailure {
    pub page: usize,
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConversionReport {
    pub pages: Vec<PageSummary>,
    /// Highlights skipped because an equivalent one already exists
    pub duplicates: usize,
    pub failures: Vec<RecordFailure>,
    /// File written, when the run went through [`convert_file`]
    pub output: Option<PathBuf>,
}

impl ConversionReport {
    pub fn added(&self) -> usize {
        self.pages.iter().map(|p| p.added).sum()
    }
}

/// Outcome of resolving one record
enum Resolution {
    Added,
    Duplicate,
    Failed(String),
}

/// Resolve every record and append the resulting highlights.
///
/// Records are processed in page order. Each record either produces one
/// highlight, is recognised as already present, or is reported as a failure
/// without touching the page. A malformed page only fails its own records.
pub fn convert_records<S>(
    searcher: &mut TextSearcher<S>,
    mut records: Vec<AnnotationRecord>,
    options: &ConvertOptions,
) -> Result<ConversionReport, PdfError>
where
    S: PageTextSource + HighlightSink,
{
    records.sort_by_key(|r| r.page);
    let page_count = searcher.source().page_count();
    let mut report = ConversionReport::default();

    for record in records {
        let resolution = if record.page >= page_count {
            Resolution::Failed(PdfError::PageOutOfRange(record.page).to_string())
        } else {
            match convert_record(searcher, &record, options) {
                Ok(resolution) => resolution,
                Err(e) => {
                    log::error!("Page {}: {}", record.page + 1, e);
                    Resolution::Failed(e.to_string())
                }
            }
        };

        match resolution {
            Resolution::Added => match report.pages.last_mut() {
                Some(summary) if summary.page == record.page => summary.added += 1,
                _ => report.pages.push(PageSummary {
                    page: record.page,
                    added: 1,
                }),
            },
            Resolution::Duplicate => report.duplicates += 1,
            Resolution::Failed(reason) => report.failures.push(RecordFailure {
                page: record.page,
                text: record.text,
                reason,
            }),
        }
    }
    Ok(report)
}

fn convert_record<S>(
    searcher: &mut TextSearcher<S>,
    record: &AnnotationRecord,
    options: &ConvertOptions,
) -> Result<Resolution, PdfError>
where
    S: PageTextSource + HighlightSink,
{
    let page_num = record.page + 1;
    let rects = match resolve(searcher, record.page, &record.text) {
        Ok(rects) => rects,
        Err(SearchError::Pdf(e)) => return Err(e),
        Err(SearchError::MultipleInstances(_)) => {
            log::error!(
                "Page {}: The following text found multiple instances,\n\n  --> \"{}\" <--  \n\n\
                 (Token too short?), please re-highlight it manually.",
                page_num,
                record.text
            );
            return Ok(Resolution::Failed("multiple instances".into()));
        }
        Err(e) => {
            log::error!("Page {}: {}", page_num, e);
            return Ok(Resolution::Failed(e.to_string()));
        }
    };

    let Some(highlight) = Highlight::new(
        &rects,
        options.author.clone(),
        record.comment.clone(),
        options.color,
    ) else {
        log::warn!(
            "Page {}: nothing of \"{}\" could be located, skipping",
            page_num,
            record.text
        );
        return Ok(Resolution::Failed("no geometry".into()));
    };

    let exists = searcher
        .already_exists(record.page, &highlight.flat_quad_points())
        .map_err(into_pdf_error)?;
    if exists {
        log::debug!("Page {}: This annot already exists, skipping...", page_num);
        return Ok(Resolution::Duplicate);
    }

    searcher.source_mut().add_highlight(record.page, &highlight)?;
    Ok(Resolution::Added)
}

/// Primary search, falling back to token search when the text is not found
fn resolve<S: PageTextSource>(
    searcher: &mut TextSearcher<S>,
    page: usize,
    text: &str,
) -> Result<Vec<AnnotRect>, SearchError> {
    match searcher.search(page, text) {
        Err(SearchError::TextNotFound(_)) => {
            log::debug!(
                "Page {}: Using fall-back mechanism. Might contain mistaken highlights.",
                page + 1
            );
            searcher.fallback_search(page, text)
        }
        other => other,
    }
}

fn into_pdf_error(e: SearchError) -> PdfError {
    match e {
        SearchError::Pdf(e) => e,
        other => PdfError::Parse(other.to_string()),
    }
}

/// Output path for a converted PDF
pub fn output_path<P: AsRef<Path>>(input: P, new_file: bool) -> PathBuf {
    let input = input.as_ref();
    if !new_file {
        return input.to_path_buf();
    }
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    input.with_file_name(format!("result.{}", name))
}

/// Convert the export belonging to `pdf_path` into highlights.
///
/// Returns `Ok(None)` when the PDF has no export next to it.
pub fn convert_file<P: AsRef<Path>>(
    pdf_path: P,
    options: &ConvertOptions,
) -> Result<Option<ConversionReport>, PdfError> {
    let pdf_path = pdf_path.as_ref();
    let Some(records) = read_annotations(pdf_path)? else {
        log::info!("Skipping {}...", pdf_path.display());
        return Ok(None);
    };
    if options.backup {
        backup(pdf_path)?;
    }

    let document = PdfDocument::load(pdf_path)?;
    let mut searcher = TextSearcher::with_config(document, options.search.clone());
    let mut report = convert_records(&mut searcher, records, options)?;

    let output = output_path(pdf_path, options.new_file);
    searcher.into_source().save(&output)?;
    report.output = Some(output);
    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SearchRect;
    use std::collections::HashMap;

    /// One-page fake that stores added highlights as annotation rects
    #[derive(Default)]
    struct FakeDoc {
        hits: HashMap<String, Vec<SearchRect>>,
        annots: Vec<AnnotRect>,
        added: usize,
        broken_height: bool,
    }

    impl PageTextSource for FakeDoc {
        fn page_count(&self) -> usize {
            1
        }

        fn search_for(
            &mut self,
            _page: usize,
            text: &str,
            _hit_max: usize,
        ) -> Result<Vec<SearchRect>, PdfError> {
            Ok(self.hits.get(text).cloned().unwrap_or_default())
        }

        fn text_blocks(&mut self, _page: usize) -> Result<Vec<SearchRect>, PdfError> {
            Ok(vec![SearchRect::new(0.0, 0.0, 600.0, 800.0)])
        }

        fn page_height(&self, _page: usize) -> Result<f32, PdfError> {
            if self.broken_height {
                return Err(PdfError::InvalidStructure);
            }
            Ok(800.0)
        }

        fn annotation_rects(&self, _page: usize) -> Result<Vec<AnnotRect>, PdfError> {
            Ok(self.annots.clone())
        }
    }

    impl HighlightSink for FakeDoc {
        fn add_highlight(&mut self, _page: usize, highlight: &Highlight) -> Result<(), PdfError> {
            self.annots.push(highlight.rect);
            self.added += 1;
            Ok(())
        }
    }

    fn record(page: usize, text: &str) -> AnnotationRecord {
        AnnotationRecord {
            page,
            text: text.to_string(),
            comment: None,
        }
    }

    fn fake() -> FakeDoc {
        let mut doc = FakeDoc::default();
        doc.hits.insert(
            "Hello world".into(),
            vec![SearchRect::new(72.0, 100.0, 160.0, 112.0)],
        );
        doc.hits.insert(
            "a second highlight".into(),
            vec![SearchRect::new(72.0, 300.0, 200.0, 312.0)],
        );
        doc
    }

    #[test]
    fn test_records_become_highlights_once() {
        let mut searcher = TextSearcher::new(fake());
        let records = vec![record(0, "Hello world"), record(0, "a second highlight")];
        let report = convert_records(&mut searcher, records.clone(), &ConvertOptions::default())
            .unwrap();
        assert_eq!(report.added(), 2);
        assert_eq!(report.pages, vec![PageSummary { page: 0, added: 2 }]);

        let again = convert_records(&mut searcher, records, &ConvertOptions::default()).unwrap();
        assert_eq!(again.added(), 0);
        assert_eq!(again.duplicates, 2);
        assert_eq!(searcher.source().added, 2);
    }

    #[test]
    fn test_failures_do_not_stop_the_batch() {
        let mut searcher = TextSearcher::new(fake());
        let records = vec![
            record(3, "Hello world"),
            record(0, "\u{FFFD} not here at all"),
            record(0, "Hello world"),
        ];
        let report = convert_records(&mut searcher, records, &ConvertOptions::default()).unwrap();
        assert_eq!(report.added(), 1);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().any(|f| f.page == 3));
    }

    #[test]
    fn test_provider_error_fails_only_its_record() {
        let mut doc = fake();
        doc.broken_height = true;
        let mut searcher = TextSearcher::new(doc);
        let records = vec![record(0, "Hello world"), record(0, "a second highlight")];
        let report = convert_records(&mut searcher, records, &ConvertOptions::default()).unwrap();
        assert_eq!(report.added(), 0);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures[0].reason.contains("Invalid PDF structure"));
    }

    #[test]
    fn test_output_path() {
        assert_eq!(output_path("/a/b.pdf", false), PathBuf::from("/a/b.pdf"));
        assert_eq!(output_path("/a/b.pdf", true), PathBuf::from("/a/result.b.pdf"));
    }
}
