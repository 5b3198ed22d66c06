//! Text-to-geometry resolution
//!
//! Finds the on-page rectangles for a highlighted string. The primary
//! resolver searches the literal text and rejects ambiguous hit sets; the
//! fallback resolver splits the text around characters the export could not
//! encode and searches what is left piece by piece. A duplicate check
//! compares a candidate's quad points against the annotations already on
//! the page.

use crate::geometry::{invert_coordinates, quad_points_to_rects, AnnotRect, SearchRect};
use crate::merge::{merge_tokens, SAME_LINE_TOL};
use crate::PdfError;

/// Resolution failures, tagged so the caller can decide whether to retry
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The literal string does not occur on the page
    #[error("No search result found: {0}")]
    TextNotFound(String),
    /// Hits form two or more disjoint groups
    #[error("Possible multiple search results, the results are not consecutive: {0}")]
    MultipleInstances(String),
    /// The hit classifier left hits unaccounted for
    #[error("Not all search results were verified: {0}")]
    PossibleError(String),
    /// Fallback search had too little leading context to anchor on
    #[error("Escaped character too close to beginning tokens: {0}")]
    FallbackFailed(String),
    #[error(transparent)]
    Pdf(#[from] PdfError),
}

/// Access to page text and geometry, all rectangles in search space except
/// existing annotations
pub trait PageTextSource {
    /// Number of pages in the document
    fn page_count(&self) -> usize;

    /// Literal search, one rectangle per matched line, at most `hit_max`
    fn search_for(
        &mut self,
        page: usize,
        text: &str,
        hit_max: usize,
    ) -> Result<Vec<SearchRect>, PdfError>;

    /// Bounding boxes of the page's text blocks in reading order
    fn text_blocks(&mut self, page: usize) -> Result<Vec<SearchRect>, PdfError>;

    fn page_height(&self, page: usize) -> Result<f32, PdfError>;

    /// Rectangles of annotations already on the page, in annotation space
    fn annotation_rects(&self, page: usize) -> Result<Vec<AnnotRect>, PdfError>;
}

/// Tunable thresholds for the resolvers
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Maximum number of hits requested from the text search (default: 16)
    pub hit_max: usize,
    /// Hits narrower than this are dropped as noise when several hits are
    /// classified (default: 4.0)
    pub ignore_short_width: f32,
    /// Fallback runs with fewer characters are never searched (default: 3)
    pub min_token_chars: usize,
    /// The fallback keeps peeling runs while the remainder has at least this
    /// many words (default: 2)
    pub min_remaining_words: usize,
    /// Vertical tolerance for the same-line test (default: 1.5)
    pub same_line_tolerance: f32,
    /// An unencodable word within this many leading words of the first line
    /// aborts the fallback (default: 3)
    pub anchor_words: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            hit_max: 16,
            ignore_short_width: 4.0,
            min_token_chars: 3,
            min_remaining_words: 2,
            same_line_tolerance: SAME_LINE_TOL,
            anchor_words: 3,
        }
    }
}

/// Progress of the block classifier through a run of consecutive hits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Streak {
    NotStarted,
    Started,
    Ended,
}

/// Resolves highlighted text to annotation-space rectangles on a page
pub struct TextSearcher<S> {
    source: S,
    config: SearchConfig,
}

impl<S: PageTextSource> TextSearcher<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, SearchConfig::default())
    }

    pub fn with_config(source: S, config: SearchConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Find `text` on the page and return merged highlight bars in
    /// annotation space
    pub fn search(&mut self, page: usize, text: &str) -> Result<Vec<AnnotRect>, SearchError> {
        let hits = self.search_raw(page, text)?;
        self.finish(page, &hits)
    }

    /// Find `text` on the page and return the unmerged search-space hits
    pub fn search_raw(&mut self, page: usize, text: &str) -> Result<Vec<SearchRect>, SearchError> {
        let hits = self.source.search_for(page, text, self.config.hit_max)?;
        match hits.len() {
            0 => Err(SearchError::TextNotFound(text.to_string())),
            1 => Ok(hits),
            _ => {
                let blocks = self.source.text_blocks(page)?;
                let kept = classify_hits(&blocks, &hits, self.config.ignore_short_width, text)?;
                if kept.is_empty() {
                    return Err(SearchError::TextNotFound(text.to_string()));
                }
                Ok(kept)
            }
        }
    }

    /// Search `text` run by run, skipping words the export could not encode
    pub fn fallback_search(
        &mut self,
        page: usize,
        text: &str,
    ) -> Result<Vec<AnnotRect>, SearchError> {
        let mut tokens = Vec::new();

        for (i, line) in text.split('\n').enumerate() {
            let line = line.trim_end();
            if i == 0 {
                if let Some((idx, _)) = marker_word(line) {
                    if idx < self.config.anchor_words {
                        return Err(SearchError::FallbackFailed(text.to_string()));
                    }
                }
                let (words, rest) = split_at_marker(line);
                self.add_run(page, &words, &mut tokens)?;
                self.add_remaining_runs(page, rest, &mut tokens)?;
            } else {
                self.add_remaining_runs(page, line.to_string(), &mut tokens)?;
            }
        }

        if tokens.is_empty() {
            log::warn!("Page {}: no token of '{}' could be located", page + 1, text);
            return Ok(Vec::new());
        }
        self.finish(page, &tokens)
    }

    /// Whether a highlight with these quad points already sits on the page.
    ///
    /// The candidate and each existing annotation are both projected into
    /// search space. The candidate is a duplicate when every one of its
    /// rectangles intersects the same existing annotation; containment is
    /// too strict because independently computed geometry drifts slightly.
    pub fn already_exists(&self, page: usize, quad_points: &[f32]) -> Result<bool, SearchError> {
        let height = self.source.page_height(page)?;
        let pending: Vec<SearchRect> = quad_points_to_rects(quad_points)
            .iter()
            .map(|r| r.to_search(height))
            .collect();
        if pending.is_empty() {
            return Ok(false);
        }

        for existing in self.source.annotation_rects(page)? {
            let existing = existing.to_search(height);
            if pending.iter().all(|r| existing.intersects(r)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn finish(&self, page: usize, hits: &[SearchRect]) -> Result<Vec<AnnotRect>, SearchError> {
        let merged = merge_tokens(hits, self.config.same_line_tolerance);
        let height = self.source.page_height(page)?;
        Ok(invert_coordinates(&merged, height))
    }

    fn add_run(
        &mut self,
        page: usize,
        words: &str,
        tokens: &mut Vec<SearchRect>,
    ) -> Result<(), SearchError> {
        if words.chars().count() < self.config.min_token_chars {
            log::debug!("VERY SHORT token: '{}'! Ignoring this token...", words);
            return Ok(());
        }
        match self.search_raw(page, words) {
            Ok(hits) => {
                tokens.extend(hits);
                Ok(())
            }
            Err(SearchError::TextNotFound(_)) => {
                log::warn!("Skipping '{}' as it was not found", words);
                Ok(())
            }
            Err(SearchError::MultipleInstances(_)) => {
                log::warn!("Skipping '{}' as it matches several places", words);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn add_remaining_runs(
        &mut self,
        page: usize,
        mut line: String,
        tokens: &mut Vec<SearchRect>,
    ) -> Result<(), SearchError> {
        while line.split_whitespace().count() >= self.config.min_remaining_words {
            let (words, rest) = split_at_marker(&line);
            self.add_run(page, &words, tokens)?;
            line = rest;
        }
        Ok(())
    }
}

/// Check multiple hits against the page's text blocks.
///
/// Hits belonging to one match appear as an unbroken streak inside one block
/// or a run of adjacent blocks. A streak that resumes after a block without
/// hits means the text occurs more than once.
fn classify_hits(
    blocks: &[SearchRect],
    hits: &[SearchRect],
    ignore_short_width: f32,
    text: &str,
) -> Result<Vec<SearchRect>, SearchError> {
    let mut kept = Vec::with_capacity(hits.len());
    let mut streak = Streak::NotStarted;
    let mut i = 0;

    for block in blocks {
        if i >= hits.len() {
            break;
        }
        if block.contains(&hits[i]) {
            if streak == Streak::Ended {
                return Err(SearchError::MultipleInstances(text.to_string()));
            }
            streak = Streak::Started;
            while i < hits.len() && block.contains(&hits[i]) {
                if hits[i].width() < ignore_short_width {
                    log::debug!("Dropping narrow hit {:?} for '{}'", hits[i], text);
                } else {
                    kept.push(hits[i]);
                }
                i += 1;
            }
        } else if streak == Streak::Started {
            streak = Streak::Ended;
        }
    }

    if i < hits.len() {
        log::error!(
            "{} of {} hits for '{}' fall outside every text block",
            hits.len() - i,
            hits.len(),
            text
        );
        return Err(SearchError::PossibleError(text.to_string()));
    }
    Ok(kept)
}

/// Control and invisible format characters, plus the replacement and
/// non-character code points the export writes for text it lost
fn is_marker_char(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '\u{00A0}'
                | '\u{00AD}'
                | '\u{200B}'..='\u{200F}'
                | '\u{2028}'..='\u{202E}'
                | '\u{2060}'..='\u{2064}'
                | '\u{FEFF}'
                | '\u{FFFD}'
                | '\u{FFFE}'
                | '\u{FFFF}'
        )
}

/// Index and text of the first space-separated word holding a character
/// the export could not encode
fn marker_word(line: &str) -> Option<(usize, &str)> {
    line.split(' ')
        .enumerate()
        .find(|(_, word)| word.chars().any(is_marker_char))
}

/// Split a line around its first unencodable word, dropping that word
fn split_at_marker(line: &str) -> (String, String) {
    match marker_word(line) {
        None => (line.to_string(), String::new()),
        Some((idx, word)) => {
            log::debug!("Ignoring unicode '{}' from: '{}'", word.escape_debug(), line);
            let words: Vec<&str> = line.split(' ').collect();
            (words[..idx].join(" "), words[idx + 1..].join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory page with canned search results
    #[derive(Default)]
    struct FakePage {
        hits: HashMap<String, Vec<SearchRect>>,
        blocks: Vec<SearchRect>,
        annots: Vec<AnnotRect>,
        queries: Vec<String>,
        block_calls: usize,
    }

    impl FakePage {
        fn with_hit(mut self, text: &str, rects: Vec<SearchRect>) -> Self {
            self.hits.insert(text.to_string(), rects);
            self
        }
    }

    impl PageTextSource for FakePage {
        fn page_count(&self) -> usize {
            1
        }

        fn search_for(
            &mut self,
            page: usize,
            text: &str,
            hit_max: usize,
        ) -> Result<Vec<SearchRect>, PdfError> {
            if page != 0 {
                return Err(PdfError::PageOutOfRange(page));
            }
            self.queries.push(text.to_string());
            let mut hits = self.hits.get(text).cloned().unwrap_or_default();
            hits.truncate(hit_max);
            Ok(hits)
        }

        fn text_blocks(&mut self, _page: usize) -> Result<Vec<SearchRect>, PdfError> {
            self.block_calls += 1;
            Ok(self.blocks.clone())
        }

        fn page_height(&self, _page: usize) -> Result<f32, PdfError> {
            Ok(800.0)
        }

        fn annotation_rects(&self, _page: usize) -> Result<Vec<AnnotRect>, PdfError> {
            Ok(self.annots.clone())
        }
    }

    fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> SearchRect {
        SearchRect::new(x0, y0, x1, y1)
    }

    #[test]
    fn test_not_found() {
        let mut searcher = TextSearcher::new(FakePage::default());
        let err = searcher.search(0, "missing").unwrap_err();
        assert!(matches!(err, SearchError::TextNotFound(_)));
    }

    #[test]
    fn test_single_hit_skips_classifier() {
        let page = FakePage::default().with_hit("Hello world", vec![rect(72.0, 100.0, 160.0, 112.0)]);
        let mut searcher = TextSearcher::new(page);
        let rects = searcher.search(0, "Hello world").unwrap();
        assert_eq!(rects, vec![AnnotRect::new(72.0, 688.0, 160.0, 700.0)]);
        assert_eq!(searcher.source().block_calls, 0);
    }

    #[test]
    fn test_two_hits_in_one_block_merge() {
        let mut page = FakePage::default().with_hit(
            "spans two lines",
            vec![rect(300.0, 100.0, 500.0, 112.0), rect(72.0, 114.0, 150.0, 126.0)],
        );
        page.blocks = vec![rect(70.0, 98.0, 520.0, 200.0)];
        let mut searcher = TextSearcher::new(page);
        let rects = searcher.search(0, "spans two lines").unwrap();
        assert_eq!(
            rects,
            vec![
                AnnotRect::new(300.0, 688.0, 500.0, 700.0),
                AnnotRect::new(72.0, 674.0, 150.0, 686.0),
            ]
        );
    }

    #[test]
    fn test_adjacent_blocks_are_one_streak() {
        let mut page = FakePage::default().with_hit(
            "across a paragraph break",
            vec![rect(300.0, 190.0, 500.0, 198.0), rect(72.0, 210.0, 150.0, 222.0)],
        );
        page.blocks = vec![rect(70.0, 98.0, 520.0, 200.0), rect(70.0, 208.0, 520.0, 300.0)];
        let mut searcher = TextSearcher::new(page);
        assert_eq!(searcher.search(0, "across a paragraph break").unwrap().len(), 2);
    }

    #[test]
    fn test_non_adjacent_blocks_are_ambiguous() {
        let mut page = FakePage::default().with_hit(
            "the",
            vec![rect(72.0, 100.0, 90.0, 112.0), rect(72.0, 500.0, 90.0, 512.0)],
        );
        page.blocks = vec![
            rect(70.0, 98.0, 520.0, 200.0),
            rect(70.0, 250.0, 520.0, 400.0),
            rect(70.0, 450.0, 520.0, 600.0),
        ];
        let mut searcher = TextSearcher::new(page);
        let err = searcher.search(0, "the").unwrap_err();
        assert!(matches!(err, SearchError::MultipleInstances(_)));
    }

    #[test]
    fn test_hit_outside_blocks_is_possible_error() {
        let mut page = FakePage::default().with_hit(
            "margin note",
            vec![rect(72.0, 100.0, 160.0, 112.0), rect(560.0, 700.0, 600.0, 712.0)],
        );
        page.blocks = vec![rect(70.0, 98.0, 520.0, 200.0)];
        let mut searcher = TextSearcher::new(page);
        let err = searcher.search(0, "margin note").unwrap_err();
        assert!(matches!(err, SearchError::PossibleError(_)));
    }

    #[test]
    fn test_narrow_hits_are_dropped() {
        let mut page = FakePage::default().with_hit(
            "hyphen-",
            vec![rect(300.0, 100.0, 500.0, 112.0), rect(72.0, 114.0, 74.0, 126.0)],
        );
        page.blocks = vec![rect(70.0, 98.0, 520.0, 200.0)];
        let mut searcher = TextSearcher::new(page);
        let raw = searcher.search_raw(0, "hyphen-").unwrap();
        assert_eq!(raw, vec![rect(300.0, 100.0, 500.0, 112.0)]);
    }

    #[test]
    fn test_fallback_splits_around_marker() {
        let page = FakePage::default()
            .with_hit("The quick brown", vec![rect(72.0, 100.0, 180.0, 112.0)])
            .with_hit("fox jumps", vec![rect(195.0, 100.0, 260.0, 112.0)]);
        let mut searcher = TextSearcher::new(page);
        let rects = searcher
            .fallback_search(0, "The quick brown \u{FFFD} fox jumps")
            .unwrap();
        assert_eq!(
            searcher.source().queries,
            vec!["The quick brown".to_string(), "fox jumps".to_string()]
        );
        assert_eq!(rects, vec![AnnotRect::new(72.0, 688.0, 260.0, 700.0)]);
    }

    #[test]
    fn test_fallback_marker_first_word_fails() {
        let mut searcher = TextSearcher::new(FakePage::default());
        let err = searcher
            .fallback_search(0, "\u{FFFD}quick brown fox jumps over")
            .unwrap_err();
        assert!(matches!(err, SearchError::FallbackFailed(_)));
        assert!(searcher.source().queries.is_empty());
    }

    #[test]
    fn test_fallback_marker_third_word_fails() {
        let mut searcher = TextSearcher::new(FakePage::default());
        let err = searcher
            .fallback_search(0, "The quick \u{FFFD}brown fox jumps over")
            .unwrap_err();
        assert!(matches!(err, SearchError::FallbackFailed(_)));
    }

    #[test]
    fn test_fallback_splits_at_soft_hyphen() {
        let page = FakePage::default()
            .with_hit("The quick brown", vec![rect(72.0, 100.0, 180.0, 112.0)])
            .with_hit("fox jumps", vec![rect(240.0, 100.0, 300.0, 112.0)]);
        let mut searcher = TextSearcher::new(page);
        let rects = searcher
            .fallback_search(0, "The quick brown exam\u{AD}ple fox jumps")
            .unwrap();
        assert_eq!(
            searcher.source().queries,
            vec!["The quick brown".to_string(), "fox jumps".to_string()]
        );
        assert_eq!(rects.len(), 1);
    }

    #[test]
    fn test_invisible_format_chars_are_markers() {
        assert_eq!(marker_word("one two a\u{200B}b three"), Some((2, "a\u{200B}b")));
        assert_eq!(marker_word("x\u{FEFF} y"), Some((0, "x\u{FEFF}")));
        assert_eq!(marker_word("plain words only"), None);
    }

    #[test]
    fn test_fallback_uses_configured_thresholds() {
        let config = SearchConfig {
            anchor_words: 1,
            min_token_chars: 20,
            ..SearchConfig::default()
        };
        let mut searcher = TextSearcher::with_config(FakePage::default(), config);
        // Marker at word 2 is accepted, but both runs are below the length floor
        let rects = searcher
            .fallback_search(0, "The quick \u{FFFD} brown fox jumps")
            .unwrap();
        assert!(rects.is_empty());
        assert!(searcher.source().queries.is_empty());
        assert_eq!(searcher.config().anchor_words, 1);
    }

    #[test]
    fn test_narrow_hit_in_distant_block_is_ambiguous() {
        let mut page = FakePage::default().with_hit(
            "a word",
            vec![rect(72.0, 100.0, 160.0, 112.0), rect(72.0, 500.0, 74.0, 512.0)],
        );
        page.blocks = vec![
            rect(70.0, 98.0, 520.0, 200.0),
            rect(70.0, 250.0, 520.0, 400.0),
            rect(70.0, 450.0, 520.0, 600.0),
        ];
        let mut searcher = TextSearcher::new(page);
        let err = searcher.search(0, "a word").unwrap_err();
        assert!(matches!(err, SearchError::MultipleInstances(_)));
    }

    #[test]
    fn test_fallback_skips_missing_runs() {
        let page = FakePage::default()
            .with_hit("first line of text", vec![rect(72.0, 100.0, 300.0, 112.0)])
            .with_hit("third part here", vec![rect(72.0, 128.0, 200.0, 140.0)]);
        let mut searcher = TextSearcher::new(page);
        let rects = searcher
            .fallback_search(
                0,
                "first line of text \u{1} garbled segment \u{1} third part here\nab",
            )
            .unwrap();
        assert_eq!(
            searcher.source().queries,
            vec![
                "first line of text".to_string(),
                "garbled segment".to_string(),
                "third part here".to_string(),
            ]
        );
        assert_eq!(rects.len(), 2);
    }

    #[test]
    fn test_fallback_nothing_found_is_empty() {
        let mut searcher = TextSearcher::new(FakePage::default());
        let rects = searcher
            .fallback_search(0, "one two three \u{FFFD} four five")
            .unwrap();
        assert!(rects.is_empty());
    }

    #[test]
    fn test_already_exists_with_jitter() {
        let mut page = FakePage::default();
        page.annots = vec![AnnotRect::new(72.0, 674.0, 500.0, 700.0)];
        let searcher = TextSearcher::new(page);

        let candidate = [
            AnnotRect::new(300.5, 688.4, 499.5, 700.5),
            AnnotRect::new(71.5, 673.6, 150.5, 686.5),
        ];
        let quads: Vec<f32> = candidate.iter().flat_map(|r| r.quad_points()).collect();
        assert!(searcher.already_exists(0, &quads).unwrap());

        let elsewhere = AnnotRect::new(72.0, 100.0, 300.0, 112.0).quad_points();
        assert!(!searcher.already_exists(0, &elsewhere).unwrap());
    }

    #[test]
    fn test_already_exists_needs_every_line() {
        let mut page = FakePage::default();
        page.annots = vec![AnnotRect::new(72.0, 688.0, 500.0, 700.0)];
        let searcher = TextSearcher::new(page);
        let quads: Vec<f32> = [
            AnnotRect::new(72.0, 688.0, 500.0, 700.0),
            AnnotRect::new(72.0, 600.0, 500.0, 612.0),
        ]
        .iter()
        .flat_map(|r| r.quad_points())
        .collect();
        assert!(!searcher.already_exists(0, &quads).unwrap());
    }
}
