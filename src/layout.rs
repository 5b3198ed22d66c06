//! Page layout: lines, text blocks and literal text search
//!
//! Text runs are grouped into lines the same way reading order is recovered
//! for extraction: consecutive runs on one baseline form a line, stream order
//! is kept otherwise. Lines close together vertically form a block.

use crate::extractor::TextRun;
use crate::geometry::SearchRect;

/// Runs whose baselines differ by less than this share a line
const LINE_Y_TOLERANCE: f32 = 3.0;
/// Glyph box above the baseline, as a fraction of the font size
const ASCENT: f32 = 0.8;
/// Glyph box below the baseline, as a fraction of the font size
const DESCENT: f32 = 0.2;
/// Horizontal gap (fraction of font size) treated as a word break
const WORD_GAP: f32 = 0.15;
/// Vertical gap (fraction of line height) that still continues a block
const BLOCK_GAP: f32 = 0.8;

/// Where a page sits in user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PageBox {
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }
}

impl Default for PageBox {
    /// US Letter
    fn default() -> Self {
        Self {
            x0: 0.0,
            y0: 0.0,
            x1: 612.0,
            y1: 792.0,
        }
    }
}

/// A character and its box in search space
#[derive(Debug, Clone)]
pub struct Glyph {
    pub ch: char,
    pub rect: SearchRect,
}

#[derive(Debug, Clone)]
pub struct LayoutLine {
    pub glyphs: Vec<Glyph>,
    pub rect: SearchRect,
}

impl LayoutLine {
    pub fn text(&self) -> String {
        self.glyphs.iter().map(|g| g.ch).collect()
    }
}

/// Searchable layout of one page
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub lines: Vec<LayoutLine>,
    pub blocks: Vec<SearchRect>,
    /// Normalised page text (lowercase, single spaces)
    text: Vec<char>,
    /// For each char of `text`, the (line, glyph) it came from; `None` for
    /// synthetic separators
    origins: Vec<Option<(usize, usize)>>,
}

impl PageLayout {
    /// Lay out the runs of a page
    pub fn build(runs: Vec<TextRun>, page_box: &PageBox) -> Self {
        let lines = group_into_lines(runs, page_box);
        let blocks = group_into_blocks(&lines);
        let (text, origins) = normalise_lines(&lines);
        Self {
            lines,
            blocks,
            text,
            origins,
        }
    }

    /// Literal, case-insensitive search returning one rectangle per line
    /// crossed by each match, capped at `hit_max` rectangles
    pub fn search(&self, query: &str, hit_max: usize) -> Vec<SearchRect> {
        let needle: Vec<char> = normalise_query(query).chars().collect();
        let mut hits = Vec::new();
        if needle.is_empty() || needle.len() > self.text.len() {
            return hits;
        }

        let mut start = 0;
        while start + needle.len() <= self.text.len() && hits.len() < hit_max {
            if self.text[start..start + needle.len()] != needle[..] {
                start += 1;
                continue;
            }
            for rect in self.match_rects(start, start + needle.len()) {
                if hits.len() == hit_max {
                    break;
                }
                hits.push(rect);
            }
            start += needle.len();
        }
        hits
    }

    fn match_rects(&self, start: usize, end: usize) -> Vec<SearchRect> {
        let mut rects: Vec<(usize, SearchRect)> = Vec::new();
        for &(line, glyph) in self.origins[start..end].iter().flatten() {
            let g = &self.lines[line].glyphs[glyph];
            if g.ch.is_whitespace() {
                continue;
            }
            match rects.last_mut() {
                Some((l, rect)) if *l == line => *rect = rect.union(&g.rect),
                _ => rects.push((line, g.rect)),
            }
        }
        rects.into_iter().map(|(_, r)| r).collect()
    }
}

/// Lowercase and collapse whitespace so queries match across line breaks
pub fn normalise_query(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Group runs into lines, preserving stream order between lines
fn group_into_lines(runs: Vec<TextRun>, page_box: &PageBox) -> Vec<LayoutLine> {
    let mut grouped: Vec<(f32, Vec<TextRun>)> = Vec::new();
    for run in runs {
        match grouped.last_mut() {
            Some((y, line)) if (*y - run.y).abs() < LINE_Y_TOLERANCE => line.push(run),
            _ => grouped.push((run.y, vec![run])),
        }
    }

    grouped
        .into_iter()
        .filter_map(|(_, mut runs)| {
            runs.sort_by(|a, b| a.x().partial_cmp(&b.x()).unwrap_or(std::cmp::Ordering::Equal));
            build_line(&runs, page_box)
        })
        .collect()
}

fn build_line(runs: &[TextRun], page_box: &PageBox) -> Option<LayoutLine> {
    let mut glyphs: Vec<Glyph> = Vec::new();
    for run in runs {
        let top = page_box.y1 - (run.y + ASCENT * run.font_size);
        let bottom = page_box.y1 - (run.y - DESCENT * run.font_size);
        for c in &run.chars {
            let rect = SearchRect::new(c.x0 - page_box.x0, top, c.x1 - page_box.x0, bottom);
            // Glyphs placed apart without a space still break words
            if let Some(prev) = glyphs.last() {
                let gap = rect.x0 - prev.rect.x1;
                if gap > WORD_GAP * run.font_size && !prev.ch.is_whitespace() && !c.ch.is_whitespace()
                {
                    glyphs.push(Glyph {
                        ch: ' ',
                        rect: SearchRect::new(prev.rect.x1, top, rect.x0, bottom),
                    });
                }
            }
            glyphs.push(Glyph { ch: c.ch, rect });
        }
    }

    let rect = glyphs
        .iter()
        .filter(|g| !g.ch.is_whitespace())
        .map(|g| g.rect)
        .reduce(|a, b| a.union(&b))?;
    Some(LayoutLine { glyphs, rect })
}

/// Merge vertically adjacent, horizontally overlapping lines into blocks
fn group_into_blocks(lines: &[LayoutLine]) -> Vec<SearchRect> {
    let mut blocks: Vec<SearchRect> = Vec::new();
    let mut previous: Option<SearchRect> = None;

    for line in lines {
        let continues = match (previous, blocks.last()) {
            (Some(prev), Some(block)) => {
                let gap = line.rect.y0 - prev.y1;
                let overlaps = line.rect.x0 < block.x1 && block.x0 < line.rect.x1;
                overlaps && gap > -0.5 * prev.height() && gap < BLOCK_GAP * prev.height()
            }
            _ => false,
        };
        if continues {
            if let Some(block) = blocks.last_mut() {
                *block = block.union(&line.rect);
            }
        } else {
            blocks.push(line.rect);
        }
        previous = Some(line.rect);
    }
    blocks
}

/// Flatten lines into a normalised char sequence with glyph back-references
fn normalise_lines(lines: &[LayoutLine]) -> (Vec<char>, Vec<Option<(usize, usize)>>) {
    let mut text = Vec::new();
    let mut origins = Vec::new();

    for (li, line) in lines.iter().enumerate() {
        if !text.is_empty() && text.last() != Some(&' ') {
            text.push(' ');
            origins.push(None);
        }
        for (gi, glyph) in line.glyphs.iter().enumerate() {
            if glyph.ch.is_whitespace() {
                if !text.is_empty() && text.last() != Some(&' ') {
                    text.push(' ');
                    origins.push(None);
                }
                continue;
            }
            for lower in glyph.ch.to_lowercase() {
                text.push(lower);
                origins.push(Some((li, gi)));
            }
        }
    }
    // Drop a trailing separator so matches never end on it
    if text.last() == Some(&' ') {
        text.pop();
        origins.pop();
    }
    (text, origins)
}
