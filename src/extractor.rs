//! Glyph extraction from PDF content streams using lopdf
//!
//! Walks a page's content stream and records every shown string as a run of
//! positioned characters in PDF user space, so the layout module can search
//! text and report where it sits.

use crate::PdfError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;

/// Glyph width used when a font carries no usable `/Widths` (1/1000 em)
const DEFAULT_GLYPH_WIDTH: f32 = 500.0;

/// One character with its horizontal extent in user space
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedChar {
    pub ch: char,
    pub x0: f32,
    pub x1: f32,
}

/// A string shown by a single text operator
#[derive(Debug, Clone)]
pub struct TextRun {
    pub chars: Vec<PositionedChar>,
    /// Baseline y in user space (origin at bottom-left)
    pub y: f32,
    /// Rendered font size
    pub font_size: f32,
}

impl TextRun {
    pub fn text(&self) -> String {
        self.chars.iter().map(|c| c.ch).collect()
    }

    pub fn x(&self) -> f32 {
        self.chars.first().map_or(0.0, |c| c.x0)
    }
}

/// Width information for one font resource
#[derive(Debug, Clone)]
struct FontMetrics {
    first_char: i64,
    widths: Vec<f32>,
    /// Type0 fonts use two-byte codes
    two_byte: bool,
}

impl FontMetrics {
    fn fallback() -> Self {
        Self {
            first_char: 0,
            widths: Vec::new(),
            two_byte: false,
        }
    }

    fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let two_byte = font
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|n| n == b"Type0")
            .unwrap_or(false);
        let first_char = font
            .get(b"FirstChar")
            .ok()
            .and_then(|o| resolve(doc, o).as_i64().ok())
            .unwrap_or(0);
        let widths = font
            .get(b"Widths")
            .ok()
            .and_then(|o| resolve(doc, o).as_array().ok())
            .map(|arr| {
                arr.iter()
                    .map(|w| get_number(resolve(doc, w)).unwrap_or(DEFAULT_GLYPH_WIDTH))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            first_char,
            widths,
            two_byte,
        }
    }

    /// Glyph codes of a string operand
    fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|c| c.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
                .collect()
        } else {
            bytes.iter().map(|&b| b as u32).collect()
        }
    }

    /// Glyph width in 1/1000 em
    fn width(&self, code: u32) -> f32 {
        let idx = code as i64 - self.first_char;
        if idx >= 0 {
            if let Some(&w) = self.widths.get(idx as usize) {
                if w > 0.0 {
                    return w;
                }
            }
        }
        DEFAULT_GLYPH_WIDTH
    }
}

/// Text state parameters that affect glyph advances
#[derive(Debug, Clone)]
struct TextState {
    font: String,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    /// Horizontal scaling as a fraction (Tz / 100)
    horizontal_scale: f32,
    leading: Option<f32>,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: String::new(),
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: None,
        }
    }
}

impl TextState {
    fn line_leading(&self) -> f32 {
        // Approximate line height when TL/TD never set one
        self.leading.unwrap_or(self.font_size * 1.2)
    }
}

/// Multiply two 2D transformation matrices
/// Matrix format: [a, b, c, d, e, f] representing:
/// | a  b  0 |
/// | c  d  0 |
/// | e  f  1 |
fn multiply_matrices(m1: &[f32; 6], m2: &[f32; 6]) -> [f32; 6] {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

/// Walks one content stream, collecting text runs
struct RunCollector<'a> {
    doc: &'a Document,
    fonts: BTreeMap<Vec<u8>, &'a Dictionary>,
    metrics: BTreeMap<String, FontMetrics>,
    state: TextState,
    ctm: [f32; 6],
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
    runs: Vec<TextRun>,
}

impl<'a> RunCollector<'a> {
    fn new(doc: &'a Document, page_id: ObjectId) -> Self {
        let fonts = doc.get_page_fonts(page_id).unwrap_or_default();
        let metrics = fonts
            .iter()
            .map(|(name, dict)| {
                (
                    String::from_utf8_lossy(name).to_string(),
                    FontMetrics::from_dict(doc, dict),
                )
            })
            .collect();
        Self {
            doc,
            fonts,
            metrics,
            state: TextState::default(),
            ctm: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            text_matrix: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            line_matrix: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            runs: Vec::new(),
        }
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix[4] += tx * self.line_matrix[0] + ty * self.line_matrix[2];
        self.line_matrix[5] += tx * self.line_matrix[1] + ty * self.line_matrix[3];
        self.text_matrix = self.line_matrix;
    }

    /// Shift the text matrix by `tx` text-space units along the baseline
    fn advance(&mut self, tx: f32) {
        self.text_matrix[4] += tx * self.text_matrix[0];
        self.text_matrix[5] += tx * self.text_matrix[1];
    }

    /// Show one string operand, appending its glyphs to `run`
    fn show(&mut self, bytes: &[u8], run: &mut Vec<PositionedChar>, start: &mut Option<(f32, f32)>) {
        let metrics = self
            .metrics
            .get(&self.state.font)
            .cloned()
            .unwrap_or_else(FontMetrics::fallback);
        let text = decode_string(bytes, self.doc, &self.fonts, &self.state.font);
        let codes = metrics.codes(bytes);

        // Text-space advance of every glyph code
        let advances: Vec<f32> = codes
            .iter()
            .map(|&code| {
                let mut w = metrics.width(code) / 1000.0 * self.state.font_size
                    + self.state.char_spacing;
                if !metrics.two_byte && code == 32 {
                    w += self.state.word_spacing;
                }
                w * self.state.horizontal_scale
            })
            .collect();
        let total: f32 = advances.iter().sum();

        let chars: Vec<char> = text.chars().collect();
        let per_char: Vec<f32> = if chars.len() == advances.len() {
            advances
        } else if chars.is_empty() {
            Vec::new()
        } else {
            vec![total / chars.len() as f32; chars.len()]
        };

        let combined = multiply_matrices(&self.text_matrix, &self.ctm);
        if start.is_none() {
            *start = Some((
                combined[5],
                effective_font_size(self.state.font_size, &combined),
            ));
        }

        let mut offset = 0.0;
        for (ch, w) in chars.into_iter().zip(per_char) {
            let x0 = offset * combined[0] + combined[4];
            let x1 = (offset + w) * combined[0] + combined[4];
            run.push(PositionedChar {
                ch,
                x0: x0.min(x1),
                x1: x0.max(x1),
            });
            offset += w;
        }
        self.advance(total);
    }

    /// Apply a TJ kerning adjustment (thousandths of text space units)
    fn kern(&mut self, amount: f32, run: &mut Vec<PositionedChar>) {
        let tx = -amount / 1000.0 * self.state.font_size * self.state.horizontal_scale;
        // Large negative kerning stands in for a word space
        if amount < -200.0 {
            if let Some(last) = run.last() {
                if !last.ch.is_whitespace() {
                    let x = last.x1;
                    let combined = multiply_matrices(&self.text_matrix, &self.ctm);
                    run.push(PositionedChar {
                        ch: ' ',
                        x0: x,
                        x1: x + tx * combined[0],
                    });
                }
            }
        }
        self.advance(tx);
    }

    fn finish_run(&mut self, chars: Vec<PositionedChar>, start: Option<(f32, f32)>) {
        if chars.iter().all(|c| c.ch.is_whitespace()) {
            return;
        }
        if let Some((y, font_size)) = start {
            self.runs.push(TextRun {
                chars,
                y,
                font_size,
            });
        }
    }

    fn show_string(&mut self, operand: &Object) {
        if let Object::String(bytes, _) = operand {
            let mut chars = Vec::new();
            let mut start = None;
            self.show(bytes, &mut chars, &mut start);
            self.finish_run(chars, start);
        }
    }
}

/// Extract the text runs of a single page in content stream order
pub fn extract_page_runs(doc: &Document, page_id: ObjectId) -> Result<Vec<TextRun>, PdfError> {
    use lopdf::content::Content;

    let content_data = doc
        .get_page_content(page_id)
        .map_err(|e| PdfError::Parse(e.to_string()))?;
    let content = Content::decode(&content_data).map_err(|e| PdfError::Parse(e.to_string()))?;

    let mut collector = RunCollector::new(doc, page_id);
    let mut ctm_stack: Vec<[f32; 6]> = Vec::new();
    let mut in_text_block = false;

    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => ctm_stack.push(collector.ctm),
            "Q" => {
                if let Some(saved) = ctm_stack.pop() {
                    collector.ctm = saved;
                }
            }
            "cm" => {
                if operands.len() >= 6 {
                    let mut m = [1.0f32, 0.0, 0.0, 1.0, 0.0, 0.0];
                    for (i, operand) in operands.iter().take(6).enumerate() {
                        m[i] = get_number(operand).unwrap_or(m[i]);
                    }
                    collector.ctm = multiply_matrices(&m, &collector.ctm);
                }
            }
            "BT" => {
                in_text_block = true;
                collector.text_matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
                collector.line_matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
            }
            "ET" => in_text_block = false,
            "Tf" => {
                if operands.len() >= 2 {
                    if let Ok(name) = operands[0].as_name() {
                        collector.state.font = String::from_utf8_lossy(name).to_string();
                    }
                    if let Some(size) = get_number(&operands[1]) {
                        collector.state.font_size = size;
                    }
                }
            }
            "Tc" => {
                if let Some(v) = operands.first().and_then(get_number) {
                    collector.state.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = operands.first().and_then(get_number) {
                    collector.state.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some(v) = operands.first().and_then(get_number) {
                    collector.state.horizontal_scale = v / 100.0;
                }
            }
            "TL" => {
                if let Some(v) = operands.first().and_then(get_number) {
                    collector.state.leading = Some(v);
                }
            }
            "Td" | "TD" => {
                if operands.len() >= 2 {
                    let tx = get_number(&operands[0]).unwrap_or(0.0);
                    let ty = get_number(&operands[1]).unwrap_or(0.0);
                    if op.operator == "TD" {
                        collector.state.leading = Some(-ty);
                    }
                    collector.next_line(tx, ty);
                }
            }
            "Tm" => {
                if operands.len() >= 6 {
                    for (i, operand) in operands.iter().take(6).enumerate() {
                        collector.text_matrix[i] = get_number(operand)
                            .unwrap_or(if i == 0 || i == 3 { 1.0 } else { 0.0 });
                    }
                    collector.line_matrix = collector.text_matrix;
                }
            }
            "T*" => {
                let leading = collector.state.line_leading();
                collector.next_line(0.0, -leading);
            }
            "Tj" if in_text_block => {
                if let Some(operand) = operands.first() {
                    collector.show_string(operand);
                }
            }
            "TJ" if in_text_block => {
                if let Some(Ok(array)) = operands.first().map(Object::as_array) {
                    let mut chars = Vec::new();
                    let mut start = None;
                    for item in array {
                        match item {
                            Object::String(bytes, _) => collector.show(bytes, &mut chars, &mut start),
                            other => {
                                if let Some(amount) = get_number(other) {
                                    collector.kern(amount, &mut chars);
                                }
                            }
                        }
                    }
                    collector.finish_run(chars, start);
                }
            }
            "'" if in_text_block => {
                let leading = collector.state.line_leading();
                collector.next_line(0.0, -leading);
                if let Some(operand) = operands.first() {
                    collector.show_string(operand);
                }
            }
            "\"" if in_text_block => {
                if operands.len() >= 3 {
                    collector.state.word_spacing = get_number(&operands[0]).unwrap_or(0.0);
                    collector.state.char_spacing = get_number(&operands[1]).unwrap_or(0.0);
                    let leading = collector.state.line_leading();
                    collector.next_line(0.0, -leading);
                    collector.show_string(&operands[2]);
                }
            }
            _ => {}
        }
    }

    Ok(collector.runs)
}

/// Follow an indirect reference, returning the object itself otherwise
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Helper to get f32 from Object
pub(crate) fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Compute effective font size from base size and a text rendering matrix
fn effective_font_size(base_size: f32, matrix: &[f32; 6]) -> f32 {
    let scale_x = (matrix[0].powi(2) + matrix[1].powi(2)).sqrt();
    let scale_y = (matrix[2].powi(2) + matrix[3].powi(2)).sqrt();
    base_size * scale_x.max(scale_y)
}

/// Decode a string operand, using the font encoding when available
fn decode_string(
    bytes: &[u8],
    doc: &Document,
    fonts: &BTreeMap<Vec<u8>, &Dictionary>,
    current_font: &str,
) -> String {
    if let Some(font_dict) = fonts.get(current_font.as_bytes()) {
        if let Ok(encoding) = font_dict.get_font_encoding(doc) {
            if let Ok(text) = Document::decode_text(&encoding, bytes) {
                return text;
            }
        }
    }

    // Fallback: try UTF-16BE then Latin-1
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }

    bytes.iter().map(|&b| b as char).collect()
}
