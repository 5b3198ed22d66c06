//! lopdf-backed document: text geometry for the resolvers and highlight
//! writing
//!
//! Annotation-space rectangles handed in and out of this type are relative
//! to the page's MediaBox origin; translation to raw user space happens only
//! when reading or writing `/Rect` entries.

use crate::extractor::{extract_page_runs, get_number, resolve};
use crate::geometry::{AnnotRect, SearchRect};
use crate::highlight::Highlight;
use crate::layout::{PageBox, PageLayout};
use crate::search::PageTextSource;
use crate::PdfError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use std::path::Path;

/// Maximum depth followed up the page tree for inherited attributes
const MAX_INHERIT_DEPTH: usize = 32;

/// An open PDF with lazily built per-page text layouts
pub struct PdfDocument {
    doc: Document,
    page_ids: Vec<ObjectId>,
    layouts: HashMap<usize, PageLayout>,
}

impl PdfDocument {
    /// Load a PDF file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PdfError> {
        Self::from_document(Document::load(path)?)
    }

    /// Load a PDF from a memory buffer
    pub fn load_mem(buffer: &[u8]) -> Result<Self, PdfError> {
        Self::from_document(Document::load_mem(buffer)?)
    }

    pub fn from_document(doc: Document) -> Result<Self, PdfError> {
        if doc.is_encrypted() {
            return Err(PdfError::Encrypted);
        }
        // get_pages is keyed by 1-based page number in page order
        let page_ids = doc.get_pages().into_values().collect();
        Ok(Self {
            doc,
            page_ids,
            layouts: HashMap::new(),
        })
    }

    /// Write the document to `path`
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<(), PdfError> {
        self.doc.save(path)?;
        Ok(())
    }

    /// Write the document into a memory buffer
    pub fn save_mem(&mut self) -> Result<Vec<u8>, PdfError> {
        let mut buffer = Vec::new();
        self.doc.save_to(&mut buffer)?;
        Ok(buffer)
    }

    pub fn inner(&self) -> &Document {
        &self.doc
    }

    fn page_id(&self, page: usize) -> Result<ObjectId, PdfError> {
        self.page_ids
            .get(page)
            .copied()
            .ok_or(PdfError::PageOutOfRange(page))
    }

    /// The page's MediaBox, inherited through the page tree if needed
    pub fn page_box(&self, page: usize) -> Result<PageBox, PdfError> {
        let mut id = self.page_id(page)?;
        for _ in 0..MAX_INHERIT_DEPTH {
            let dict = self.doc.get_dictionary(id)?;
            if let Ok(media_box) = dict.get(b"MediaBox") {
                return parse_box(&self.doc, media_box);
            }
            match dict.get(b"Parent").and_then(Object::as_reference) {
                Ok(parent) => id = parent,
                Err(_) => break,
            }
        }
        log::debug!("Page {} has no MediaBox, assuming US Letter", page + 1);
        Ok(PageBox::default())
    }

    /// Text layout of a page, built on first use
    pub fn layout(&mut self, page: usize) -> Result<&PageLayout, PdfError> {
        if !self.layouts.contains_key(&page) {
            let page_id = self.page_id(page)?;
            let page_box = self.page_box(page)?;
            let runs = extract_page_runs(&self.doc, page_id)?;
            let layout = PageLayout::build(runs, &page_box);
            log::debug!(
                "Page {}: {} lines in {} blocks",
                page + 1,
                layout.lines.len(),
                layout.blocks.len()
            );
            self.layouts.insert(page, layout);
        }
        self.layouts
            .get(&page)
            .ok_or(PdfError::PageOutOfRange(page))
    }

    /// Append a highlight to the page's `/Annots` array
    pub fn add_highlight(&mut self, page: usize, highlight: &Highlight) -> Result<ObjectId, PdfError> {
        let page_id = self.page_id(page)?;
        let page_box = self.page_box(page)?;

        let mut shifted = highlight.clone();
        shift_highlight(&mut shifted, page_box.x0, page_box.y0);
        let mut annot = shifted.to_dictionary();
        annot.set("P", Object::Reference(page_id));
        let annot_id = self.doc.add_object(Object::Dictionary(annot));

        add_annotation_to_page(&mut self.doc, page_id, annot_id)?;
        Ok(annot_id)
    }
}

impl PageTextSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn search_for(
        &mut self,
        page: usize,
        text: &str,
        hit_max: usize,
    ) -> Result<Vec<SearchRect>, PdfError> {
        Ok(self.layout(page)?.search(text, hit_max))
    }

    fn text_blocks(&mut self, page: usize) -> Result<Vec<SearchRect>, PdfError> {
        Ok(self.layout(page)?.blocks.clone())
    }

    fn page_height(&self, page: usize) -> Result<f32, PdfError> {
        Ok(self.page_box(page)?.height())
    }

    fn annotation_rects(&self, page: usize) -> Result<Vec<AnnotRect>, PdfError> {
        let page_id = self.page_id(page)?;
        let page_box = self.page_box(page)?;
        let page_dict = self.doc.get_dictionary(page_id)?;

        let annots = match page_dict.get(b"Annots") {
            Ok(obj) => match resolve(&self.doc, obj).as_array() {
                Ok(array) => array,
                Err(_) => return Ok(Vec::new()),
            },
            Err(_) => return Ok(Vec::new()),
        };

        let mut rects = Vec::new();
        for entry in annots {
            let Ok(annot) = resolve(&self.doc, entry).as_dict() else {
                continue;
            };
            let Ok(rect) = annot.get(b"Rect") else {
                continue;
            };
            if let Ok(b) = parse_box(&self.doc, rect) {
                rects.push(AnnotRect::new(
                    b.x0 - page_box.x0,
                    b.y0 - page_box.y0,
                    b.x1 - page_box.x0,
                    b.y1 - page_box.y0,
                ));
            }
        }
        Ok(rects)
    }
}

/// Parse a 4-number rectangle array, normalising corner order
fn parse_box(doc: &Document, obj: &Object) -> Result<PageBox, PdfError> {
    let array = resolve(doc, obj).as_array()?;
    let nums: Vec<f32> = array
        .iter()
        .filter_map(|o| get_number(resolve(doc, o)))
        .collect();
    if nums.len() != 4 {
        return Err(PdfError::InvalidStructure);
    }
    let r = AnnotRect::from_corners(nums[0], nums[1], nums[2], nums[3]);
    Ok(PageBox {
        x0: r.x0,
        y0: r.y0,
        x1: r.x1,
        y1: r.y1,
    })
}

fn shift_highlight(highlight: &mut Highlight, dx: f32, dy: f32) {
    if dx == 0.0 && dy == 0.0 {
        return;
    }
    for quad in &mut highlight.quad_points {
        for pair in quad.chunks_exact_mut(2) {
            pair[0] += dx;
            pair[1] += dy;
        }
    }
    let r = &mut highlight.rect;
    r.x0 += dx;
    r.x1 += dx;
    r.y0 += dy;
    r.y1 += dy;
}

/// Push an annotation reference onto a page, creating `/Annots` if missing
fn add_annotation_to_page(
    doc: &mut Document,
    page_id: ObjectId,
    annot_id: ObjectId,
) -> Result<(), PdfError> {
    let annots_ref = match doc.get_dictionary(page_id)?.get(b"Annots") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };

    if let Some(id) = annots_ref {
        let array = doc.get_object_mut(id)?.as_array_mut()?;
        array.push(Object::Reference(annot_id));
        return Ok(());
    }

    let page: &mut Dictionary = doc.get_dictionary_mut(page_id)?;
    if let Ok(Object::Array(array)) = page.get_mut(b"Annots") {
        array.push(Object::Reference(annot_id));
        return Ok(());
    }
    page.set("Annots", Object::Array(vec![Object::Reference(annot_id)]));
    Ok(())
}
