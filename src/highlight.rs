//! Highlight annotation objects

use crate::geometry::{bounding_rect, rects_to_quad_points, AnnotRect, QuadPoint};
use lopdf::{Dictionary, Object, StringFormat};

/// Default highlight colour (pale yellow)
pub const DEFAULT_COLOR: [f32; 3] = [1.0, 1.0, 0.4];

/// A highlight ready to be written into a page, geometry in annotation space
#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub quad_points: Vec<QuadPoint>,
    /// Bottom-left / top-right extremes across all quads
    pub rect: AnnotRect,
    pub author: Option<String>,
    pub comment: Option<String>,
    pub color: [f32; 3],
}

impl Highlight {
    /// Build a highlight covering `rects`; `None` when there is nothing to cover
    pub fn new(
        rects: &[AnnotRect],
        author: Option<String>,
        comment: Option<String>,
        color: [f32; 3],
    ) -> Option<Self> {
        let rect = bounding_rect(rects)?;
        Some(Self {
            quad_points: rects_to_quad_points(rects),
            rect,
            author,
            comment,
            color,
        })
    }

    /// Quad points as one flat array, the layout stored in the PDF
    pub fn flat_quad_points(&self) -> Vec<f32> {
        self.quad_points.iter().flatten().copied().collect()
    }

    /// The `/Annot` dictionary for this highlight
    pub fn to_dictionary(&self) -> Dictionary {
        let mut annot = Dictionary::new();
        annot.set("Type", Object::Name(b"Annot".to_vec()));
        annot.set("Subtype", Object::Name(b"Highlight".to_vec()));
        // Print flag
        annot.set("F", Object::Integer(4));
        annot.set(
            "C",
            Object::Array(self.color.iter().map(|&c| Object::Real(c)).collect()),
        );
        if let Some(author) = &self.author {
            annot.set("T", text_string(author));
        }
        if let Some(comment) = &self.comment {
            annot.set("Contents", text_string(comment));
        }
        annot.set(
            "QuadPoints",
            Object::Array(
                self.flat_quad_points()
                    .into_iter()
                    .map(Object::Real)
                    .collect(),
            ),
        );
        annot.set(
            "Rect",
            Object::Array(vec![
                Object::Real(self.rect.x0),
                Object::Real(self.rect.y0),
                Object::Real(self.rect.x1),
                Object::Real(self.rect.y1),
            ]),
        );
        annot
    }
}

/// Encode a PDF text string: literal for ASCII, UTF-16BE with BOM otherwise
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_bounds_and_quads() {
        let rects = [
            AnnotRect::new(300.0, 688.0, 500.0, 700.0),
            AnnotRect::new(72.0, 674.0, 150.0, 686.0),
        ];
        let hl = Highlight::new(&rects, None, Some("note".into()), DEFAULT_COLOR).unwrap();
        assert_eq!(hl.rect, AnnotRect::new(72.0, 674.0, 500.0, 700.0));
        assert_eq!(hl.quad_points.len(), 2);
        assert_eq!(
            hl.quad_points[0],
            [300.0, 700.0, 500.0, 700.0, 300.0, 688.0, 500.0, 688.0]
        );
        assert_eq!(hl.flat_quad_points().len(), 16);
    }

    #[test]
    fn test_empty_geometry_has_no_highlight() {
        assert!(Highlight::new(&[], None, None, DEFAULT_COLOR).is_none());
    }

    #[test]
    fn test_dictionary_entries() {
        let rects = [AnnotRect::new(72.0, 688.0, 160.0, 700.0)];
        let hl = Highlight::new(&rects, Some("Reader".into()), None, DEFAULT_COLOR).unwrap();
        let dict = hl.to_dictionary();
        assert_eq!(dict.get(b"Subtype").unwrap().as_name().unwrap(), b"Highlight");
        assert_eq!(dict.get(b"QuadPoints").unwrap().as_array().unwrap().len(), 8);
        assert_eq!(dict.get(b"Rect").unwrap().as_array().unwrap().len(), 4);
        assert!(dict.get(b"T").is_ok());
        assert!(dict.get(b"Contents").is_err());
    }

    #[test]
    fn test_non_ascii_comment_is_utf16() {
        match text_string("café") {
            Object::String(bytes, _) => {
                assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
                assert_eq!(bytes.len(), 2 + 4 * 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
