//! Minimal PDF page writer on top of `lopdf`.
//!
//! Only what the generators need: Helvetica text in two weights, lines,
//! filled rectangles, A4 pages. Coordinates are in millimetres from the
//! bottom-left corner of the page.

mod invoice;

pub use invoice::render_invoice_pdf;

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use crate::core::BelegError;

/// A4 width in millimetres.
pub const A4_WIDTH_MM: f32 = 210.0;
/// A4 height in millimetres.
pub const A4_HEIGHT_MM: f32 = 297.0;

const PT_PER_MM: f32 = 72.0 / 25.4;

/// Convert millimetres to PDF points.
pub fn mm(value: f32) -> f32 {
    value * PT_PER_MM
}

/// Font weights available on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(&self) -> &'static str {
        match self {
            Self::Regular => "F1",
            Self::Bold => "F2",
        }
    }
}

/// One A4 page under construction.
#[derive(Default)]
pub struct Page {
    operations: Vec<Operation>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw a single line of text with its baseline at `(x, y)`.
    pub fn text(&mut self, x: f32, y: f32, font: Font, size: f32, text: &str) {
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![font.resource_name().into(), size.into()],
            ),
            Operation::new("Td", vec![mm(x).into(), mm(y).into()]),
            Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(text))]),
            Operation::new("ET", vec![]),
        ]);
    }

    /// Draw lines of text downwards from `(x, y)`, `leading` mm apart.
    /// Returns the baseline below the last line.
    pub fn text_block(
        &mut self,
        x: f32,
        y: f32,
        font: Font,
        size: f32,
        leading: f32,
        lines: &[String],
    ) -> f32 {
        let mut baseline = y;
        for line in lines {
            self.text(x, baseline, font, size, line);
            baseline -= leading;
        }
        baseline
    }

    /// Stroke a line of `width` mm.
    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, width: f32) {
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("w", vec![mm(width).into()]),
            Operation::new("m", vec![mm(x1).into(), mm(y1).into()]),
            Operation::new("l", vec![mm(x2).into(), mm(y2).into()]),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    /// Stroke a dashed line, as used for the perforation of a payment part.
    pub fn dashed_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, width: f32) {
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "d",
                vec![Object::Array(vec![mm(2.0).into(), mm(1.0).into()]), 0.into()],
            ),
        ]);
        self.line(x1, y1, x2, y2, width);
        self.operations.push(Operation::new("Q", vec![]));
    }

    /// Fill a rectangle with a gray level (0 = black, 1 = white).
    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, gray: f32) {
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("g", vec![gray.into()]),
            Operation::new(
                "re",
                vec![mm(x).into(), mm(y).into(), mm(width).into(), mm(height).into()],
            ),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    /// Queue raw operations, for drawings built elsewhere.
    pub fn extend(&mut self, operations: impl IntoIterator<Item = Operation>) {
        self.operations.extend(operations);
    }
}

/// Assembles pages into a single PDF document.
pub struct PdfWriter {
    title: String,
    pages: Vec<Page>,
}

impl PdfWriter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            pages: Vec::new(),
        }
    }

    pub fn add_page(&mut self, page: Page) {
        self.pages.push(page);
    }

    /// Serialize the document. Nothing is written anywhere until the
    /// returned bytes are handed to a store.
    pub fn finish(self) -> Result<Vec<u8>, BelegError> {
        if self.pages.is_empty() {
            return Err(BelegError::RenderFailed("document has no pages".into()));
        }

        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let regular_id = doc.add_object(font_dictionary("Helvetica"));
        let bold_id = doc.add_object(font_dictionary("Helvetica-Bold"));
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => Object::Reference(regular_id),
                "F2" => Object::Reference(bold_id),
            },
        });

        let mut kids = Vec::with_capacity(self.pages.len());
        for page in self.pages {
            let content = Content {
                operations: page.operations,
            };
            let encoded = content
                .encode()
                .map_err(|e| BelegError::RenderFailed(format!("failed to encode page: {e}")))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    mm(A4_WIDTH_MM).into(),
                    mm(A4_HEIGHT_MM).into(),
                ],
                "Contents" => Object::Reference(content_id),
                "Resources" => Object::Reference(resources_id),
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(encode_win_ansi(&self.title)),
            "Producer" => Object::string_literal("kontor"),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc.trailer.set("Info", Object::Reference(info_id));

        let mut output = Vec::new();
        doc.save_to(&mut output)
            .map_err(|e| BelegError::RenderFailed(format!("failed to save PDF: {e}")))?;
        Ok(output)
    }
}

fn font_dictionary(base_font: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Object::Name(base_font.as_bytes().to_vec()),
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Encode text for the standard fonts' WinAnsi encoding.
///
/// Latin-1 characters map to themselves, a few typographic characters to
/// their WinAnsi slots, anything else to `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '–' => 0x96,
            '—' => 0x97,
            c if (c as u32) < 0x80 || (0xA0..=0xFF).contains(&(c as u32)) => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}
