//! Plain-paragraph PDF layout for the degraded document → PDF path.
//!
//! One style for everything: Helvetica at the configured size, 1.2× leading,
//! a 12pt gap between paragraphs and one-inch margins. Lines are wrapped on
//! whitespace using the standard Helvetica metrics; words wider than the
//! text column are broken by character. Text is encoded as WinAnsi, so
//! characters outside it are shown as `?`.

use crate::config::{ConverterConfig, PageSize};
use crate::error::DocConvError;
use crate::request::ConversionKind;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

/// Gap between paragraphs, in points.
const PARAGRAPH_GAP: f32 = 12.0;
/// Page margin on every side, in points.
const MARGIN: f32 = 72.0;
/// Line height as a multiple of the font size.
const LEADING: f32 = 1.2;

/// Lays out paragraphs onto fixed-size pages.
#[derive(Debug, Clone, Copy)]
pub struct TextLayout {
    page: PageSize,
    font_size: f32,
}

/// One line placed on a page: baseline `y` (from the page bottom) and text.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub y: f32,
    pub text: String,
}

impl TextLayout {
    pub fn new(page: PageSize, font_size: f32) -> Self {
        Self { page, font_size }
    }

    pub fn from_config(config: &ConverterConfig) -> Self {
        Self::new(config.fallback_page, config.fallback_font_size)
    }

    fn column_width(&self) -> f32 {
        (self.page.dimensions().0 - 2.0 * MARGIN).max(self.font_size)
    }

    fn text_width(&self, s: &str) -> f32 {
        s.chars().map(glyph_width).sum::<u32>() as f32 * self.font_size / 1000.0
    }

    /// Wrap one paragraph to the text column. Explicit newlines are kept as
    /// line breaks.
    pub fn wrap(&self, paragraph: &str) -> Vec<String> {
        let max = self.column_width();
        let mut lines = Vec::new();

        for source_line in paragraph.lines() {
            let mut current = String::new();
            for word in source_line.split_whitespace() {
                let candidate = if current.is_empty() {
                    word.to_string()
                } else {
                    format!("{current} {word}")
                };
                if self.text_width(&candidate) <= max {
                    current = candidate;
                    continue;
                }
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                if self.text_width(word) <= max {
                    current = word.to_string();
                } else {
                    // Break an over-long word by character.
                    for c in word.chars() {
                        current.push(c);
                        if self.text_width(&current) > max && current.chars().count() > 1 {
                            current.pop();
                            lines.push(std::mem::take(&mut current));
                            current.push(c);
                        }
                    }
                }
            }
            if !current.is_empty() {
                lines.push(current);
            }
        }
        lines
    }

    /// Place paragraphs onto pages. Blank paragraphs are skipped. Always
    /// returns at least one (possibly empty) page.
    pub fn paginate<S: AsRef<str>>(&self, paragraphs: &[S]) -> Vec<Vec<PlacedLine>> {
        let (_, height) = self.page.dimensions();
        let line_height = self.font_size * LEADING;
        let top = height - MARGIN - self.font_size;

        let mut pages: Vec<Vec<PlacedLine>> = vec![Vec::new()];
        let mut y = top;
        let mut first_paragraph = true;

        for paragraph in paragraphs {
            let paragraph = paragraph.as_ref();
            if paragraph.trim().is_empty() {
                continue;
            }
            if !first_paragraph {
                y -= PARAGRAPH_GAP;
            }
            first_paragraph = false;

            for line in self.wrap(paragraph) {
                let on_fresh_page = pages.last().is_some_and(Vec::is_empty);
                if y < MARGIN && !on_fresh_page {
                    pages.push(Vec::new());
                    y = top;
                }
                if let Some(page) = pages.last_mut() {
                    page.push(PlacedLine { y, text: line });
                }
                y -= line_height;
            }
        }
        pages
    }

    /// Build a complete document from paragraphs.
    pub fn render<S: AsRef<str>>(&self, paragraphs: &[S]) -> Result<Document, DocConvError> {
        let (width, height) = self.page.dimensions();
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for (index, lines) in self.paginate(paragraphs).into_iter().enumerate() {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), self.font_size.into()]),
            ];
            for line in lines {
                operations.push(Operation::new(
                    "Tm",
                    vec![
                        1.into(),
                        0.into(),
                        0.into(),
                        1.into(),
                        MARGIN.into(),
                        line.y.into(),
                    ],
                ));
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::String(win_ansi(&line.text), StringFormat::Literal)],
                ));
            }
            operations.push(Operation::new("ET", vec![]));

            let bytes = Content { operations }.encode().map_err(|e| {
                DocConvError::conversion(
                    ConversionKind::DocumentToPdf,
                    format!("content stream of page {}: {e}", index + 1),
                )
            })?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, bytes));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();
        Ok(doc)
    }
}

/// Encode as WinAnsi (CP-1252); unmappable characters become `?`.
pub fn win_ansi(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7e}' | '\u{a0}'..='\u{ff}' => c as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            '\t' => b' ',
            _ => b'?',
        })
        .collect()
}

/// Helvetica advance width in 1/1000 em.
fn glyph_width(c: char) -> u32 {
    const ASCII: [u16; 95] = [
        278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
        556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
        278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
        667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
        722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
        278, 278, 278, 469, 556, 333, // '['..'`'
        556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
        556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
        334, 260, 334, 584, // '{'..'~'
    ];
    match c {
        ' '..='~' => ASCII[c as usize - 0x20] as u32,
        '‘' | '’' | '‚' => 222,
        '“' | '”' | '„' => 333,
        '•' => 350,
        '—' | '…' | '™' => 1000,
        _ => 556,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> TextLayout {
        TextLayout::new(PageSize::Letter, 10.0)
    }

    #[test]
    fn widths_match_helvetica_metrics() {
        assert_eq!(glyph_width(' '), 278);
        assert_eq!(glyph_width('@'), 1015);
        assert_eq!(glyph_width('W'), 944);
        assert_eq!(glyph_width('i'), 222);
        assert_eq!(glyph_width('~'), 584);
        assert!((layout().text_width("Hello") - 22.78).abs() < 0.01);
    }

    #[test]
    fn long_paragraph_wraps_within_column() {
        let l = layout();
        let text = "lorem ipsum dolor sit amet ".repeat(40);
        let lines = l.wrap(&text);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(l.text_width(line) <= l.column_width(), "{line}");
        }
        let rejoined = lines.join(" ");
        assert_eq!(rejoined.split_whitespace().count(), text.split_whitespace().count());
    }

    #[test]
    fn overlong_word_is_broken() {
        let l = layout();
        let word = "x".repeat(500);
        let lines = l.wrap(&word);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), word);
    }

    #[test]
    fn blank_paragraphs_are_skipped() {
        let pages = layout().paginate(&["first", "   ", "", "second"]);
        assert_eq!(pages.len(), 1);
        let texts: Vec<_> = pages[0].iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        // one line height plus the paragraph gap between them
        let gap = pages[0][0].y - pages[0][1].y;
        assert!((gap - (12.0 + 12.0)).abs() < 0.01, "gap {gap}");
    }

    #[test]
    fn many_paragraphs_spill_onto_new_pages() {
        let paragraphs: Vec<String> = (0..200).map(|i| format!("Paragraph {i}")).collect();
        let pages = layout().paginate(&paragraphs);
        assert!(pages.len() > 1);
        for page in &pages {
            for line in page {
                assert!(line.y >= MARGIN - 0.01 || page.len() == 1);
            }
        }
        let total: usize = pages.iter().map(Vec::len).sum();
        assert_eq!(total, 200);
    }

    #[test]
    fn empty_input_still_has_a_page() {
        let doc = layout().render::<&str>(&[]).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn every_page_carries_its_lines() {
        let paragraphs: Vec<String> = (0..120).map(|i| format!("Line {i}")).collect();
        let doc = layout().render(&paragraphs).unwrap();
        let pages = doc.get_pages();
        assert!(pages.len() > 1);
        for (number, page_id) in pages {
            let content = doc.get_page_content(page_id).unwrap();
            let ops = Content::decode(&content).unwrap().operations;
            let shown = ops.iter().filter(|op| op.operator == "Tj").count();
            assert!(shown > 0, "page {number} has no text");
        }
    }

    #[test]
    fn win_ansi_replaces_unmappable() {
        assert_eq!(win_ansi("café €5 — ok"), b"caf\xe9 \x805 \x97 ok".to_vec());
        assert_eq!(win_ansi("日本"), b"??".to_vec());
    }

    #[test]
    fn rendered_text_is_extractable() {
        let mut doc = layout().render(&["Quarterly results", "Revenue grew"]).unwrap();
        let bytes = crate::pipeline::pdf::to_bytes(&mut doc).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let text = doc.extract_text(&[1]).unwrap();
        assert!(text.contains("Quarterly"), "{text:?}");
        assert!(text.contains("Revenue"), "{text:?}");
    }
}
