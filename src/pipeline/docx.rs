//! Minimal WordprocessingML support: paragraph text in, paragraph text out.
//!
//! Reading walks `word/document.xml` and collects the text of every `w:p`
//! (runs, tabs and breaks only; tables, images and styling are ignored).
//! Writing produces the smallest package Word and LibreOffice both open:
//! content types, the package relationship and one document part.

use super::archive::{read_entry, ArchiveBuilder};
use crate::error::DocConvError;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::{BufReader, Seek, Write};
use std::path::Path;

const MAIN_PART: &str = "word/document.xml";

const CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"</Types>"#,
);

const PACKAGE_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"</Relationships>"#,
);

/// Paragraph texts of a `.docx` file, in document order. Empty paragraphs
/// are kept as empty strings.
///
/// Legacy binary `.doc` files are not zip packages and are reported as
/// [`DocConvError::UnsupportedInput`].
pub fn read_paragraphs(path: &Path) -> Result<Vec<String>, DocConvError> {
    let file = File::open(path).map_err(|e| DocConvError::storage(path, e))?;
    let xml = read_entry(BufReader::new(file), MAIN_PART).map_err(|e| {
        let legacy = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("doc"));
        if legacy {
            DocConvError::UnsupportedInput {
                path: path.to_path_buf(),
                reason: "legacy binary Word documents can only be converted by the office suite"
                    .into(),
            }
        } else {
            DocConvError::CorruptInput {
                path: path.to_path_buf(),
                detail: format!("not a Word package: {e}"),
            }
        }
    })?;

    parse_document_xml(&xml).map_err(|detail| DocConvError::CorruptInput {
        path: path.to_path_buf(),
        detail,
    })
}

/// Extract paragraph texts from the main document part.
pub fn parse_document_xml(xml: &[u8]) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut paragraphs = Vec::new();
    // Text boxes nest paragraphs inside paragraphs.
    let mut open: Vec<String> = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => open.push(String::new()),
                b"t" => in_text = true,
                b"tab" => push_to(&mut open, "\t"),
                b"br" | b"cr" => push_to(&mut open, "\n"),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"tab" => push_to(&mut open, "\t"),
                b"br" | b"cr" => push_to(&mut open, "\n"),
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"p" => {
                    if let Some(p) = open.pop() {
                        paragraphs.push(p);
                    }
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                push_to(&mut open, &String::from_utf8_lossy(t.as_ref()));
            }
            Ok(Event::GeneralRef(r)) if in_text => {
                if let Some(resolved) = resolve_entity(&r) {
                    push_to(&mut open, &resolved);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "malformed XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

fn push_to(open: &mut [String], s: &str) {
    if let Some(p) = open.last_mut() {
        p.push_str(s);
    }
}

/// Resolve `&name;` references: the five predefined entities and numeric
/// character references.
fn resolve_entity(name: &[u8]) -> Option<String> {
    let name = std::str::from_utf8(name).ok()?;
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)?
        }
    };
    Some(c.to_string())
}

/// Write a `.docx` package with one paragraph per entry. Newlines inside an
/// entry become line breaks, tabs become tab stops.
pub fn write_paragraphs<W, S>(paragraphs: &[S], target: W) -> zip::result::ZipResult<W>
where
    W: Write + Seek,
    S: AsRef<str>,
{
    let mut body = String::new();
    for paragraph in paragraphs {
        body.push_str("<w:p>");
        for (i, line) in paragraph.as_ref().split('\n').enumerate() {
            if i > 0 {
                body.push_str("<w:r><w:br/></w:r>");
            }
            for (j, chunk) in line.split('\t').enumerate() {
                if j > 0 {
                    body.push_str("<w:r><w:tab/></w:r>");
                }
                if !chunk.is_empty() {
                    body.push_str(r#"<w:r><w:t xml:space="preserve">"#);
                    body.push_str(&escape(strip_xml_invalid(chunk).as_str()));
                    body.push_str("</w:t></w:r>");
                }
            }
        }
        body.push_str("</w:p>");
    }

    let document = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
            "<w:body>{}<w:sectPr/></w:body></w:document>"
        ),
        body
    );

    let mut package = ArchiveBuilder::new(target);
    package.add("[Content_Types].xml", CONTENT_TYPES.as_bytes())?;
    package.add("_rels/.rels", PACKAGE_RELS.as_bytes())?;
    package.add(MAIN_PART, document.as_bytes())?;
    package.finish()
}

/// Drop characters XML 1.0 cannot carry (C0 controls other than tab, LF, CR).
fn strip_xml_invalid(s: &str) -> String {
    s.chars()
        .filter(|&c| c >= ' ' || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_runs_tabs_and_breaks() {
        let xml = br#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t></w:r></w:p>
    <w:p/>
    <w:p><w:r><w:t>A</w:t><w:tab/><w:t>B</w:t><w:br/><w:t>C &amp; D</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let paragraphs = parse_document_xml(xml).unwrap();
        assert_eq!(paragraphs, vec!["Hello world", "", "A\tB\nC & D"]);
    }

    #[test]
    fn text_outside_w_t_is_ignored() {
        let xml = br#"<w:document xmlns:w="x"><w:body><w:p><w:pPr><w:pStyle w:val="Title"/></w:pPr>
<w:r><w:instrText>PAGE</w:instrText><w:t>kept</w:t></w:r></w:p></w:body></w:document>"#;
        assert_eq!(parse_document_xml(xml).unwrap(), vec!["kept"]);
    }

    #[test]
    fn written_package_reads_back() {
        let paragraphs = vec![
            "First <para> & \"quotes\"".to_string(),
            "line one\nline two".to_string(),
            "col\tcol".to_string(),
        ];
        let bytes = write_paragraphs(&paragraphs, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();

        let xml = read_entry(Cursor::new(&bytes), MAIN_PART).unwrap();
        assert_eq!(parse_document_xml(&xml).unwrap(), paragraphs);
        assert!(read_entry(Cursor::new(&bytes), "[Content_Types].xml").is_ok());
    }

    #[test]
    fn legacy_doc_is_unsupported() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("old.doc");
        std::fs::write(&path, [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]).unwrap();
        assert!(matches!(
            read_paragraphs(&path),
            Err(DocConvError::UnsupportedInput { .. })
        ));

        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(
            read_paragraphs(&path),
            Err(DocConvError::CorruptInput { .. })
        ));
    }

    #[test]
    fn numeric_references_resolve() {
        assert_eq!(resolve_entity(b"#65").as_deref(), Some("A"));
        assert_eq!(resolve_entity(b"#x20AC").as_deref(), Some("€"));
        assert_eq!(resolve_entity(b"nbsp"), None);
    }
}
