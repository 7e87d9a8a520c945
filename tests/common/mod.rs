//! Shared fixtures for the integration tests. Every input is generated in
//! the test; nothing is read from disk fixtures.

#![allow(dead_code)]

use edgequake_docconv::pipeline::docx::write_paragraphs;
use edgequake_docconv::{
    ConverterConfig, ExternalConverter, ToolError, TransientFile, TransientStore,
};
use futures::future::BoxFuture;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Skip the test when the pdfium library cannot be bound.
#[macro_export]
macro_rules! skip_unless_pdfium {
    () => {{
        if !edgequake_docconv::pipeline::render::pdfium_available() {
            println!("SKIP — pdfium library not found (set PDFIUM_LIB_PATH to run)");
            return;
        }
    }};
}

/// Config rooted in `root` with request-triggered sweeps disabled.
pub fn config(root: &TempDir) -> ConverterConfig {
    ConverterConfig::builder()
        .store_root(root.path())
        .reclaim_probability(0.0)
        .build()
        .unwrap()
}

/// A PDF with one page per label, each page showing its label.
pub fn pdf_bytes(labels: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let mut kids = Vec::new();
    for label in labels {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*label)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
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
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// A `.docx` package with the given paragraphs.
pub fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    write_paragraphs(paragraphs, Cursor::new(Vec::new()))
        .unwrap()
        .into_inner()
}

/// A PNG of `width` × `height` pixels, half transparent.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            image::Rgba([0, 0, 255, 255])
        } else {
            image::Rgba([0, 0, 0, 0])
        }
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Copy bytes into the incoming area the way an upload would arrive.
pub async fn upload(store: &TransientStore, name: &str, bytes: &[u8]) -> TransientFile {
    store.admit_bytes(name, bytes).await.unwrap()
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Page texts of a PDF on disk, in page order.
pub fn page_texts(path: &Path) -> Vec<String> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .keys()
        .map(|&n| doc.extract_text(&[n]).unwrap_or_default())
        .collect()
}

/// Scripted stand-in for the office suite.
#[derive(Debug)]
pub struct FakeOffice {
    mode: Mode,
    pub calls: AtomicUsize,
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Missing,
    Working,
    Crashing,
}

impl FakeOffice {
    pub fn missing() -> Self {
        Self::with_mode(Mode::Missing)
    }

    /// Writes `<stem>.pdf` with one page reading "rendered by office".
    pub fn working() -> Self {
        Self::with_mode(Mode::Working)
    }

    /// Exits non-zero without producing anything.
    pub fn crashing() -> Self {
        Self::with_mode(Mode::Crashing)
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExternalConverter for FakeOffice {
    fn name(&self) -> &str {
        "fake office"
    }

    fn ensure_available(&self) -> Result<(), ToolError> {
        match self.mode {
            Mode::Missing => Err(ToolError::Unavailable {
                searched: "fake-office".into(),
            }),
            _ => Ok(()),
        }
    }

    fn convert_to_pdf<'a>(
        &'a self,
        input: &'a Path,
        out_dir: &'a Path,
    ) -> BoxFuture<'a, Result<PathBuf, ToolError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                Mode::Working => {
                    let stem = input.file_stem().unwrap().to_string_lossy().into_owned();
                    let out = out_dir.join(format!("{stem}.pdf"));
                    std::fs::write(&out, pdf_bytes(&["rendered by office"])).unwrap();
                    Ok(out)
                }
                _ => Err(ToolError::ExitStatus {
                    program: "fake-office".into(),
                    status: "exit status: 77".into(),
                    stderr: "simulated crash".into(),
                }),
            }
        })
    }
}
