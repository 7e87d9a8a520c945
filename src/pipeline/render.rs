//! PDF rasterisation via pdfium.
//!
//! pdfium keeps thread-local state and is CPU-bound, so callers run
//! [`render_each_page_blocking`] on the blocking pool. Pages are rendered at
//! a fixed DPI (`dpi / 72` scale) so the output size follows the physical
//! page size; a longest-edge cap keeps a poster-sized page from producing a
//! bitmap of hundreds of megabytes.
//!
//! The library is located in this order:
//!
//! 1. `PDFIUM_LIB_PATH`, a path to the library file or to its directory
//! 2. the platform library name in the current directory
//! 3. the system library search path

use crate::error::DocConvError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit pdfium library.
pub const LIBRARY_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind to the first pdfium library that loads.
pub fn bind_pdfium() -> Result<Pdfium, DocConvError> {
    let mut tried = Vec::new();

    for candidate in library_candidates() {
        match Pdfium::bind_to_library(&candidate) {
            Ok(bindings) => {
                debug!("pdfium bound from {}", candidate.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => tried.push(format!("{}: {:?}", candidate.display(), e)),
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(e) => {
            tried.push(format!("system library: {:?}", e));
            Err(DocConvError::EngineUnavailable {
                engine: "pdfium".into(),
                detail: tried.join("; "),
            })
        }
    }
}

/// Whether a pdfium library can be bound in this environment.
pub fn pdfium_available() -> bool {
    bind_pdfium().is_ok()
}

fn library_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(explicit) = std::env::var_os(LIBRARY_ENV).filter(|v| !v.is_empty()) {
        let explicit = PathBuf::from(explicit);
        if explicit.is_dir() {
            candidates.push(Pdfium::pdfium_platform_library_name_at_path(&explicit));
        } else {
            candidates.push(explicit);
        }
    }
    let local = Pdfium::pdfium_platform_library_name_at_path("./");
    if local.is_file() {
        candidates.push(local);
    }
    candidates
}

/// Render every page of `pdf_path` at `dpi`, in page order, handing each
/// bitmap to `on_page` (1-based page number) before the next page is
/// rendered. Returns the page count.
///
/// Only one page bitmap is alive at a time. `max_edge` bounds the longest
/// side of each bitmap in pixels, so an oversized page is scaled down
/// instead of rendered at full DPI.
pub fn render_each_page_blocking<F>(
    pdf_path: &Path,
    dpi: u32,
    max_edge: u32,
    mut on_page: F,
) -> Result<usize, DocConvError>
where
    F: FnMut(usize, DynamicImage) -> Result<(), DocConvError>,
{
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| match e {
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
                DocConvError::EncryptedInput {
                    path: pdf_path.to_path_buf(),
                }
            }
            PdfiumError::IoError(source) => DocConvError::storage(pdf_path, source),
            other => DocConvError::CorruptInput {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", other),
            },
        })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    if total == 0 {
        return Err(DocConvError::CorruptInput {
            path: pdf_path.to_path_buf(),
            detail: "document has no pages".into(),
        });
    }
    info!("Rasterising {} pages at {} DPI", total, dpi);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_edge as i32)
        .set_maximum_height(max_edge as i32);

    for idx in 0..total {
        let page_number = idx + 1;
        let page = pages
            .get(idx as PdfPageIndex)
            .map_err(|e| DocConvError::Rasterisation {
                page: page_number,
                detail: format!("{:?}", e),
            })?;

        let image = page
            .render_with_config(&render_config)
            .map_err(|e| DocConvError::Rasterisation {
                page: page_number,
                detail: format!("{:?}", e),
            })?
            .as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_number,
            image.width(),
            image.height()
        );
        on_page(page_number, image)?;
    }

    Ok(total)
}
