//! Format-level building blocks used by the conversion operations.
//!
//! Each submodule handles one format or engine and knows nothing about the
//! transient store or requests; [`crate::convert`] wires them together.
//!
//! ```text
//! office   ──▶ external office suite (document → PDF, high fidelity)
//! docx     ──▶ WordprocessingML paragraphs in / out
//! layout   ──▶ paragraph text → PDF pages (degraded document → PDF)
//! pdf      ──▶ lopdf: load, text, merge, extract page, encrypt, optimise
//! render   ──▶ pdfium: PDF pages → images (blocking)
//! raster   ──▶ JPEG encoding, image → one-page PDF
//! archive  ──▶ zip bundles of numbered pages
//! ```

pub mod archive;
pub mod docx;
pub mod layout;
pub mod office;
pub mod pdf;
pub mod raster;
pub mod render;
