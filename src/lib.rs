//! # edgequake-docconv
//!
//! Document conversion over a shared transient file store.
//!
//! Eight conversion kinds are supported: Word → PDF, PDF → Word,
//! PDF → JPEG page archive, image → PDF, PDF compression, PDF merge,
//! PDF split and PDF encryption. Inputs are copied into an *incoming* area
//! under collision-resistant names; every operation writes exactly one
//! artifact into a *working* area and cleans up after itself on failure.
//! Stale files are reclaimed by an age-based sweep that runs on a small
//! fraction of requests.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Admit     copy into incoming/ as <name>_<12 hex>.<ext>
//!  ├─ 2. Validate  extension class per kind, password for encryption
//!  ├─ 3. Reclaim   1-in-40 requests sweep files older than the retention
//!  ├─ 4. Convert   office suite → text fallback, lopdf, pdfium, image, zip
//!  ├─ 5. Commit    staged output renamed into working/
//!  └─ 6. Cleanup   consumed inputs removed from incoming/
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docconv::{ConversionKind, ConversionRequest, Converter, ConverterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let converter = Converter::new(ConverterConfig::default())?;
//!     let upload = converter.store().admit_file("report.docx", "report.docx".as_ref()).await?;
//!
//!     let request = ConversionRequest::single(ConversionKind::DocumentToPdf, upload.path);
//!     let output = converter.convert(&request).await?;
//!     if let Some(notice) = output.fidelity.notice() {
//!         eprintln!("{}", notice);
//!     }
//!     println!("{}", output.artifact.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docconv` binary (clap + anyhow + tracing-subscriber) |
//!
//! ## Native dependencies
//!
//! PDF → image needs the pdfium library (see [`pipeline::render`]).
//! Word → PDF uses LibreOffice when it is on `PATH` and degrades to a
//! text-only layout otherwise.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod reclaim;
pub mod request;
pub mod store;
pub mod strategy;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConverterConfig, ConverterConfigBuilder, PageSize};
pub use convert::{Artifact, Converter};
pub use error::{DocConvError, ErrorClass, ToolError};
pub use naming::{secure_filename, unique_filename};
pub use output::{ArtifactKind, ConversionOutput, Fidelity, ReclaimReport};
pub use reclaim::{BackgroundReclaimer, Reclaimer};
pub use request::{ConversionKind, ConversionOptions, ConversionRequest, FileClass};
pub use store::{StagedOutput, TransientFile, TransientStore};
pub use strategy::{ExternalConverter, PrimaryOutcome, StrategySelector};
