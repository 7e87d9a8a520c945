//! Conversion strategy selection for document → PDF.
//!
//! The high-fidelity path runs an external office suite; the degraded path
//! lays out paragraph text in-process. The selector always tries the
//! external path first, records what happened as a [`PrimaryOutcome`], and
//! falls back on anything other than [`PrimaryOutcome::Converted`]. Tool
//! failures never reach the caller; a fallback failure always does.

use crate::config::ConverterConfig;
use crate::error::{DocConvError, ToolError};
use crate::output::Fidelity;
use crate::pipeline::office::OfficeSuite;
use crate::store::{file_stem, TransientStore};
use futures::future::BoxFuture;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A high-fidelity document → PDF converter living outside the process.
///
/// Implementations must write `<input-stem>.pdf` into `out_dir` and return
/// its path.
pub trait ExternalConverter: fmt::Debug + Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Whether the converter can run right now. Called on every request.
    fn ensure_available(&self) -> Result<(), ToolError>;

    fn convert_to_pdf<'a>(
        &'a self,
        input: &'a Path,
        out_dir: &'a Path,
    ) -> BoxFuture<'a, Result<PathBuf, ToolError>>;
}

impl ExternalConverter for OfficeSuite {
    fn name(&self) -> &str {
        "office suite"
    }

    fn ensure_available(&self) -> Result<(), ToolError> {
        OfficeSuite::locate(self).map(drop)
    }

    fn convert_to_pdf<'a>(
        &'a self,
        input: &'a Path,
        out_dir: &'a Path,
    ) -> BoxFuture<'a, Result<PathBuf, ToolError>> {
        Box::pin(OfficeSuite::convert_to_pdf(self, input, out_dir))
    }
}

/// What the external path did, before any fallback decision.
#[derive(Debug, Clone)]
pub enum PrimaryOutcome {
    /// The tool produced this file.
    Converted(PathBuf),
    /// The tool is not installed or not reachable.
    Unavailable(ToolError),
    /// The tool ran and failed (exit status, timeout, missing output).
    Failed(ToolError),
}

impl PrimaryOutcome {
    pub fn fidelity(&self) -> Fidelity {
        match self {
            PrimaryOutcome::Converted(_) => Fidelity::Full,
            _ => Fidelity::Degraded,
        }
    }
}

/// Chooses between the external converter and the in-process fallback.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    external: Arc<dyn ExternalConverter>,
}

impl StrategySelector {
    pub fn new(external: Arc<dyn ExternalConverter>) -> Self {
        Self { external }
    }

    /// Selector backed by the configured office suite.
    pub fn office(config: &ConverterConfig) -> Self {
        Self::new(Arc::new(OfficeSuite::new(config)))
    }

    pub fn external(&self) -> &dyn ExternalConverter {
        self.external.as_ref()
    }

    /// Check for the external converter and run it when present.
    pub async fn run_primary(&self, input: &Path, out_dir: &Path) -> PrimaryOutcome {
        if let Err(e) = self.external.ensure_available() {
            return PrimaryOutcome::Unavailable(e);
        }
        match self.external.convert_to_pdf(input, out_dir).await {
            Ok(path) => PrimaryOutcome::Converted(path),
            Err(e @ ToolError::Unavailable { .. }) => PrimaryOutcome::Unavailable(e),
            Err(e) => PrimaryOutcome::Failed(e),
        }
    }

    /// Convert a document to `<stem>.pdf` in the working area.
    ///
    /// `fallback` runs on the blocking pool only when the external path did
    /// not produce a file; it receives the final output path and must write
    /// it atomically.
    pub async fn document_to_pdf<F>(
        &self,
        input: &Path,
        store: &TransientStore,
        fallback: F,
    ) -> Result<(PathBuf, Fidelity), DocConvError>
    where
        F: FnOnce(PathBuf) -> Result<PathBuf, DocConvError> + Send + 'static,
    {
        let final_name = format!("{}.pdf", file_stem(input));

        let outcome = {
            // The scratch directory (and any partial tool output or profile
            // in it) is gone once this block ends.
            let scratch = store.scratch_dir("office")?;
            match self.run_primary(input, scratch.path()).await {
                PrimaryOutcome::Converted(produced) => {
                    let path = store.adopt(&produced, &final_name)?;
                    PrimaryOutcome::Converted(path)
                }
                other => other,
            }
        };

        match outcome {
            PrimaryOutcome::Converted(path) => {
                info!("{} converted {}", self.external.name(), input.display());
                Ok((path, Fidelity::Full))
            }
            PrimaryOutcome::Unavailable(e) => {
                info!("{} unavailable ({}), using text-only fallback", self.external.name(), e);
                self.run_fallback(store, &final_name, fallback).await
            }
            PrimaryOutcome::Failed(e) => {
                warn!("{} failed ({}), using text-only fallback", self.external.name(), e);
                self.run_fallback(store, &final_name, fallback).await
            }
        }
    }

    async fn run_fallback<F>(
        &self,
        store: &TransientStore,
        final_name: &str,
        fallback: F,
    ) -> Result<(PathBuf, Fidelity), DocConvError>
    where
        F: FnOnce(PathBuf) -> Result<PathBuf, DocConvError> + Send + 'static,
    {
        let target = store.working_path(final_name);
        let path = tokio::task::spawn_blocking(move || fallback(target))
            .await
            .map_err(|e| DocConvError::Internal(format!("Fallback task panicked: {}", e)))??;
        Ok((path, Fidelity::Degraded))
    }
}
