//! Result types returned to callers.

use crate::request::ConversionKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Whether a conversion preserved the original layout.
///
/// Only document → PDF can come back [`Fidelity::Degraded`]; every other
/// kind runs a single in-process path and is always [`Fidelity::Full`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fidelity {
    /// Formatting, images and layout were preserved.
    #[default]
    Full,
    /// Only paragraph text survived; the caller must tell the end user.
    Degraded,
}

impl Fidelity {
    pub fn is_degraded(self) -> bool {
        self == Fidelity::Degraded
    }

    /// User-facing notice for degraded results, `None` for full fidelity.
    pub fn notice(self) -> Option<&'static str> {
        match self {
            Fidelity::Full => None,
            Fidelity::Degraded => Some(
                "Notice: Only text was preserved, formatting/images may be lost \
                 (office suite not available).",
            ),
        }
    }
}

/// Shape of the produced artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Pdf,
    Docx,
    Zip,
}

impl ArtifactKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "application/pdf",
            ArtifactKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ArtifactKind::Zip => "application/zip",
        }
    }
}

/// A successful conversion: one ready-to-stream file in the working area.
///
/// The artifact belongs to the caller from here on; delete it after
/// streaming or leave it for the reclamation sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub kind: ConversionKind,
    /// Absolute path of the artifact inside the working area.
    pub artifact: PathBuf,
    pub artifact_kind: ArtifactKind,
    pub fidelity: Fidelity,
    /// Size of the artifact on disk.
    pub bytes: u64,
    /// Number of entries when the artifact is an archive, else `None`.
    pub entries: Option<usize>,
    /// Inputs that were skipped because they did not belong to the
    /// required class (merge only).
    pub skipped_inputs: Vec<PathBuf>,
    pub duration_ms: u64,
}

impl ConversionOutput {
    /// File name to offer for download.
    pub fn download_name(&self) -> String {
        self.artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string())
    }
}

/// Outcome of one reclamation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimReport {
    /// Regular files examined across both areas.
    pub scanned: usize,
    /// Files deleted because they were older than the retention threshold.
    pub removed: usize,
    /// Files that vanished between listing and deletion.
    pub already_gone: usize,
    /// Files whose metadata read or deletion failed (logged, not fatal).
    pub errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_has_notice() {
        assert!(Fidelity::Degraded.notice().is_some());
        assert!(Fidelity::Full.notice().is_none());
        assert!(Fidelity::Degraded.is_degraded());
    }

    #[test]
    fn output_serialises_with_lowercase_fidelity() {
        let out = ConversionOutput {
            kind: ConversionKind::DocumentToPdf,
            artifact: PathBuf::from("/tmp/work/report_1a2b3c4d.pdf"),
            artifact_kind: ArtifactKind::Pdf,
            fidelity: Fidelity::Degraded,
            bytes: 1234,
            entries: None,
            skipped_inputs: vec![],
            duration_ms: 5,
        };
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("\"fidelity\":\"degraded\""), "got: {json}");
        assert!(json.contains("\"kind\":\"document_to_pdf\""), "got: {json}");
        assert_eq!(out.download_name(), "report_1a2b3c4d.pdf");
    }
}
