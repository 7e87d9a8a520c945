//! Error types for the edgequake-docconv library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DocConvError`] is **fatal**: the request cannot be served (bad
//!   extension, missing password, corrupt input, disk full). Returned as
//!   `Err(DocConvError)` from [`crate::convert::Converter::convert`] and from
//!   every individual operation.
//!
//! * [`ToolError`] is **non-fatal**: the external office suite is missing,
//!   crashed, timed out, or did not write the expected file. The strategy
//!   selector swallows it and runs the in-process fallback instead, so it is
//!   never returned from `convert`; it only shows up in logs and in
//!   [`crate::strategy::PrimaryOutcome`].
//!
//! Fatal errors are further grouped into an [`ErrorClass`] so any transport
//! (HTTP, CLI, queue worker) can map them onto its own status vocabulary
//! without matching every variant.

use crate::request::{ConversionKind, FileClass};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the edgequake-docconv library.
///
/// External-tool failures use [`ToolError`] and are recovered by the
/// strategy selector rather than propagated here.
#[derive(Debug, Error)]
pub enum DocConvError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// The request carried no usable input file.
    #[error("No file selected")]
    NoInput,

    /// The file's extension does not belong to the class the kind requires.
    #[error("'{name}' is not a {expected} file (accepted: {accepted})")]
    UnsupportedFileType {
        name: String,
        expected: FileClass,
        accepted: String,
    },

    /// Encryption was requested without a password.
    #[error("Password is required.")]
    MissingPassword,

    /// The upload exceeds the configured size cap.
    #[error("File too large! Maximum file size is {limit} bytes (got {size}).")]
    UploadTooLarge { size: u64, limit: u64 },

    /// A single-input kind was handed several files.
    #[error("{kind} takes exactly one input, got {got}")]
    TooManyInputs { kind: ConversionKind, got: usize },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Conversion errors ─────────────────────────────────────────────────
    /// Input header/trailer/structure is corrupt and cannot be parsed.
    #[error("Input '{path}' is unreadable or corrupt: {detail}")]
    CorruptInput { path: PathBuf, detail: String },

    /// Input is password-protected; the operation would need to decrypt it.
    #[error("Input '{path}' is encrypted. Only standard, unprotected PDFs are supported.")]
    EncryptedInput { path: PathBuf },

    /// Input is readable but its format variant is not handled.
    #[error("Input '{path}' is not supported: {reason}")]
    UnsupportedInput { path: PathBuf, reason: String },

    /// A conversion step failed for a reason other than the input itself.
    #[error("{kind} conversion failed: {detail}")]
    Conversion {
        kind: ConversionKind,
        detail: String,
    },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    Rasterisation { page: usize, detail: String },

    /// A required in-process engine could not be loaded.
    #[error(
        "The {engine} engine is unavailable: {detail}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library in the working directory."
    )]
    EngineUnavailable { engine: String, detail: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Could not create, write, move or delete a file in the transient store.
    #[error("Storage failure at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse grouping of [`DocConvError`] for transport-level status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The request itself was wrong; no work was attempted.
    Validation,
    /// The input could not be converted.
    Conversion,
    /// The transient store failed.
    Storage,
}

impl DocConvError {
    /// Shorthand for wrapping an I/O failure at `path`.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocConvError::Storage {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for a kind-scoped conversion failure.
    pub fn conversion(kind: ConversionKind, detail: impl Into<String>) -> Self {
        DocConvError::Conversion {
            kind,
            detail: detail.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            DocConvError::NoInput
            | DocConvError::UnsupportedFileType { .. }
            | DocConvError::MissingPassword
            | DocConvError::UploadTooLarge { .. }
            | DocConvError::TooManyInputs { .. }
            | DocConvError::InvalidConfig(_) => ErrorClass::Validation,
            DocConvError::Storage { .. } => ErrorClass::Storage,
            DocConvError::CorruptInput { .. }
            | DocConvError::EncryptedInput { .. }
            | DocConvError::UnsupportedInput { .. }
            | DocConvError::Conversion { .. }
            | DocConvError::Rasterisation { .. }
            | DocConvError::EngineUnavailable { .. }
            | DocConvError::Internal(_) => ErrorClass::Conversion,
        }
    }

    /// HTTP-equivalent status: 400 for validation, 500 for everything else
    /// (413 for oversized uploads, matching the usual proxy behaviour).
    pub fn status_code(&self) -> u16 {
        match self {
            DocConvError::UploadTooLarge { .. } => 413,
            e if e.class() == ErrorClass::Validation => 400,
            _ => 500,
        }
    }
}

/// A non-fatal failure of the external office suite.
///
/// Produced by [`crate::pipeline::office`] and consumed by the strategy
/// selector, which always answers it with the in-process fallback.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ToolError {
    /// No candidate program was found on `PATH`.
    #[error("no office suite found (looked for {searched})")]
    Unavailable { searched: String },

    /// The program exists but could not be started.
    #[error("failed to start '{program}': {detail}")]
    Spawn { program: String, detail: String },

    /// The program ran but exited unsuccessfully.
    #[error("'{program}' exited with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: String,
        stderr: String,
    },

    /// The program did not finish within the configured timeout.
    #[error("'{program}' timed out after {}s", .after.as_secs())]
    TimedOut { program: String, after: Duration },

    /// The program exited cleanly but the `<stem>.pdf` it should have
    /// written is not there.
    #[error("'{program}' did not produce {expected:?}")]
    MissingOutput { program: String, expected: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_400() {
        assert_eq!(DocConvError::MissingPassword.status_code(), 400);
        assert_eq!(DocConvError::NoInput.status_code(), 400);
        let e = DocConvError::UnsupportedFileType {
            name: "notes.txt".into(),
            expected: FileClass::Pdf,
            accepted: "pdf".into(),
        };
        assert_eq!(e.class(), ErrorClass::Validation);
        assert_eq!(e.status_code(), 400);
        assert!(e.to_string().contains("notes.txt"));

        let e = DocConvError::TooManyInputs {
            kind: ConversionKind::SplitPdf,
            got: 2,
        };
        assert_eq!(e.class(), ErrorClass::Validation);
        assert_eq!(e.status_code(), 400);
    }

    #[test]
    fn conversion_and_storage_errors_map_to_500() {
        let e = DocConvError::CorruptInput {
            path: "a.pdf".into(),
            detail: "bad xref".into(),
        };
        assert_eq!(e.class(), ErrorClass::Conversion);
        assert_eq!(e.status_code(), 500);

        let e = DocConvError::storage(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert_eq!(e.class(), ErrorClass::Storage);
        assert_eq!(e.status_code(), 500);
        assert!(e.to_string().contains("disk full"));
    }

    #[test]
    fn oversized_upload_is_413() {
        let e = DocConvError::UploadTooLarge {
            size: 20,
            limit: 10,
        };
        assert_eq!(e.status_code(), 413);
        assert_eq!(e.class(), ErrorClass::Validation);
    }

    #[test]
    fn tool_timeout_display() {
        let e = ToolError::TimedOut {
            program: "soffice".into(),
            after: Duration::from_secs(120),
        };
        let msg = e.to_string();
        assert!(msg.contains("soffice"), "got: {msg}");
        assert!(msg.contains("120s"), "got: {msg}");
    }
}
