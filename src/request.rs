//! Request model: file classes, conversion kinds, and per-kind options.
//!
//! Validation lives here rather than in the operations so that a request is
//! either rejected before any file I/O happens or is known to be well-formed
//! by the time it reaches [`crate::convert::Converter`].

use crate::error::DocConvError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The family an uploaded file belongs to, decided by its extension.
///
/// Every accepted extension belongs to exactly one class; matching is
/// case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileClass {
    Pdf,
    Word,
    Image,
}

impl FileClass {
    pub const ALL: [FileClass; 3] = [FileClass::Pdf, FileClass::Word, FileClass::Image];

    /// Extensions accepted for this class, lower-case, without the dot.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FileClass::Pdf => &["pdf"],
            FileClass::Word => &["docx", "doc"],
            FileClass::Image => &["jpg", "jpeg", "png"],
        }
    }

    /// Classify a filename by its final extension.
    pub fn of(name: impl AsRef<Path>) -> Option<FileClass> {
        let ext = name.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        FileClass::ALL
            .into_iter()
            .find(|class| class.extensions().contains(&ext.as_str()))
    }

    pub fn accepts(self, name: impl AsRef<Path>) -> bool {
        FileClass::of(name) == Some(self)
    }

    fn reject(self, name: &Path) -> DocConvError {
        DocConvError::UnsupportedFileType {
            name: name.display().to_string(),
            expected: self,
            accepted: self.extensions().join(", "),
        }
    }
}

impl fmt::Display for FileClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileClass::Pdf => "PDF",
            FileClass::Word => "Word",
            FileClass::Image => "JPG/JPEG/PNG",
        })
    }
}

/// The fixed set of supported source → target transformations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionKind {
    DocumentToPdf,
    PdfToDocument,
    PdfToImages,
    ImageToPdf,
    CompressPdf,
    MergePdfs,
    SplitPdf,
    EncryptPdf,
}

impl ConversionKind {
    pub const ALL: [ConversionKind; 8] = [
        ConversionKind::DocumentToPdf,
        ConversionKind::PdfToDocument,
        ConversionKind::PdfToImages,
        ConversionKind::ImageToPdf,
        ConversionKind::CompressPdf,
        ConversionKind::MergePdfs,
        ConversionKind::SplitPdf,
        ConversionKind::EncryptPdf,
    ];

    /// The class every input of this kind must belong to.
    pub fn input_class(self) -> FileClass {
        match self {
            ConversionKind::DocumentToPdf => FileClass::Word,
            ConversionKind::ImageToPdf => FileClass::Image,
            _ => FileClass::Pdf,
        }
    }

    /// Whether the kind takes an ordered list rather than a single file.
    pub fn is_multi_input(self) -> bool {
        matches!(self, ConversionKind::MergePdfs)
    }
}

impl fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConversionKind::DocumentToPdf => "Word to PDF",
            ConversionKind::PdfToDocument => "PDF to Word",
            ConversionKind::PdfToImages => "PDF to image",
            ConversionKind::ImageToPdf => "Image to PDF",
            ConversionKind::CompressPdf => "PDF compression",
            ConversionKind::MergePdfs => "PDF merge",
            ConversionKind::SplitPdf => "PDF split",
            ConversionKind::EncryptPdf => "PDF encryption",
        })
    }
}

/// Kind-specific options. Only `password` is meaningful today and only for
/// [`ConversionKind::EncryptPdf`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub password: Option<String>,
}

impl ConversionOptions {
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
        }
    }
}

/// One or more input files in the incoming area plus a target kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub kind: ConversionKind,
    pub inputs: Vec<PathBuf>,
    pub options: ConversionOptions,
}

impl ConversionRequest {
    pub fn new(kind: ConversionKind, inputs: Vec<PathBuf>) -> Self {
        Self {
            kind,
            inputs,
            options: ConversionOptions::default(),
        }
    }

    pub fn single(kind: ConversionKind, input: impl Into<PathBuf>) -> Self {
        Self::new(kind, vec![input.into()])
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    /// Check the request without touching the filesystem.
    ///
    /// Returns the inputs the operation will actually consume. For a merge,
    /// entries of the wrong class are dropped rather than failing the whole
    /// request; the dropped paths are returned separately so the caller can
    /// still clean them up.
    pub fn validate(&self) -> Result<ValidatedInputs, DocConvError> {
        if self.kind == ConversionKind::EncryptPdf
            && self.options.password.as_deref().map_or(true, str::is_empty)
        {
            return Err(DocConvError::MissingPassword);
        }

        if self.inputs.is_empty() {
            return Err(DocConvError::NoInput);
        }

        let class = self.kind.input_class();

        if self.kind.is_multi_input() {
            let (accepted, skipped): (Vec<_>, Vec<_>) =
                self.inputs.iter().cloned().partition(|p| class.accepts(p));
            if accepted.is_empty() {
                return Err(DocConvError::NoInput);
            }
            return Ok(ValidatedInputs { accepted, skipped });
        }

        if self.inputs.len() > 1 {
            return Err(DocConvError::TooManyInputs {
                kind: self.kind,
                got: self.inputs.len(),
            });
        }

        let input = &self.inputs[0];
        if !class.accepts(input) {
            return Err(class.reject(input));
        }

        Ok(ValidatedInputs {
            accepted: vec![input.clone()],
            skipped: Vec::new(),
        })
    }
}

/// Output of [`ConversionRequest::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedInputs {
    pub accepted: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}
