//! Conversion operations and the request entry point.
//!
//! Every operation reads its inputs, writes exactly one artifact into the
//! working area through [`TransientStore::stage_output`] and returns an
//! [`Artifact`]. A failed operation leaves nothing behind: staged files and
//! scratch directories are removed when their guards drop.
//!
//! [`Converter::convert`] is the request handler on top: it validates,
//! occasionally runs a reclamation sweep, dispatches to the operation and,
//! on success, removes the consumed inputs from the incoming area.

use crate::config::ConverterConfig;
use crate::error::DocConvError;
use crate::naming::unique_suffix;
use crate::output::{ArtifactKind, ConversionOutput, Fidelity};
use crate::pipeline::archive::{numbered, ArchiveBuilder};
use crate::pipeline::layout::TextLayout;
use crate::pipeline::{docx, pdf, raster, render};
use crate::reclaim::Reclaimer;
use crate::request::{ConversionKind, ConversionRequest};
use crate::store::{file_stem, TransientStore};
use crate::strategy::{ExternalConverter, StrategySelector};
use lopdf::Document;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// One artifact written into the working area.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub fidelity: Fidelity,
    /// Entry count for archives.
    pub entries: Option<usize>,
}

impl Artifact {
    fn file(path: PathBuf, kind: ArtifactKind) -> Self {
        Self {
            path,
            kind,
            fidelity: Fidelity::Full,
            entries: None,
        }
    }

    fn archive(path: PathBuf, entries: usize) -> Self {
        Self {
            path,
            kind: ArtifactKind::Zip,
            fidelity: Fidelity::Full,
            entries: Some(entries),
        }
    }
}

// ── Operations ───────────────────────────────────────────────────────────

/// Word document → PDF. Tries the external converter first and falls back
/// to a text-only layout; the returned fidelity says which path won.
pub async fn document_to_pdf(
    selector: &StrategySelector,
    store: &TransientStore,
    config: &ConverterConfig,
    input: &Path,
) -> Result<Artifact, DocConvError> {
    let fallback_store = store.clone();
    let source = input.to_path_buf();
    let layout = TextLayout::from_config(config);

    let (path, fidelity) = selector
        .document_to_pdf(input, store, move |target| {
            let paragraphs = docx::read_paragraphs(&source)?;
            debug!("Fallback layout of {} paragraphs", paragraphs.len());
            let mut doc = layout.render(&paragraphs)?;
            let name = target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| DocConvError::Internal("fallback target has no file name".into()))?;
            write_pdf(
                &fallback_store,
                ConversionKind::DocumentToPdf,
                &name,
                &mut doc,
                false,
            )
        })
        .await?;

    Ok(Artifact {
        path,
        kind: ArtifactKind::Pdf,
        fidelity,
        entries: None,
    })
}

/// PDF → Word document, one paragraph per page that has text.
pub fn pdf_to_document(store: &TransientStore, input: &Path) -> Result<Artifact, DocConvError> {
    let doc = pdf::load(input)?;
    let paragraphs: Vec<String> = pdf::page_texts(&doc)
        .into_iter()
        .filter(|text| !text.is_empty())
        .collect();
    debug!(
        "{} of {} pages carry text",
        paragraphs.len(),
        doc.get_pages().len()
    );

    let mut staged = store.stage_output(&format!("{}.docx", file_stem(input)))?;
    let staged_path = staged.path().to_path_buf();
    docx::write_paragraphs(&paragraphs, staged.file_mut())
        .map_err(|e| archive_failed(ConversionKind::PdfToDocument, &staged_path, e))?;
    Ok(Artifact::file(staged.commit()?, ArtifactKind::Docx))
}

/// PDF → zip of `page_<n>.jpg`, rendered at the configured DPI.
pub fn pdf_to_images(
    store: &TransientStore,
    config: &ConverterConfig,
    input: &Path,
) -> Result<Artifact, DocConvError> {
    // Refuse password-protected input with the same error as other kinds.
    pdf::load(input)?;

    let mut staged = store.stage_output(&format!("{}_images.zip", file_stem(input)))?;
    let staged_path = staged.path().to_path_buf();
    let entries = {
        let mut zip = ArchiveBuilder::stored(staged.file_mut());
        render::render_each_page_blocking(
            input,
            config.raster_dpi,
            config.max_render_edge,
            |page, image| {
                let jpeg = raster::encode_jpeg(&image, config.jpeg_quality).map_err(|e| {
                    DocConvError::Rasterisation {
                        page,
                        detail: format!("JPEG encoding failed: {}", e),
                    }
                })?;
                zip.add(&numbered(page, "jpg"), &jpeg)
                    .map_err(|e| archive_failed(ConversionKind::PdfToImages, &staged_path, e))
            },
        )?;
        let entries = zip.entries();
        zip.finish()
            .map_err(|e| archive_failed(ConversionKind::PdfToImages, &staged_path, e))?;
        entries
    };
    Ok(Artifact::archive(staged.commit()?, entries))
}

/// Single image → one-page PDF sized to the image at the configured DPI.
pub fn image_to_pdf(
    store: &TransientStore,
    config: &ConverterConfig,
    input: &Path,
) -> Result<Artifact, DocConvError> {
    let mut doc = raster::image_to_pdf_document(input, config.image_pdf_dpi)?;
    let path = write_pdf(
        store,
        ConversionKind::ImageToPdf,
        &format!("{}.pdf", file_stem(input)),
        &mut doc,
        false,
    )?;
    Ok(Artifact::file(path, ArtifactKind::Pdf))
}

/// Lossless structural compression.
pub fn compress_pdf(store: &TransientStore, input: &Path) -> Result<Artifact, DocConvError> {
    let mut doc = pdf::load(input)?;
    let report = pdf::optimize(&mut doc);
    debug!(
        "Optimised {}: {} empty streams, {} duplicate streams, {} unreferenced objects",
        input.display(),
        report.empty_streams,
        report.duplicates,
        report.unreferenced
    );
    let path = write_pdf(
        store,
        ConversionKind::CompressPdf,
        &format!("{}_compressed.pdf", file_stem(input)),
        &mut doc,
        true,
    )?;
    Ok(Artifact::file(path, ArtifactKind::Pdf))
}

/// Concatenate PDFs in the given order.
pub fn merge_pdfs(store: &TransientStore, inputs: &[PathBuf]) -> Result<Artifact, DocConvError> {
    if inputs.is_empty() {
        return Err(DocConvError::NoInput);
    }
    let docs = inputs
        .iter()
        .map(|p| pdf::load(p))
        .collect::<Result<Vec<_>, _>>()?;
    let mut merged = pdf::merge(docs)
        .map_err(|e| DocConvError::conversion(ConversionKind::MergePdfs, e.to_string()))?;
    debug!(
        "Merged {} documents into {} pages",
        inputs.len(),
        merged.get_pages().len()
    );
    let path = write_pdf(
        store,
        ConversionKind::MergePdfs,
        &format!("merged_{}.pdf", unique_suffix()),
        &mut merged,
        false,
    )?;
    Ok(Artifact::file(path, ArtifactKind::Pdf))
}

/// Split into a zip of single-page PDFs named `page_<n>.pdf`.
pub fn split_pdf(store: &TransientStore, input: &Path) -> Result<Artifact, DocConvError> {
    let doc = pdf::load(input)?;
    let page_numbers: Vec<u32> = doc.get_pages().into_keys().collect();

    let mut staged = store.stage_output(&format!("{}_split.zip", file_stem(input)))?;
    let staged_path = staged.path().to_path_buf();
    let entries = {
        let mut zip = ArchiveBuilder::new(staged.file_mut());
        for (idx, &n) in page_numbers.iter().enumerate() {
            let mut page = pdf::extract_page(&doc, n)
                .map_err(|e| DocConvError::conversion(ConversionKind::SplitPdf, e.to_string()))?;
            let bytes = pdf::to_bytes(&mut page)
                .map_err(|e| save_failed(ConversionKind::SplitPdf, &staged_path, e))?;
            zip.add(&numbered(idx + 1, "pdf"), &bytes)
                .map_err(|e| archive_failed(ConversionKind::SplitPdf, &staged_path, e))?;
        }
        let entries = zip.entries();
        zip.finish()
            .map_err(|e| archive_failed(ConversionKind::SplitPdf, &staged_path, e))?;
        entries
    };
    Ok(Artifact::archive(staged.commit()?, entries))
}

/// Password-protect a PDF.
pub fn encrypt_pdf(
    store: &TransientStore,
    input: &Path,
    password: &str,
) -> Result<Artifact, DocConvError> {
    if password.is_empty() {
        return Err(DocConvError::MissingPassword);
    }
    let mut doc = pdf::load(input)?;
    pdf::encrypt(&mut doc, password)
        .map_err(|e| DocConvError::conversion(ConversionKind::EncryptPdf, e.to_string()))?;
    let path = write_pdf(
        store,
        ConversionKind::EncryptPdf,
        &format!("{}_encrypted.pdf", file_stem(input)),
        &mut doc,
        false,
    )?;
    Ok(Artifact::file(path, ArtifactKind::Pdf))
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn write_pdf(
    store: &TransientStore,
    kind: ConversionKind,
    final_name: &str,
    doc: &mut Document,
    compact: bool,
) -> Result<PathBuf, DocConvError> {
    let mut staged = store.stage_output(final_name)?;
    let staged_path = staged.path().to_path_buf();
    {
        let mut writer = BufWriter::new(staged.file_mut());
        let saved = if compact {
            pdf::save_compact(doc, &mut writer)
        } else {
            doc.save_to(&mut writer).map_err(lopdf::Error::from)
        };
        saved.map_err(|e| save_failed(kind, &staged_path, e))?;
        writer
            .flush()
            .map_err(|e| DocConvError::storage(&staged_path, e))?;
    }
    staged.commit()
}

fn save_failed(kind: ConversionKind, path: &Path, e: lopdf::Error) -> DocConvError {
    match e {
        lopdf::Error::IO(source) => DocConvError::storage(path, source),
        other => DocConvError::conversion(kind, other.to_string()),
    }
}

fn archive_failed(kind: ConversionKind, path: &Path, e: zip::result::ZipError) -> DocConvError {
    match e {
        zip::result::ZipError::Io(source) => DocConvError::storage(path, source),
        other => DocConvError::conversion(kind, other.to_string()),
    }
}

async fn blocking<T, F>(f: F) -> Result<T, DocConvError>
where
    F: FnOnce() -> Result<T, DocConvError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DocConvError::Internal(format!("Conversion task panicked: {}", e)))?
}

// ── Request handler ──────────────────────────────────────────────────────

/// Entry point for callers: owns the store handle, the reclaimer and the
/// strategy selector. Cheap to clone and safe to share across tasks.
#[derive(Debug, Clone)]
pub struct Converter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ConverterConfig,
    store: TransientStore,
    reclaimer: Reclaimer,
    selector: StrategySelector,
}

impl Converter {
    /// Open the store and use the configured office suite for
    /// document → PDF.
    pub fn new(config: ConverterConfig) -> Result<Self, DocConvError> {
        let selector = StrategySelector::office(&config);
        Self::with_selector(config, selector)
    }

    /// Like [`Converter::new`] with a caller-supplied external converter.
    pub fn with_external(
        config: ConverterConfig,
        external: Arc<dyn ExternalConverter>,
    ) -> Result<Self, DocConvError> {
        Self::with_selector(config, StrategySelector::new(external))
    }

    fn with_selector(
        config: ConverterConfig,
        selector: StrategySelector,
    ) -> Result<Self, DocConvError> {
        let store = TransientStore::open(&config)?;
        let reclaimer = Reclaimer::new(&store, &config);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                reclaimer,
                selector,
            }),
        })
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &TransientStore {
        &self.inner.store
    }

    pub fn reclaimer(&self) -> &Reclaimer {
        &self.inner.reclaimer
    }

    /// Run one request.
    ///
    /// Validation happens before any file is touched. On success every input
    /// that lives in the incoming area, including merge entries that were
    /// skipped for their type, has been deleted; the artifact stays in the
    /// working area for the caller. On failure the inputs are left for the
    /// caller to retry or for the reclamation sweep.
    pub async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionOutput, DocConvError> {
        let start = Instant::now();
        let inputs = request.validate()?;
        let kind = request.kind;
        info!("Starting {} ({} inputs)", kind, inputs.accepted.len());
        for skipped in &inputs.skipped {
            info!("Skipping {}: not a {} file", skipped.display(), kind.input_class());
        }

        let reclaimer = self.inner.reclaimer.clone();
        if let Some(report) = blocking(move || Ok(reclaimer.maybe_reclaim())).await? {
            debug!("Request-triggered sweep scanned {} files", report.scanned);
        }

        let first = inputs.accepted.first().cloned().ok_or(DocConvError::NoInput)?;
        let store = self.inner.store.clone();
        let config = self.inner.config.clone();

        let artifact = match kind {
            ConversionKind::DocumentToPdf => {
                document_to_pdf(&self.inner.selector, &store, &config, &first).await?
            }
            ConversionKind::PdfToDocument => {
                blocking(move || pdf_to_document(&store, &first)).await?
            }
            ConversionKind::PdfToImages => {
                blocking(move || pdf_to_images(&store, &config, &first)).await?
            }
            ConversionKind::ImageToPdf => {
                blocking(move || image_to_pdf(&store, &config, &first)).await?
            }
            ConversionKind::CompressPdf => blocking(move || compress_pdf(&store, &first)).await?,
            ConversionKind::MergePdfs => {
                let accepted = inputs.accepted.clone();
                blocking(move || merge_pdfs(&store, &accepted)).await?
            }
            ConversionKind::SplitPdf => blocking(move || split_pdf(&store, &first)).await?,
            ConversionKind::EncryptPdf => {
                let password = request.options.password.clone().unwrap_or_default();
                blocking(move || encrypt_pdf(&store, &first, &password)).await?
            }
        };

        let owned: Vec<PathBuf> = inputs
            .accepted
            .iter()
            .chain(&inputs.skipped)
            .filter(|p| self.inner.store.is_incoming(p))
            .cloned()
            .collect();
        self.inner.store.discard_all(&owned);

        let bytes = tokio::fs::metadata(&artifact.path)
            .await
            .map_err(|e| DocConvError::storage(&artifact.path, e))?
            .len();
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "{} complete: {} ({} bytes, {}, {}ms)",
            kind,
            artifact.path.display(),
            bytes,
            if artifact.fidelity.is_degraded() {
                "degraded"
            } else {
                "full fidelity"
            },
            duration_ms
        );

        Ok(ConversionOutput {
            kind,
            artifact: artifact.path,
            artifact_kind: artifact.kind,
            fidelity: artifact.fidelity,
            bytes,
            entries: artifact.entries,
            skipped_inputs: inputs.skipped,
            duration_ms,
        })
    }

    /// Synchronous wrapper around [`Converter::convert`] for callers without
    /// a runtime.
    pub fn convert_blocking(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionOutput, DocConvError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| DocConvError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.convert(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::archive::entry_names;
    use crate::pipeline::pdf::fixtures::labelled;
    use crate::request::ConversionOptions;
    use std::fs::File;
    use tempfile::TempDir;

    fn setup(root: &TempDir) -> (TransientStore, ConverterConfig) {
        let config = ConverterConfig::builder()
            .store_root(root.path())
            .reclaim_probability(0.0)
            .build()
            .unwrap();
        (TransientStore::open(&config).unwrap(), config)
    }

    fn write_fixture(store: &TransientStore, name: &str, labels: &[&str]) -> PathBuf {
        let path = store.incoming_path(name);
        let mut doc = labelled(labels);
        doc.save(&path).unwrap();
        path
    }

    fn working_entries(store: &TransientStore) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(store.working_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn pdf_to_document_skips_textless_pages() {
        let root = TempDir::new().unwrap();
        let (store, _) = setup(&root);
        let input = write_fixture(&store, "doc_aaaaaaaaaaaa.pdf", &["Alpha", "", "Gamma"]);

        let artifact = pdf_to_document(&store, &input).unwrap();
        assert_eq!(artifact.path, store.working_path("doc_aaaaaaaaaaaa.docx"));
        let paragraphs = docx::read_paragraphs(&artifact.path).unwrap();
        assert_eq!(paragraphs.len(), 2, "{paragraphs:?}");
        assert!(paragraphs[0].contains("Alpha"));
        assert!(paragraphs[1].contains("Gamma"));
    }

    #[test]
    fn merge_keeps_submission_order() {
        let root = TempDir::new().unwrap();
        let (store, _) = setup(&root);
        let a = write_fixture(&store, "a.pdf", &["A1", "A2"]);
        let b = write_fixture(&store, "b.pdf", &["B1"]);

        let artifact = merge_pdfs(&store, &[b, a]).unwrap();
        let name = artifact.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("merged_") && name.ends_with(".pdf"), "{name}");
        assert_eq!(name.len(), "merged_".len() + 12 + ".pdf".len());

        let merged = pdf::load(&artifact.path).unwrap();
        let texts = pdf::page_texts(&merged);
        assert_eq!(texts.len(), 3);
        for (text, label) in texts.iter().zip(["B1", "A1", "A2"]) {
            assert!(text.contains(label), "{text:?} should contain {label}");
        }
    }

    #[test]
    fn split_names_follow_page_order() {
        let root = TempDir::new().unwrap();
        let (store, _) = setup(&root);
        let labels: Vec<String> = (1..=11).map(|n| format!("P{n}")).collect();
        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        let input = write_fixture(&store, "long_bbbbbbbbbbbb.pdf", &refs);

        let artifact = split_pdf(&store, &input).unwrap();
        assert_eq!(artifact.entries, Some(11));
        assert_eq!(artifact.path, store.working_path("long_bbbbbbbbbbbb_split.zip"));
        let names = entry_names(File::open(&artifact.path).unwrap()).unwrap();
        let expected: Vec<String> = (1..=11).map(|n| format!("page_{n}.pdf")).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn encrypted_output_needs_password() {
        let root = TempDir::new().unwrap();
        let (store, _) = setup(&root);
        let input = write_fixture(&store, "secret.pdf", &["classified"]);

        let artifact = encrypt_pdf(&store, &input, "hunter2").unwrap();
        assert!(artifact.path.ends_with("secret_encrypted.pdf"));
        assert!(matches!(
            pdf::load(&artifact.path),
            Err(DocConvError::EncryptedInput { .. })
        ));

        let bytes = std::fs::read(&artifact.path).unwrap();
        let reopened = Document::load_mem_with_password(&bytes, "hunter2").unwrap();
        assert_eq!(reopened.get_pages().len(), 1);
    }

    #[test]
    fn encrypt_rejects_empty_password() {
        let root = TempDir::new().unwrap();
        let (store, _) = setup(&root);
        let missing = store.incoming_path("does-not-exist.pdf");
        assert!(matches!(
            encrypt_pdf(&store, &missing, ""),
            Err(DocConvError::MissingPassword)
        ));
    }

    #[test]
    fn compressed_copy_keeps_pages() {
        let root = TempDir::new().unwrap();
        let (store, _) = setup(&root);
        let input = write_fixture(&store, "big.pdf", &["one", "two", "three"]);

        let artifact = compress_pdf(&store, &input).unwrap();
        assert!(artifact.path.ends_with("big_compressed.pdf"));
        let doc = pdf::load(&artifact.path).unwrap();
        let texts = pdf::page_texts(&doc);
        assert_eq!(texts.len(), 3);
        assert!(texts[2].contains("three"), "{texts:?}");
    }

    #[test]
    fn corrupt_input_leaves_no_artifact() {
        let root = TempDir::new().unwrap();
        let (store, _) = setup(&root);
        let input = store.incoming_path("junk.pdf");
        std::fs::write(&input, b"%PDF-1.4 garbage").unwrap();

        assert!(matches!(
            split_pdf(&store, &input),
            Err(DocConvError::CorruptInput { .. })
        ));
        assert!(working_entries(&store).is_empty());
    }

    #[tokio::test]
    async fn convert_removes_inputs_on_success() {
        let root = TempDir::new().unwrap();
        let (store, config) = setup(&root);
        let converter = Converter::new(config).unwrap();
        let a = write_fixture(&store, "x.pdf", &["X"]);
        let note = store.incoming_path("note.txt");
        std::fs::write(&note, b"not a pdf").unwrap();

        let request = ConversionRequest::new(ConversionKind::MergePdfs, vec![a, note.clone()]);
        let output = converter.convert(&request).await.unwrap();
        assert_eq!(output.skipped_inputs, vec![note]);
        assert!(output.bytes > 0);
        assert_eq!(std::fs::read_dir(store.incoming_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn convert_leaves_outside_files_alone() {
        let root = TempDir::new().unwrap();
        let (_, config) = setup(&root);
        let converter = Converter::new(config).unwrap();
        let outside = root.path().join("mine.pdf");
        labelled(&["keep me"]).save(&outside).unwrap();

        let request = ConversionRequest::single(ConversionKind::CompressPdf, &outside);
        converter.convert(&request).await.unwrap();
        assert!(outside.exists());
    }

    #[tokio::test]
    async fn empty_password_fails_validation() {
        let root = TempDir::new().unwrap();
        let (_, config) = setup(&root);
        let converter = Converter::new(config).unwrap();
        let request = ConversionRequest::single(ConversionKind::EncryptPdf, "/nowhere/a.pdf")
            .with_options(ConversionOptions::with_password(""));
        let err = converter.convert(&request).await.unwrap_err();
        assert!(matches!(err, DocConvError::MissingPassword));
        assert_eq!(err.status_code(), 400);
    }
}
