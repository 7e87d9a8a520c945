//! CLI binary for edgequake-docconv.
//!
//! A thin shim over the library crate: it validates the request, copies the
//! inputs into the transient store, runs the conversion and moves the
//! artifact to `--output` if one was given.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgequake_docconv::{
    ConversionKind, ConversionOptions, ConversionOutput, ConversionRequest, Converter,
    ConverterConfig, DocConvError, ErrorClass, PageSize,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Word to PDF (LibreOffice if installed, text-only otherwise)
  docconv word-to-pdf report.docx -o report.pdf

  # Merge in the given order; non-PDF arguments are skipped
  docconv merge cover.pdf body.pdf appendix.pdf -o book.pdf

  # One JPEG per page at 300 DPI
  docconv --dpi 300 pdf-to-images slides.pdf -o slides.zip

  # Password-protect
  DOCCONV_PASSWORD=s3cret docconv encrypt contract.pdf -o locked.pdf

  # Remove stale files from the store right now
  docconv --store /var/lib/docconv sweep

EXIT CODES:
  0  success (check stderr for a reduced-fidelity notice)
  1  conversion or storage failure
  2  invalid request (wrong file type, missing password, file too large)

ENVIRONMENT VARIABLES:
  DOCCONV_STORE           Store root holding uploads/ and temp/ (default .docconv)
  DOCCONV_OFFICE          Office suite executable (skips the PATH lookup)
  DOCCONV_PASSWORD        Password for `encrypt`
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Log filter, overrides -v / -q
"#;

/// Store root used when neither --store nor DOCCONV_STORE is given.
const DEFAULT_STORE: &str = ".docconv";

/// Convert Word, PDF and image files between formats.
#[derive(Parser, Debug)]
#[command(
    name = "docconv",
    version,
    about = "Convert Word, PDF and image files between formats",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Store root; inputs are copied to <STORE>/uploads, outputs land in <STORE>/temp.
    #[arg(long, global = true, env = "DOCCONV_STORE", default_value = DEFAULT_STORE)]
    store: PathBuf,

    /// Write the artifact here instead of leaving it in the store.
    #[arg(short, long, global = true, env = "DOCCONV_OUTPUT")]
    output: Option<PathBuf>,

    /// Keep the artifact in the store after copying it to --output.
    #[arg(long, global = true, env = "DOCCONV_KEEP")]
    keep: bool,

    /// Office suite executable.
    #[arg(long, global = true, env = "DOCCONV_OFFICE")]
    office: Option<PathBuf>,

    /// Office suite timeout in seconds.
    #[arg(long, global = true, env = "DOCCONV_OFFICE_TIMEOUT", default_value_t = 120)]
    office_timeout: u64,

    /// Rasterisation DPI for pdf-to-images (72–600).
    #[arg(long, global = true, env = "DOCCONV_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// JPEG quality for pdf-to-images (1–100).
    #[arg(long, global = true, env = "DOCCONV_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Page size for the text-only Word → PDF fallback.
    #[arg(long, global = true, env = "DOCCONV_PAGE_SIZE", value_enum, default_value = "letter")]
    page_size: PageSizeArg,

    /// Age in seconds after which store files are reclaimed.
    #[arg(long, global = true, env = "DOCCONV_RETENTION_SECS", default_value_t = 3600)]
    retention: u64,

    /// Probability that a conversion also sweeps the store (0–1).
    #[arg(long, global = true, env = "DOCCONV_RECLAIM_PROBABILITY", default_value_t = 0.025)]
    reclaim_probability: f64,

    /// Print the result as JSON.
    #[arg(long, global = true, env = "DOCCONV_JSON")]
    json: bool,

    /// Disable the spinner.
    #[arg(long, global = true, env = "DOCCONV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCCONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCCONV_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Word (.docx/.doc) → PDF.
    WordToPdf { input: PathBuf },
    /// PDF → Word (.docx), text only.
    PdfToWord { input: PathBuf },
    /// PDF → zip of page_<n>.jpg.
    PdfToImages { input: PathBuf },
    /// JPG/PNG → single-page PDF.
    ImageToPdf { input: PathBuf },
    /// Lossless PDF compression.
    Compress { input: PathBuf },
    /// Concatenate PDFs in argument order.
    Merge {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// PDF → zip of page_<n>.pdf.
    Split { input: PathBuf },
    /// Password-protect a PDF.
    Encrypt {
        input: PathBuf,
        /// Password required to open the output.
        #[arg(long, env = "DOCCONV_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Delete store files older than the retention window.
    Sweep,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PageSizeArg {
    Letter,
    A4,
}

impl From<PageSizeArg> for PageSize {
    fn from(v: PageSizeArg) -> Self {
        match v {
            PageSizeArg::Letter => PageSize::Letter,
            PageSizeArg::A4 => PageSize::A4,
        }
    }
}

impl Command {
    /// The request this command describes, against the caller's own paths.
    fn request(&self) -> Option<ConversionRequest> {
        let (kind, inputs) = match self {
            Command::WordToPdf { input } => (ConversionKind::DocumentToPdf, vec![input.clone()]),
            Command::PdfToWord { input } => (ConversionKind::PdfToDocument, vec![input.clone()]),
            Command::PdfToImages { input } => (ConversionKind::PdfToImages, vec![input.clone()]),
            Command::ImageToPdf { input } => (ConversionKind::ImageToPdf, vec![input.clone()]),
            Command::Compress { input } => (ConversionKind::CompressPdf, vec![input.clone()]),
            Command::Merge { inputs } => (ConversionKind::MergePdfs, inputs.clone()),
            Command::Split { input } => (ConversionKind::SplitPdf, vec![input.clone()]),
            Command::Encrypt { input, password } => {
                let request = ConversionRequest::single(ConversionKind::EncryptPdf, input.clone())
                    .with_options(ConversionOptions {
                        password: password.clone(),
                    });
                return Some(request);
            }
            Command::Sweep => return None,
        };
        Some(ConversionRequest::new(kind, inputs))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep INFO logs out
    // of its way unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli, show_progress).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", red("✘"), e);
            let validation = e
                .downcast_ref::<DocConvError>()
                .is_some_and(|d| d.class() == ErrorClass::Validation);
            ExitCode::from(if validation { 2 } else { 1 })
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    let converter = Converter::new(build_config(cli)?)?;

    let Some(request) = cli.command.request() else {
        return sweep(cli, &converter).await;
    };

    // Reject bad requests before anything is copied.
    let validated = request.validate()?;
    for skipped in &validated.skipped {
        if !cli.quiet {
            eprintln!("{} skipping {}", yellow("⚠"), skipped.display());
        }
    }

    let store = converter.store();
    let mut admitted = Vec::with_capacity(validated.accepted.len());
    for path in &validated.accepted {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match store.admit_file(&name, path).await {
            Ok(file) => admitted.push(file.path),
            Err(e) => {
                store.discard_all(&admitted);
                return Err(e.into());
            }
        }
    }

    let spinner = show_progress.then(|| spinner(request.kind));
    let stored_request = ConversionRequest {
        inputs: admitted.clone(),
        ..request
    };
    let result = converter.convert(&stored_request).await;
    if let Some(bar) = &spinner {
        bar.finish_and_clear();
    }

    let mut output = match result {
        Ok(output) => output,
        Err(e) => {
            store.discard_all(&admitted);
            return Err(e.into());
        }
    };
    // Report the caller's own paths, not the store copies.
    output.skipped_inputs = validated.skipped;

    if let Some(dest) = &cli.output {
        deliver(&output.artifact, dest, cli.keep).await?;
        output.artifact = dest.clone();
    }

    report(cli, &output)
}

async fn sweep(cli: &Cli, converter: &Converter) -> Result<()> {
    let reclaimer = converter.reclaimer().clone();
    let report = tokio::task::spawn_blocking(move || reclaimer.sweep())
        .await
        .context("Sweep task panicked")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{} removed {} of {} files  {}",
            if report.errors == 0 {
                green("✔")
            } else {
                yellow("⚠")
            },
            bold(&report.removed.to_string()),
            report.scanned,
            dim(&format!(
                "({} already gone, {} errors)",
                report.already_gone, report.errors
            )),
        );
    }
    Ok(())
}

/// Move (or copy, with `keep`) the artifact to `dest`.
async fn deliver(artifact: &Path, dest: &Path, keep: bool) -> Result<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::copy(artifact, dest)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    if !keep {
        tokio::fs::remove_file(artifact)
            .await
            .with_context(|| format!("Failed to remove {}", artifact.display()))?;
    }
    Ok(())
}

fn report(cli: &Cli, output: &ConversionOutput) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(output).context("Failed to serialise output")?
        );
        return Ok(());
    }

    // The path is the result; print it even in quiet mode.
    println!("{}", output.artifact.display());

    if let Some(notice) = output.fidelity.notice() {
        eprintln!("{} {}", yellow("⚠"), notice);
    }
    if !cli.quiet {
        let entries = output
            .entries
            .map(|n| format!(", {n} entries"))
            .unwrap_or_default();
        eprintln!(
            "{}  {}  {}",
            green("✔"),
            output.kind,
            dim(&format!(
                "{} bytes{}  {}ms",
                output.bytes, entries, output.duration_ms
            )),
        );
    }
    Ok(())
}

fn spinner(kind: ConversionKind) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Converting");
    bar.set_message(kind.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Map CLI args to `ConverterConfig`.
fn build_config(cli: &Cli) -> Result<ConverterConfig> {
    let mut builder = ConverterConfig::builder()
        .store_root(&cli.store)
        .retention_secs(cli.retention)
        .reclaim_probability(cli.reclaim_probability)
        .office_timeout_secs(cli.office_timeout)
        .raster_dpi(cli.dpi)
        .jpeg_quality(cli.quality)
        .fallback_page(cli.page_size.into());
    if let Some(office) = &cli.office {
        builder = builder.office_program(office);
    }
    builder.build().context("Invalid configuration")
}
