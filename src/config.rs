//! Configuration types for the conversion service.
//!
//! Every path, threshold and engine knob lives in [`ConverterConfig`], built
//! via its [`ConverterConfigBuilder`] and handed to each component at
//! construction. Nothing reads process-wide state after that point, so two
//! converters with different stores can live in the same process (tests rely
//! on this).

use crate::error::DocConvError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`crate::convert::Converter`].
///
/// Built via [`ConverterConfig::builder()`] or using
/// [`ConverterConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_docconv::ConverterConfig;
///
/// let config = ConverterConfig::builder()
///     .incoming_dir("/srv/docconv/uploads")
///     .working_dir("/srv/docconv/temp")
///     .retention_secs(1800)
///     .raster_dpi(150)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Directory holding freshly uploaded files. Default: `./uploads`.
    pub incoming_dir: PathBuf,

    /// Directory holding operation outputs and scratch areas. Default: `./temp`.
    pub working_dir: PathBuf,

    /// Files older than this are reclaimed by a sweep. Default: 3600.
    pub retention_secs: u64,

    /// Probability that a request triggers an inline sweep. Default: 0.025.
    ///
    /// One request in forty. Under zero traffic nothing is swept; under load
    /// sweeps happen roughly in proportion to request volume.
    pub reclaim_probability: f64,

    /// Office-suite executables looked up on `PATH`, in order.
    /// Default: `["libreoffice", "soffice"]`.
    pub office_programs: Vec<String>,

    /// Explicit office-suite executable; skips the `PATH` lookup when set.
    pub office_program: Option<PathBuf>,

    /// Upper bound on one office-suite run, in seconds. Default: 120.
    ///
    /// A timed-out run is killed and treated like any other tool failure:
    /// the request falls back to the text-only path.
    pub office_timeout_secs: u64,

    /// Rasterisation DPI for PDF → image. Range: 72–600. Default: 200.
    pub raster_dpi: u32,

    /// Longest edge, in pixels, of a rasterised page. Pages that would be
    /// larger at `raster_dpi` are scaled down to fit. Range: 1,000–20,000.
    /// Default: 8,000 (a Letter page at 600 DPI is 5,100 × 6,600).
    pub max_render_edge: u32,

    /// JPEG quality for rasterised pages. Range: 1–100. Default: 90.
    pub jpeg_quality: u8,

    /// Resolution recorded for image → PDF pages (pixels per inch). Default: 100.
    pub image_pdf_dpi: f32,

    /// Page size for the text-only fallback. Default: Letter.
    pub fallback_page: PageSize,

    /// Body font size (points) for the text-only fallback. Default: 10.
    pub fallback_font_size: f32,

    /// Maximum accepted upload size in bytes. Default: 16 MiB.
    pub max_upload_bytes: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            incoming_dir: PathBuf::from("uploads"),
            working_dir: PathBuf::from("temp"),
            retention_secs: 3600,
            reclaim_probability: 0.025,
            office_programs: vec!["libreoffice".to_string(), "soffice".to_string()],
            office_program: None,
            office_timeout_secs: 120,
            raster_dpi: 200,
            max_render_edge: 8_000,
            jpeg_quality: 90,
            image_pdf_dpi: 100.0,
            fallback_page: PageSize::default(),
            fallback_font_size: 10.0,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl ConverterConfig {
    /// Create a new builder for `ConverterConfig`.
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn office_timeout(&self) -> Duration {
        Duration::from_secs(self.office_timeout_secs)
    }
}

/// Builder for [`ConverterConfig`].
#[derive(Debug)]
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn incoming_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.incoming_dir = dir.into();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.working_dir = dir.into();
        self
    }

    /// Put both areas under one root as `<root>/uploads` and `<root>/temp`.
    pub fn store_root(self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.incoming_dir(root.join("uploads"))
            .working_dir(root.join("temp"))
    }

    pub fn retention_secs(mut self, secs: u64) -> Self {
        self.config.retention_secs = secs;
        self
    }

    pub fn reclaim_probability(mut self, p: f64) -> Self {
        self.config.reclaim_probability = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        self
    }

    pub fn office_programs<I, S>(mut self, programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.office_programs = programs.into_iter().map(Into::into).collect();
        self
    }

    pub fn office_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.office_program = Some(program.into());
        self
    }

    pub fn office_timeout_secs(mut self, secs: u64) -> Self {
        self.config.office_timeout_secs = secs.max(1);
        self
    }

    pub fn raster_dpi(mut self, dpi: u32) -> Self {
        self.config.raster_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_render_edge(mut self, px: u32) -> Self {
        self.config.max_render_edge = px.clamp(1_000, 20_000);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn image_pdf_dpi(mut self, dpi: f32) -> Self {
        self.config.image_pdf_dpi = dpi;
        self
    }

    pub fn fallback_page(mut self, page: PageSize) -> Self {
        self.config.fallback_page = page;
        self
    }

    pub fn fallback_font_size(mut self, pt: f32) -> Self {
        self.config.fallback_font_size = pt;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, DocConvError> {
        let c = &self.config;
        if c.incoming_dir == c.working_dir {
            return Err(DocConvError::InvalidConfig(format!(
                "incoming and working areas must differ, both are {}",
                c.incoming_dir.display()
            )));
        }
        if !(c.image_pdf_dpi.is_finite() && c.image_pdf_dpi > 0.0) {
            return Err(DocConvError::InvalidConfig(format!(
                "image PDF resolution must be positive, got {}",
                c.image_pdf_dpi
            )));
        }
        if !(4.0..=72.0).contains(&c.fallback_font_size) {
            return Err(DocConvError::InvalidConfig(format!(
                "fallback font size must be 4–72pt, got {}",
                c.fallback_font_size
            )));
        }
        if c.office_program.is_none() && c.office_programs.is_empty() {
            return Err(DocConvError::InvalidConfig(
                "at least one office program candidate is required".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Page size used by the text-only fallback layout.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PageSize {
    /// US Letter, 612 × 792 pt. (default)
    #[default]
    Letter,
    /// ISO A4, 595 × 842 pt.
    A4,
    /// Arbitrary size in points.
    Custom { width: f32, height: f32 },
}

impl PageSize {
    /// `(width, height)` in PDF points.
    pub fn dimensions(self) -> (f32, f32) {
        match self {
            PageSize::Letter => (612.0, 792.0),
            PageSize::A4 => (595.276, 841.89),
            PageSize::Custom { width, height } => (width, height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_policy() {
        let c = ConverterConfig::default();
        assert_eq!(c.retention_secs, 3600);
        assert!((c.reclaim_probability - 1.0 / 40.0).abs() < f64::EPSILON);
        assert_eq!(c.raster_dpi, 200);
        assert_eq!(c.jpeg_quality, 90);
        assert_eq!(c.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(c.office_programs, vec!["libreoffice", "soffice"]);
    }

    #[test]
    fn setters_clamp() {
        let c = ConverterConfig::builder()
            .raster_dpi(10_000)
            .jpeg_quality(0)
            .reclaim_probability(7.0)
            .office_timeout_secs(0)
            .max_render_edge(5)
            .build()
            .unwrap();
        assert_eq!(c.raster_dpi, 600);
        assert_eq!(c.jpeg_quality, 1);
        assert_eq!(c.reclaim_probability, 1.0);
        assert_eq!(c.office_timeout_secs, 1);
        assert_eq!(c.max_render_edge, 1_000);
    }

    #[test]
    fn store_root_splits_areas() {
        let c = ConverterConfig::builder().store_root("/srv/x").build().unwrap();
        assert_eq!(c.incoming_dir, PathBuf::from("/srv/x/uploads"));
        assert_eq!(c.working_dir, PathBuf::from("/srv/x/temp"));
    }

    #[test]
    fn same_area_twice_is_invalid() {
        let err = ConverterConfig::builder()
            .incoming_dir("/a")
            .working_dir("/a")
            .build()
            .unwrap_err();
        assert!(matches!(err, DocConvError::InvalidConfig(_)));
    }

    #[test]
    fn page_sizes() {
        assert_eq!(PageSize::Letter.dimensions(), (612.0, 792.0));
        assert_eq!(
            PageSize::Custom {
                width: 100.0,
                height: 200.0
            }
            .dimensions(),
            (100.0, 200.0)
        );
    }
}
