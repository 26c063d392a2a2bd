mod composite;
mod debug;
mod document;
mod error;
mod font;
mod geometry;
mod layout;
mod metrics;
mod render;
mod surface;
mod types;

pub use composite::CompositeImageJob;
use composite::RenderContext;
use debug::DebugLogger;
pub use document::{DocumentFont, DocumentInfo};
pub use error::FieldStampError;
pub use font::{FontMeasure, FontRegistry};
pub use geometry::{BoundsMapping, is_culled, is_within_bounds, map_rect, to_document_space};
pub use layout::{
    LINE_HEIGHT_FACTOR, PlacedLine, TextLayout, TextMeasure, calculate_font_size,
    is_vector_text_eligible, layout_lines, place_lines, preview_font_size,
};
pub use metrics::CompositeMetrics;
pub use render::{FieldOutcome, FieldStyle, check_mark_points, render_field};
pub use surface::{StrokeStyle, Surface, load_image_source, to_data_uri};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
pub use types::{Color, Field, FieldKind, Point, Rect, Size};

/// Families tried, in order, for raster text.
pub const DEFAULT_RASTER_FONT_FAMILIES: [&str; 5] = [
    "Sarabun",
    "Noto Sans Thai",
    "Arial",
    "DejaVu Sans",
    "Liberation Sans",
];

#[derive(Debug, Clone)]
pub(crate) struct CompositeOptions {
    pub(crate) raster_font_families: Vec<String>,
    pub(crate) document_fonts: Vec<DocumentFont>,
    pub(crate) preview_style: FieldStyle,
    pub(crate) document_text_size: f32,
    pub(crate) document_text_color: Color,
}

impl Default for CompositeOptions {
    fn default() -> Self {
        Self {
            raster_font_families: DEFAULT_RASTER_FONT_FAMILIES
                .iter()
                .map(|family| family.to_string())
                .collect(),
            document_fonts: document::default_document_fonts(),
            preview_style: FieldStyle::default(),
            document_text_size: 12.0,
            document_text_color: Color::BLACK,
        }
    }
}

pub struct Compositor {
    font_registry: Arc<FontRegistry>,
    options: CompositeOptions,
    debug: Option<Arc<DebugLogger>>,
}

#[derive(Clone)]
pub struct CompositorBuilder {
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    font_bytes: Vec<(String, Vec<u8>)>,
    system_fonts: bool,
    options: CompositeOptions,
    debug_path: Option<PathBuf>,
}

impl Compositor {
    pub fn builder() -> CompositorBuilder {
        CompositorBuilder::new()
    }

    pub fn font_registry(&self) -> &FontRegistry {
        self.font_registry.as_ref()
    }

    /// Measures with the first configured raster family that resolves.
    pub fn text_measure(&self) -> FontMeasure<'_> {
        FontMeasure::new(self.font_registry.as_ref(), &self.options.raster_font_families)
    }

    /// Starts one generate call; each call gets its own debug trace id.
    fn context(&self) -> RenderContext<'_> {
        RenderContext::new(
            self.font_registry.as_ref(),
            &self.options,
            self.debug.as_deref(),
        )
    }

    fn emit_debug_summary(
        &self,
        context: &str,
        call: u64,
        job: Option<usize>,
        metrics: &CompositeMetrics,
    ) {
        if let Some(logger) = self.debug.as_deref() {
            let job = job.map(|job| format!(",\"job\":{job}")).unwrap_or_default();
            let json = format!(
                "{{\"type\":\"composite.metrics\",\"call\":{call}{job},\"context\":\"{}\",\"fields\":{},\"render_ms\":{:.3},\"output_bytes\":{}}}",
                context, metrics.fields_total, metrics.render_ms, metrics.output_bytes
            );
            logger.log_json(&json);
            logger.emit_summary(call, context, &metrics.counts());
            logger.flush();
        }
    }

    fn finish(
        &self,
        context: &str,
        call: u64,
        job: Option<usize>,
        start: Instant,
        metrics: &mut CompositeMetrics,
    ) {
        metrics.render_ms = start.elapsed().as_secs_f64() * 1000.0;
        let counts = metrics
            .counts()
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(name, count)| format!("{name}={count}"))
            .collect::<Vec<_>>()
            .join(" ");
        log::debug!(
            "{context}: {} fields in {:.2}ms [{counts}]",
            metrics.fields_total,
            metrics.render_ms
        );
        self.emit_debug_summary(context, call, job, metrics);
    }

    /// Flattens `fields` onto a PNG or JPEG base image and returns PNG bytes
    /// at the base image's native size.
    pub fn generate_composite_image(
        &self,
        base_image: &[u8],
        fields: &[Field],
        mapping: &BoundsMapping,
    ) -> Result<Vec<u8>, FieldStampError> {
        self.generate_composite_image_with_metrics(base_image, fields, mapping)
            .map(|(png, _)| png)
    }

    pub fn generate_composite_image_with_metrics(
        &self,
        base_image: &[u8],
        fields: &[Field],
        mapping: &BoundsMapping,
    ) -> Result<(Vec<u8>, CompositeMetrics), FieldStampError> {
        let start = Instant::now();
        let ctx = self.context();
        let (png, mut metrics) =
            composite::generate_composite_image(&ctx, base_image, fields, mapping)?;
        self.finish("image", ctx.call, None, start, &mut metrics);
        Ok((png, metrics))
    }

    // Each job gets its own surface and trace id; results come back in input
    // order.
    pub fn generate_composite_images_parallel(
        &self,
        jobs: &[CompositeImageJob],
    ) -> Vec<Result<Vec<u8>, FieldStampError>> {
        use rayon::prelude::*;

        let start = Instant::now();
        let results: Vec<Result<Vec<u8>, FieldStampError>> = jobs
            .par_iter()
            .enumerate()
            .map(|(index, job)| -> Result<Vec<u8>, FieldStampError> {
                let job_start = Instant::now();
                let ctx = self.context();
                let (png, mut metrics) = composite::generate_composite_image(
                    &ctx,
                    &job.base_image,
                    &job.fields,
                    &job.mapping,
                )?;
                self.finish("image.parallel", ctx.call, Some(index), job_start, &mut metrics);
                Ok(png)
            })
            .collect();
        log::debug!(
            "rendered {} composite images in {:.2}ms",
            jobs.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        results
    }

    /// Stamps `fields` onto page `page_number` (1-indexed) of `pdf`. Field
    /// rects are taken to be in the page's own top-left space.
    pub fn generate_composite_document(
        &self,
        pdf: &[u8],
        fields: &[Field],
        page_number: usize,
    ) -> Result<Vec<u8>, FieldStampError> {
        self.generate_composite_document_mapped(
            pdf,
            fields,
            page_number,
            &BoundsMapping::identity(),
        )
    }

    pub fn generate_composite_document_mapped(
        &self,
        pdf: &[u8],
        fields: &[Field],
        page_number: usize,
        mapping: &BoundsMapping,
    ) -> Result<Vec<u8>, FieldStampError> {
        self.generate_composite_document_with_metrics(pdf, fields, page_number, mapping)
            .map(|(bytes, _)| bytes)
    }

    pub fn generate_composite_document_with_metrics(
        &self,
        pdf: &[u8],
        fields: &[Field],
        page_number: usize,
        mapping: &BoundsMapping,
    ) -> Result<(Vec<u8>, CompositeMetrics), FieldStampError> {
        let start = Instant::now();
        let ctx = self.context();
        let (bytes, mut metrics) =
            document::generate_composite_document(&ctx, pdf, fields, page_number, mapping)?;
        self.finish("document", ctx.call, None, start, &mut metrics);
        Ok((bytes, metrics))
    }
}

/// Page count, page sizes and encryption state of a PDF.
pub fn inspect_document(pdf: &[u8]) -> Result<DocumentInfo, FieldStampError> {
    document::inspect_document(pdf)
}

impl CompositorBuilder {
    pub fn new() -> Self {
        Self {
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            font_bytes: Vec::new(),
            system_fonts: true,
            options: CompositeOptions::default(),
            debug_path: None,
        }
    }

    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    pub fn register_font_bytes(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.font_bytes.push((name.into(), data));
        self
    }

    // Looks for the raster families in the OS font directories at build time.
    pub fn system_fonts(mut self, enabled: bool) -> Self {
        self.system_fonts = enabled;
        self
    }

    pub fn raster_font_families<I, S>(mut self, families: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.raster_font_families = families.into_iter().map(Into::into).collect();
        self
    }

    // First entry that embeds wins.
    pub fn document_fonts(mut self, fonts: Vec<DocumentFont>) -> Self {
        self.options.document_fonts = fonts;
        self
    }

    pub fn text_color(mut self, color: Color) -> Self {
        self.options.preview_style.text_color = color;
        self
    }

    pub fn check_color(mut self, color: Color) -> Self {
        self.options.preview_style.check_color = color;
        self
    }

    pub fn check_width_factor(mut self, factor: f32) -> Self {
        self.options.preview_style.check_width_factor = factor;
        self
    }

    pub fn document_text_size(mut self, size: f32) -> Self {
        self.options.document_text_size = size;
        self
    }

    pub fn document_text_color(mut self, color: Color) -> Self {
        self.options.document_text_color = color;
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Compositor, FieldStampError> {
        let options = self.options;
        if !options.document_text_size.is_finite() || options.document_text_size <= 0.0 {
            return Err(FieldStampError::Config(
                "document_text_size must be > 0".to_string(),
            ));
        }
        let factor = options.preview_style.check_width_factor;
        if !factor.is_finite() || factor <= 0.0 {
            return Err(FieldStampError::Config(
                "check_width_factor must be > 0".to_string(),
            ));
        }
        if options.document_fonts.is_empty() {
            return Err(FieldStampError::Config(
                "document_fonts must name at least one font".to_string(),
            ));
        }

        let mut registry = FontRegistry::new();
        for dir in &self.font_dirs {
            let count = registry.register_dir(dir);
            log::debug!("registered {count} fonts from {}", dir.display());
        }
        for file in &self.font_files {
            registry.register_file(file)?;
        }
        for (name, data) in self.font_bytes {
            registry.register_bytes(data, Some(&name))?;
        }
        if self.system_fonts {
            let found = registry.discover_system_fonts(&options.raster_font_families);
            log::debug!("discovered {found} system fonts");
        }
        if registry.resolve_first(&options.raster_font_families).is_none() {
            log::warn!(
                "no raster font family resolved ({}); raster text fields will fail",
                options.raster_font_families.join(", ")
            );
        }

        let debug = if let Some(path) = self.debug_path {
            Some(Arc::new(DebugLogger::new(path)?))
        } else {
            None
        };
        Ok(Compositor {
            font_registry: Arc::new(registry),
            options,
            debug,
        })
    }
}

impl Default for CompositorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
