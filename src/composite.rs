use crate::CompositeOptions;
use crate::debug::DebugLogger;
use crate::error::FieldStampError;
use crate::font::{FontRegistry, RegisteredFont};
use crate::geometry::{BoundsMapping, is_culled, map_rect};
use crate::layout::preview_font_size;
use crate::metrics::CompositeMetrics;
use crate::render::{FieldOutcome, render_field};
use crate::surface::{PixmapSurface, decode_image_to_pixmap};
use crate::types::{Field, FieldKind, Size};

/// Borrowed compositor state for one generate call.
pub(crate) struct RenderContext<'a> {
    pub(crate) registry: &'a FontRegistry,
    pub(crate) options: &'a CompositeOptions,
    pub(crate) debug: Option<&'a DebugLogger>,
    /// Debug trace id of this call, 0 when tracing is off.
    pub(crate) call: u64,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(
        registry: &'a FontRegistry,
        options: &'a CompositeOptions,
        debug: Option<&'a DebugLogger>,
    ) -> Self {
        let call = debug.map_or(0, DebugLogger::begin_call);
        Self {
            registry,
            options,
            debug,
            call,
        }
    }

    pub(crate) fn raster_fonts(&self) -> Vec<&'a RegisteredFont> {
        self.registry
            .resolve_all(&self.options.raster_font_families)
    }

    pub(crate) fn raster_font_for(&self, text: &str) -> Option<&'a RegisteredFont> {
        self.registry
            .resolve_covering(&self.options.raster_font_families, text)
    }

    pub(crate) fn trace(
        &self,
        context: &str,
        index: usize,
        field: &Field,
        event: &str,
        detail: &str,
    ) {
        if let Some(debug) = self.debug {
            debug.log_field(self.call, context, index, field.kind.as_str(), event, detail);
        }
    }
}

/// One independent input for batch image compositing.
#[derive(Debug, Clone)]
pub struct CompositeImageJob {
    pub base_image: Vec<u8>,
    pub fields: Vec<Field>,
    pub mapping: BoundsMapping,
}

impl CompositeImageJob {
    pub fn new(base_image: Vec<u8>, fields: Vec<Field>, mapping: BoundsMapping) -> Self {
        Self {
            base_image,
            fields,
            mapping,
        }
    }
}

pub(crate) fn generate_composite_image(
    ctx: &RenderContext<'_>,
    base_image: &[u8],
    fields: &[Field],
    mapping: &BoundsMapping,
) -> Result<(Vec<u8>, CompositeMetrics), FieldStampError> {
    let base = decode_image_to_pixmap(base_image)?;
    let native = Size::new(base.width() as f32, base.height() as f32);
    log::debug!(
        "compositing {} fields onto {}x{} image",
        fields.len(),
        base.width(),
        base.height()
    );

    let mut surface = PixmapSurface::new(base.width(), base.height(), ctx.raster_fonts())?;
    surface.draw_pixmap(&base, 0, 0);

    let mut metrics = CompositeMetrics::new(fields.len());
    for (index, field) in fields.iter().enumerate() {
        if !field.is_renderable() {
            metrics.skipped += 1;
            ctx.trace("image", index, field, "skipped", "non-positive or non-finite size");
            continue;
        }
        let target = map_rect(field.rect, mapping);
        if is_culled(target, native) {
            metrics.culled += 1;
            ctx.trace(
                "image",
                index,
                field,
                "culled",
                &format!("x={} y={}", target.x, target.y),
            );
            continue;
        }
        let style = ctx
            .options
            .preview_style
            .with_font_size(preview_font_size(target.width, target.height, native));
        match render_field(&mut surface, field, target, &style) {
            Ok(FieldOutcome::Drawn) => {
                metrics.drawn += 1;
                if matches!(field.kind, FieldKind::TextLabel { .. }) {
                    metrics.raster_text += 1;
                }
                ctx.trace("image", index, field, "drawn", "");
            }
            Ok(FieldOutcome::Blank) => {
                metrics.blank += 1;
                ctx.trace("image", index, field, "blank", "");
            }
            Err(err) => {
                metrics.failed += 1;
                log::warn!("skipping {} field {index}: {err}", field.kind.as_str());
                ctx.trace("image", index, field, "failed", &err.to_string());
            }
        }
    }

    let png = surface.encode_png()?;
    metrics.output_bytes = png.len();
    Ok((png, metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::tests::dejavu_registry;
    use crate::types::{Point, Rect};
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn base_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([240, 240, 240, 255]));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn run_with(
        registry: &FontRegistry,
        base: &[u8],
        fields: &[Field],
        mapping: &BoundsMapping,
    ) -> Result<(Vec<u8>, CompositeMetrics), FieldStampError> {
        let options = CompositeOptions::default();
        let ctx = RenderContext::new(registry, &options, None);
        generate_composite_image(&ctx, base, fields, mapping)
    }

    fn run(
        base: &[u8],
        fields: &[Field],
        mapping: &BoundsMapping,
    ) -> Result<(Vec<u8>, CompositeMetrics), FieldStampError> {
        run_with(&FontRegistry::new(), base, fields, mapping)
    }

    fn changed_pixels(png: &[u8]) -> Vec<(u32, u32)> {
        let decoded = image::load_from_memory(png).unwrap().to_rgba8();
        decoded
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0 != [240, 240, 240, 255])
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn output_keeps_native_dimensions() {
        let base = base_png(800, 600);
        let fields = [Field::check_mark(Rect::new(100.0, 100.0, 200.0, 50.0))];
        let (png, metrics) = run(&base, &fields, &BoundsMapping::identity()).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (800, 600));
        assert_eq!(metrics.drawn, 1);
        assert_eq!(metrics.output_bytes, png.len());
    }

    #[test]
    fn text_without_a_covering_font_is_failed_not_drawn() {
        let base = base_png(200, 100);
        let (untouched, _) = run(&base, &[], &BoundsMapping::identity()).unwrap();
        let fields = [Field::text("Hello World", Rect::new(10.0, 10.0, 150.0, 40.0))];
        let (png, metrics) = run(&base, &fields, &BoundsMapping::identity()).unwrap();
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.drawn, 0);
        assert_eq!(metrics.raster_text, 0);
        assert_eq!(png, untouched);
    }

    #[test]
    fn text_with_a_real_font_inks_its_rect() {
        let Some(registry) = dejavu_registry() else {
            return;
        };
        let base = base_png(400, 200);
        let rect = Rect::new(100.0, 60.0, 200.0, 50.0);
        let fields = [Field::text("Hello World", rect)];
        let (png, metrics) =
            run_with(&registry, &base, &fields, &BoundsMapping::identity()).unwrap();
        assert_eq!((metrics.drawn, metrics.raster_text, metrics.failed), (1, 1, 0));
        let changed = changed_pixels(&png);
        assert!(changed.len() > 50);
        for (x, y) in changed {
            assert!((99..=301).contains(&x) && (59..=111).contains(&y), "({x},{y})");
        }
    }

    #[test]
    fn thai_label_without_thai_font_is_failed() {
        let Some(registry) = dejavu_registry() else {
            return;
        };
        let base = base_png(200, 100);
        let (untouched, _) = run(&base, &[], &BoundsMapping::identity()).unwrap();
        let fields = [Field::text("สวัสดี", Rect::new(10.0, 10.0, 150.0, 40.0))];
        let (png, metrics) =
            run_with(&registry, &base, &fields, &BoundsMapping::identity()).unwrap();
        assert_eq!((metrics.drawn, metrics.failed), (0, 1));
        assert_eq!(png, untouched);
    }

    #[test]
    fn check_mark_paints_inside_its_rect() {
        let base = base_png(100, 100);
        let fields = [Field::check_mark(Rect::new(20.0, 20.0, 60.0, 60.0))];
        let (png, _) = run(&base, &fields, &BoundsMapping::identity()).unwrap();
        let changed = changed_pixels(&png);
        assert!(!changed.is_empty());
        for (x, y) in changed {
            assert!((20..80).contains(&x) && (20..80).contains(&y));
        }
    }

    #[test]
    fn culled_field_leaves_output_unchanged() {
        let base = base_png(100, 100);
        let (untouched, _) = run(&base, &[], &BoundsMapping::identity()).unwrap();
        let fields = [
            Field::check_mark(Rect::new(-90.0, 10.0, 40.0, 40.0)),
            Field::check_mark(Rect::new(150.0, 10.0, 40.0, 40.0)),
        ];
        let (png, metrics) = run(&base, &fields, &BoundsMapping::identity()).unwrap();
        assert_eq!(metrics.culled, 2);
        assert_eq!(png, untouched);
    }

    #[test]
    fn mapping_moves_fields_into_native_space() {
        let base = base_png(200, 200);
        // Displayed at half size, offset by 10px.
        let mapping = BoundsMapping::new(Point::new(10.0, 10.0), Point::new(2.0, 2.0));
        let fields = [Field::check_mark(Rect::new(60.0, 60.0, 20.0, 20.0))];
        let (png, metrics) = run(&base, &fields, &mapping).unwrap();
        assert_eq!(metrics.drawn, 1);
        for (x, y) in changed_pixels(&png) {
            assert!((100..140).contains(&x) && (100..140).contains(&y));
        }
    }

    #[test]
    fn output_is_deterministic() {
        let base = base_png(120, 80);
        let fields = [
            Field::check_mark(Rect::new(5.0, 5.0, 30.0, 30.0)),
            Field::text("Paid", Rect::new(40.0, 10.0, 60.0, 20.0)),
        ];
        let first = run(&base, &fields, &BoundsMapping::identity()).unwrap().0;
        let second = run(&base, &fields, &BoundsMapping::identity()).unwrap().0;
        assert_eq!(first, second);
    }

    #[test]
    fn degenerate_fields_are_skipped_not_fatal() {
        let base = base_png(50, 50);
        let fields = [
            Field::check_mark(Rect::new(5.0, 5.0, 0.0, 10.0)),
            Field::text("x", Rect::new(f32::NAN, 5.0, 10.0, 10.0)),
            Field::check_mark(Rect::new(5.0, 5.0, 20.0, 20.0)),
        ];
        let (_, metrics) = run(&base, &fields, &BoundsMapping::identity()).unwrap();
        assert_eq!(metrics.skipped, 2);
        assert_eq!(metrics.drawn, 1);
    }

    #[test]
    fn failing_fields_are_isolated() {
        let base = base_png(50, 50);
        let mapping = BoundsMapping::new(Point::ZERO, Point::new(f32::NAN, 1.0));
        let fields = [Field::check_mark(Rect::new(5.0, 5.0, 20.0, 20.0))];
        let (png, metrics) = run(&base, &fields, &mapping).unwrap();
        assert_eq!(metrics.failed, 1);
        assert!(image::load_from_memory(&png).is_ok());
    }

    #[test]
    fn undecodable_base_is_an_asset_error() {
        let result = run(b"definitely not an image", &[], &BoundsMapping::identity());
        assert!(matches!(result, Err(FieldStampError::Asset(_))));
    }
}
