use crate::error::FieldStampError;
use crate::font::{FontRegistry, RegisteredFont};
use crate::types::{Color, Point, Rect, Size};
use base64::Engine;
use std::path::Path as FsPath;
use tiny_skia::{
    FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform,
};
use ttf_parser::{GlyphId, OutlineBuilder};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub color: Color,
    pub width: f32,
    pub round: bool,
}

/// 2-D drawing target in top-left, y-down pixel space.
pub trait Surface {
    fn size(&self) -> Size;

    fn fill_rect(&mut self, rect: Rect, color: Color) -> Result<(), FieldStampError>;

    fn stroke_polyline(
        &mut self,
        points: &[Point],
        style: &StrokeStyle,
    ) -> Result<(), FieldStampError>;

    /// True when some font on this surface can draw every visible char of
    /// `text`.
    fn covers_text(&self, text: &str) -> bool;

    /// Draws one line of text whose line box starts at `origin` (top-left).
    /// Text no font covers is a `Render` error, never a silent blank.
    fn fill_text(
        &mut self,
        text: &str,
        origin: Point,
        font_size: f32,
        color: Color,
    ) -> Result<(), FieldStampError>;

    fn measure_text(&self, text: &str, font_size: f32) -> f32;
}

/// Raster surface over a `tiny-skia` pixmap. Text uses the first font in
/// `fonts` that covers the string being drawn or measured.
pub struct PixmapSurface<'a> {
    pixmap: Pixmap,
    fonts: Vec<&'a RegisteredFont>,
}

impl<'a> PixmapSurface<'a> {
    pub(crate) fn new(
        width: u32,
        height: u32,
        fonts: Vec<&'a RegisteredFont>,
    ) -> Result<Self, FieldStampError> {
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            FieldStampError::Render(format!("invalid raster size {width}x{height}"))
        })?;
        Ok(Self { pixmap, fonts })
    }

    fn font_for(&self, text: &str) -> Option<&'a RegisteredFont> {
        self.fonts.iter().copied().find(|font| font.covers(text))
    }

    pub(crate) fn draw_pixmap(&mut self, source: &Pixmap, x: i32, y: i32) {
        self.pixmap.draw_pixmap(
            x,
            y,
            source.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    pub(crate) fn encode_png(&self) -> Result<Vec<u8>, FieldStampError> {
        self.pixmap
            .encode_png()
            .map_err(|e| FieldStampError::Encode(format!("png encode failed: {e}")))
    }

    /// Consumes the surface into straight-alpha RGBA rows.
    pub(crate) fn into_rgba(self) -> RgbaRaster {
        let data = self
            .pixmap
            .pixels()
            .iter()
            .flat_map(|pixel| {
                let color = pixel.demultiply();
                [color.red(), color.green(), color.blue(), color.alpha()]
            })
            .collect();
        RgbaRaster {
            width: self.pixmap.width(),
            height: self.pixmap.height(),
            data,
        }
    }
}

/// Unpremultiplied 8-bit RGBA pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RgbaRaster {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) data: Vec<u8>,
}

impl Surface for PixmapSurface<'_> {
    fn size(&self) -> Size {
        Size::new(self.pixmap.width() as f32, self.pixmap.height() as f32)
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) -> Result<(), FieldStampError> {
        let sk_rect = tiny_skia::Rect::from_xywh(rect.x, rect.y, rect.width, rect.height)
            .ok_or_else(|| FieldStampError::Render(format!("invalid fill rect {rect:?}")))?;
        self.pixmap
            .fill_rect(sk_rect, &solid_paint(color), Transform::identity(), None);
        Ok(())
    }

    fn stroke_polyline(
        &mut self,
        points: &[Point],
        style: &StrokeStyle,
    ) -> Result<(), FieldStampError> {
        let Some((first, rest)) = points.split_first() else {
            return Ok(());
        };
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(FieldStampError::Render(
                "non-finite polyline coordinate".to_string(),
            ));
        }
        let mut builder = PathBuilder::new();
        builder.move_to(first.x, first.y);
        for point in rest {
            builder.line_to(point.x, point.y);
        }
        let path = builder
            .finish()
            .ok_or_else(|| FieldStampError::Render("empty polyline path".to_string()))?;
        let stroke = build_stroke(style);
        self.pixmap.stroke_path(
            &path,
            &solid_paint(style.color),
            &stroke,
            Transform::identity(),
            None,
        );
        Ok(())
    }

    fn fill_text(
        &mut self,
        text: &str,
        origin: Point,
        font_size: f32,
        color: Color,
    ) -> Result<(), FieldStampError> {
        if !origin.x.is_finite() || !origin.y.is_finite() || !font_size.is_finite() {
            return Err(FieldStampError::Render(format!(
                "non-finite text placement for {text:?}"
            )));
        }
        if font_size <= 0.0 || text.is_empty() {
            return Ok(());
        }
        let font = self.font_for(text).ok_or_else(|| {
            FieldStampError::Render(format!("no raster font covers {text:?}"))
        })?;
        let face = ttf_parser::Face::parse(&font.data, 0).map_err(|err| {
            FieldStampError::Render(format!("font {} failed to parse: {err}", font.name))
        })?;

        let baseline_y = origin.y + font.ascent_px(font_size);
        let paint = solid_paint(color);
        for glyph in font.glyph_run(text, font_size, origin.x, baseline_y) {
            let mut outline = GlyphOutline(PathBuilder::new());
            if face
                .outline_glyph(GlyphId(glyph.glyph_id), &mut outline)
                .is_none()
            {
                continue;
            }
            let Some(path) = outline.0.finish() else {
                continue;
            };
            // Font units are y-up; flip about the glyph's baseline origin.
            let placement = Transform::from_row(
                glyph.scale,
                0.0,
                0.0,
                -glyph.scale,
                glyph.origin_x,
                glyph.origin_y,
            );
            self.pixmap
                .fill_path(&path, &paint, FillRule::Winding, placement, None);
        }
        Ok(())
    }

    fn measure_text(&self, text: &str, font_size: f32) -> f32 {
        FontRegistry::measure_text_width(self.font_for(text), font_size, text)
    }

    fn covers_text(&self, text: &str) -> bool {
        self.font_for(text).is_some()
    }
}

/// Collects a glyph outline in font units.
struct GlyphOutline(PathBuilder);

impl OutlineBuilder for GlyphOutline {
    fn move_to(&mut self, x: f32, y: f32) {
        self.0.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.0.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.0.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.0.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.0.close();
    }
}

fn build_stroke(style: &StrokeStyle) -> Stroke {
    let mut stroke = Stroke {
        width: style.width.max(0.0),
        ..Stroke::default()
    };
    if style.round {
        stroke.line_cap = LineCap::Round;
        stroke.line_join = LineJoin::Round;
    }
    stroke
}

fn solid_paint(color: Color) -> Paint<'static> {
    let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    let mut paint = Paint::default();
    paint.set_color_rgba8(channel(color.r), channel(color.g), channel(color.b), 255);
    paint.anti_alias = true;
    paint
}

/// Reads a base asset given as a `data:` URI or a filesystem path.
pub fn load_image_source(source: &str) -> Result<Vec<u8>, FieldStampError> {
    if let Some((_mime, data)) = parse_data_uri(source) {
        return Ok(data);
    }
    if source.starts_with("data:") {
        return Err(FieldStampError::Asset("malformed data URI".to_string()));
    }
    Ok(std::fs::read(FsPath::new(source))?)
}

pub(crate) fn decode_image_to_pixmap(data: &[u8]) -> Result<Pixmap, FieldStampError> {
    let decoded = match image::guess_format(data) {
        Ok(format) => image::load_from_memory_with_format(data, format),
        Err(_) => image::load_from_memory(data),
    }
    .map_err(|e| FieldStampError::Asset(format!("base image decode failed: {e}")))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        FieldStampError::Asset(format!("base image has invalid size {width}x{height}"))
    })?;
    let src = rgba.as_raw();
    let dst = pixmap.data_mut();
    for (src_px, dst_px) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let a = src_px[3];
        dst_px[0] = premul_u8(src_px[0], a);
        dst_px[1] = premul_u8(src_px[1], a);
        dst_px[2] = premul_u8(src_px[2], a);
        dst_px[3] = a;
    }
    Ok(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    if !uri.starts_with("data:") {
        return None;
    }
    let (header, payload) = uri.split_once(',')?;
    let mime = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}

/// Encodes bytes as a base64 `data:` URI.
pub fn to_data_uri(mime: &str, data: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(data)
    )
}
