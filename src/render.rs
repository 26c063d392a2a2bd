use crate::error::FieldStampError;
use crate::layout::{layout_lines, place_lines};
use crate::surface::{StrokeStyle, Surface};
use crate::types::{Color, Field, FieldKind, Point, Rect};

/// Share of the target width available to wrapped text.
const TEXT_WIDTH_RATIO: f32 = 0.95;
/// Check glyph side relative to the shorter side of the target.
const CHECK_SIZE_RATIO: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldStyle {
    pub font_size: f32,
    pub text_color: Color,
    pub check_color: Color,
    /// Check stroke width as a fraction of `font_size`.
    pub check_width_factor: f32,
}

impl Default for FieldStyle {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            text_color: Color::from_rgb8(0x1a, 0x1a, 0x1a),
            check_color: Color::from_rgb8(0x19, 0x87, 0x54),
            check_width_factor: 0.15,
        }
    }
}

impl FieldStyle {
    pub fn with_font_size(self, font_size: f32) -> Self {
        Self { font_size, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOutcome {
    Drawn,
    /// Text field whose trimmed label is empty.
    Blank,
}

/// Draws one field into `target`, which is already in the surface's space.
pub fn render_field(
    surface: &mut dyn Surface,
    field: &Field,
    target: Rect,
    style: &FieldStyle,
) -> Result<FieldOutcome, FieldStampError> {
    if !target.is_finite() || !style.font_size.is_finite() {
        return Err(FieldStampError::Render(format!(
            "non-finite target {target:?} for {} field",
            field.kind.as_str()
        )));
    }
    match &field.kind {
        FieldKind::CheckMark => {
            render_check_mark(surface, target, style)?;
            Ok(FieldOutcome::Drawn)
        }
        FieldKind::TextLabel { .. } => match field.trimmed_label() {
            Some(text) => {
                render_text_block(surface, text, target, style)?;
                Ok(FieldOutcome::Drawn)
            }
            None => Ok(FieldOutcome::Blank),
        },
    }
}

pub fn check_mark_points(target: Rect) -> [Point; 3] {
    let center = target.center();
    let size = target.width.min(target.height) * CHECK_SIZE_RATIO;
    [
        Point::new(center.x - size / 2.0, center.y),
        Point::new(center.x - size / 6.0, center.y + size / 3.0),
        Point::new(center.x + size / 2.0, center.y - size / 3.0),
    ]
}

pub fn render_check_mark(
    surface: &mut dyn Surface,
    target: Rect,
    style: &FieldStyle,
) -> Result<(), FieldStampError> {
    let stroke = StrokeStyle {
        color: style.check_color,
        width: style.font_size * style.check_width_factor,
        round: true,
    };
    surface.stroke_polyline(&check_mark_points(target), &stroke)
}

/// Wraps `text` to the target width and draws each line centred in `target`.
/// Fails before drawing anything when no font covers the whole label.
pub fn render_text_block(
    surface: &mut dyn Surface,
    text: &str,
    target: Rect,
    style: &FieldStyle,
) -> Result<(), FieldStampError> {
    if !surface.covers_text(text) {
        return Err(FieldStampError::Render(format!(
            "no raster font covers {text:?}"
        )));
    }
    let font_size = style.font_size;
    let placed = {
        let measure = |line: &str, size: f32| surface.measure_text(line, size);
        let layout = layout_lines(text, target.width * TEXT_WIDTH_RATIO, font_size, &measure);
        place_lines(&layout, target.y, target.height, font_size)
    };
    for line in placed {
        let width = surface.measure_text(&line.text, font_size);
        let x = target.x + (target.width - width) / 2.0;
        surface.fill_text(&line.text, Point::new(x, line.y), font_size, style.text_color)?;
    }
    Ok(())
}
