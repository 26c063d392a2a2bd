//! Editor-space to target-space coordinate mapping.
//!
//! Editor rectangles are measured against the base image as it is displayed
//! on screen. Targets are either a raster at the image's natural pixel size
//! (top-left origin) or a PDF page (bottom-left origin). Raster targets only
//! need [`map_rect`]; document targets additionally pass through
//! [`to_document_space`] once, at the document generator boundary.

use crate::error::FieldStampError;
use crate::types::{Point, Rect, Size};

/// Offset + per-axis scale from editor-display space to native space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsMapping {
    pub offset: Point,
    pub scale: Point,
}

impl Default for BoundsMapping {
    fn default() -> Self {
        Self::identity()
    }
}

impl BoundsMapping {
    pub fn identity() -> Self {
        Self {
            offset: Point::ZERO,
            scale: Point::new(1.0, 1.0),
        }
    }

    pub fn new(offset: Point, scale: Point) -> Self {
        Self { offset, scale }
    }

    /// Derives the mapping from the image's natural size and the rect it
    /// currently occupies inside the editor container.
    pub fn from_display(natural: Size, displayed: Rect) -> Result<Self, FieldStampError> {
        if !displayed.has_area() {
            return Err(FieldStampError::Config(format!(
                "displayed image bounds must be positive, got {}x{}",
                displayed.width, displayed.height
            )));
        }
        if !(natural.width.is_finite()
            && natural.height.is_finite()
            && natural.width > 0.0
            && natural.height > 0.0)
        {
            return Err(FieldStampError::Config(format!(
                "natural image size must be positive, got {}x{}",
                natural.width, natural.height
            )));
        }
        Ok(Self {
            offset: displayed.origin(),
            scale: Point::new(
                natural.width / displayed.width,
                natural.height / displayed.height,
            ),
        })
    }
}

pub fn map_rect(rect: Rect, mapping: &BoundsMapping) -> Rect {
    Rect {
        x: (rect.x - mapping.offset.x) * mapping.scale.x,
        y: (rect.y - mapping.offset.y) * mapping.scale.y,
        width: rect.width * mapping.scale.x,
        height: rect.height * mapping.scale.y,
    }
}

/// Flips a top-left rect into PDF user space (origin bottom-left).
pub fn to_document_space(rect: Rect, page_height: f32) -> Rect {
    Rect {
        x: rect.x,
        y: page_height - rect.y - rect.height,
        width: rect.width,
        height: rect.height,
    }
}

/// A mapped rect that lies wholly outside `[0, w] x [0, h]`.
pub fn is_culled(rect: Rect, native: Size) -> bool {
    rect.x < -rect.width || rect.y < -rect.height || rect.x > native.width || rect.y > native.height
}

/// Strict containment: every edge of `rect` inside the container.
pub fn is_within_bounds(rect: Rect, container: Size) -> bool {
    rect.x >= 0.0
        && rect.y >= 0.0
        && rect.x + rect.width <= container.width
        && rect.y + rect.height <= container.height
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_mapping_preserves_rect() {
        let rect = Rect::new(100.0, 100.0, 200.0, 50.0);
        assert_eq!(map_rect(rect, &BoundsMapping::identity()), rect);
    }

    #[test]
    fn map_rect_translates_then_scales() {
        let mapping = BoundsMapping::new(Point::new(20.0, 10.0), Point::new(2.5, 0.5));
        let rect = Rect::new(30.0, 50.0, 8.0, 12.0);
        let mapped = map_rect(rect, &mapping);
        assert_eq!(mapped.x, (30.0 - 20.0) * 2.5);
        assert_eq!(mapped.y, (50.0 - 10.0) * 0.5);
        assert_eq!(mapped.width, 8.0 * 2.5);
        assert_eq!(mapped.height, 12.0 * 0.5);
    }

    #[test]
    fn map_rect_is_exact_for_arbitrary_inputs() {
        let samples = [
            (0.1f32, 0.3f32, 1.7f32),
            (1234.5, 17.25, 0.333),
            (3.0, 0.0, 7.125),
            (0.0, 0.0, 0.0),
        ];
        for (x, off, scale) in samples {
            let mapping = BoundsMapping::new(Point::new(off, off), Point::new(scale, scale));
            let mapped = map_rect(Rect::new(x, x, x, x), &mapping);
            assert_eq!(mapped.x, (x - off) * scale);
            assert_eq!(mapped.y, (x - off) * scale);
            assert_eq!(mapped.width, x * scale);
        }
    }

    #[test]
    fn from_display_derives_scale_and_offset() {
        let mapping = BoundsMapping::from_display(
            Size::new(1600.0, 1200.0),
            Rect::new(40.0, 12.0, 800.0, 600.0),
        )
        .unwrap();
        assert_eq!(mapping.offset, Point::new(40.0, 12.0));
        assert_eq!(mapping.scale, Point::new(2.0, 2.0));
        let mapped = map_rect(Rect::new(140.0, 112.0, 10.0, 5.0), &mapping);
        assert_eq!(mapped, Rect::new(200.0, 200.0, 20.0, 10.0));
    }

    #[test]
    fn from_display_rejects_zero_display_size() {
        let err = BoundsMapping::from_display(Size::new(10.0, 10.0), Rect::new(0.0, 0.0, 0.0, 5.0));
        assert!(matches!(err, Err(FieldStampError::Config(_))));
    }

    #[test]
    fn document_space_flips_y_once() {
        let flipped = to_document_space(Rect::new(0.0, 0.0, 40.0, 40.0), 1000.0);
        assert_eq!(flipped.y, 960.0);
        assert_eq!(flipped.x, 0.0);
        assert_eq!(flipped.height, 40.0);
    }

    #[test]
    fn culling_only_drops_fully_outside_rects() {
        let canvas = Size::new(800.0, 600.0);
        assert!(!is_culled(Rect::new(100.0, 100.0, 200.0, 50.0), canvas));
        // Partially hanging off the left edge still draws.
        assert!(!is_culled(Rect::new(-20.0, 10.0, 40.0, 40.0), canvas));
        assert!(is_culled(Rect::new(-50.0, 10.0, 40.0, 40.0), canvas));
        assert!(is_culled(Rect::new(801.0, 10.0, 40.0, 40.0), canvas));
        assert!(is_culled(Rect::new(10.0, 601.0, 40.0, 40.0), canvas));
        assert!(is_culled(Rect::new(10.0, -41.0, 40.0, 40.0), canvas));
    }

    #[test]
    fn within_bounds_requires_full_containment() {
        let container = Size::new(100.0, 100.0);
        assert!(is_within_bounds(Rect::new(0.0, 0.0, 100.0, 100.0), container));
        assert!(!is_within_bounds(Rect::new(1.0, 0.0, 100.0, 100.0), container));
        assert!(!is_within_bounds(Rect::new(-1.0, 0.0, 10.0, 10.0), container));
    }
}
