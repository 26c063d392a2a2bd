use crate::layout::is_ecmascript_whitespace;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn letter() -> Self {
        // 8.5in x 11in at 72pt/in.
        Self {
            width: 612.0,
            height: 792.0,
        }
    }
}

/// Axis-aligned rectangle with a top-left origin unless a caller says otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// True when both sides are strictly positive and finite.
    pub fn has_area(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }

    /// Parses `#rrggbb` or `rrggbb`.
    pub fn from_hex(raw: &str) -> Option<Self> {
        let hex = raw.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self::from_rgb8(r, g, b))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    TextLabel { label: String },
    CheckMark,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::TextLabel { .. } => "text",
            FieldKind::CheckMark => "check",
        }
    }
}

/// A user-placed annotation. `rect` is in editor-display space.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub kind: FieldKind,
    pub rect: Rect,
}

impl Field {
    pub fn text(label: impl Into<String>, rect: Rect) -> Self {
        Self {
            kind: FieldKind::TextLabel {
                label: label.into(),
            },
            rect,
        }
    }

    pub fn check_mark(rect: Rect) -> Self {
        Self {
            kind: FieldKind::CheckMark,
            rect,
        }
    }

    pub fn is_renderable(&self) -> bool {
        self.rect.is_finite() && self.rect.has_area()
    }

    /// Trimmed label for text fields, `None` for check marks or blank labels.
    pub fn trimmed_label(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::TextLabel { label } => {
                let trimmed = label.trim_matches(is_ecmascript_whitespace);
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed)
                }
            }
            FieldKind::CheckMark => None,
        }
    }
}
