use crate::types::Size;

/// Multiplier applied to the font size to get the distance between baselines.
pub const LINE_HEIGHT_FACTOR: f32 = 1.2;

const MIN_FIELD_FONT_SIZE: f32 = 8.0;
const MIN_PREVIEW_FONT_SIZE: f32 = 12.0;
const MAX_PREVIEW_FONT_SIZE: f32 = 48.0;

pub trait TextMeasure {
    fn measure(&self, text: &str, font_size: f32) -> f32;
}

impl<F> TextMeasure for F
where
    F: Fn(&str, f32) -> f32,
{
    fn measure(&self, text: &str, font_size: f32) -> f32 {
        self(text, font_size)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    pub lines: Vec<String>,
    pub line_height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    /// Top of the line box.
    pub y: f32,
}

/// Greedy word wrap. A word wider than `max_width` keeps its own line.
pub fn layout_lines(
    text: &str,
    max_width: f32,
    font_size: f32,
    measure: &dyn TextMeasure,
) -> TextLayout {
    let mut words = text.split(' ');
    let mut lines = Vec::new();
    let mut current = words.next().unwrap_or_default().to_string();

    for word in words {
        let candidate = format!("{current} {word}");
        if measure.measure(&candidate, font_size) > max_width && !current.is_empty() {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }
    lines.push(current);

    TextLayout {
        lines,
        line_height: font_size * LINE_HEIGHT_FACTOR,
    }
}

/// Centres the block vertically in the container and drops lines whose glyph
/// box would cross the container's bottom edge.
pub fn place_lines(
    layout: &TextLayout,
    container_y: f32,
    container_height: f32,
    font_size: f32,
) -> Vec<PlacedLine> {
    let block_height = layout.lines.len() as f32 * layout.line_height;
    let top = container_y + (container_height - block_height) / 2.0;
    let bottom = container_y + container_height;

    layout
        .lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| {
            let y = top + idx as f32 * layout.line_height;
            (y + font_size <= bottom).then(|| PlacedLine {
                text: line.clone(),
                y,
            })
        })
        .collect()
}

/// Aspect-ratio font heuristic used for document output.
pub fn calculate_font_size(width: f32, height: f32, base_font_size: f32) -> f32 {
    let aspect_ratio = width / height;
    let font_size = if aspect_ratio > 3.0 {
        base_font_size * 0.7
    } else if aspect_ratio > 2.0 {
        base_font_size * 0.8
    } else if aspect_ratio < 0.5 {
        base_font_size * 1.2
    } else {
        base_font_size
    };
    font_size.min(height * 0.6).max(MIN_FIELD_FONT_SIZE)
}

/// Font heuristic used for flattened previews. Scales with the native image.
pub fn preview_font_size(width: f32, height: f32, native: Size) -> f32 {
    let base_font_size = native.width.min(native.height) * 0.02;
    (height * 0.6)
        .min(width * 0.1)
        .min(base_font_size)
        .min(MAX_PREVIEW_FONT_SIZE)
        .max(MIN_PREVIEW_FONT_SIZE)
}

/// Labels made only of ASCII letters, digits, whitespace and `-_@.` can be
/// written as WinAnsi vector text; everything else must be rasterized.
pub fn is_vector_text_eligible(text: &str) -> bool {
    !text.is_empty() && text.chars().all(is_vector_text_char)
}

fn is_vector_text_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || is_ecmascript_whitespace(ch) || matches!(ch, '-' | '_' | '@' | '.')
}

/// The `\s` class of editor-side label checks: WhiteSpace plus LineTerminator.
/// Unlike `char::is_whitespace` it includes U+FEFF and excludes U+0085.
pub(crate) fn is_ecmascript_whitespace(ch: char) -> bool {
    matches!(
        ch,
        '\t' | '\n'
            | '\u{0B}'
            | '\u{0C}'
            | '\r'
            | ' '
            | '\u{A0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200A}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
            | '\u{FEFF}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_width(text: &str, font_size: f32) -> f32 {
        text.chars().count() as f32 * font_size * 0.5
    }

    #[test]
    fn short_text_stays_on_one_line() {
        let layout = layout_lines("Hello World", 190.0, 12.0, &fixed_width);
        assert_eq!(layout.lines, vec!["Hello World".to_string()]);
        assert!((layout.line_height - 14.4).abs() < 1e-5);
    }

    #[test]
    fn wraps_greedily_at_word_boundaries() {
        // 10 units per char.
        let layout = layout_lines("aa bb cc dd", 50.0, 20.0, &fixed_width);
        assert_eq!(layout.lines, vec!["aa bb", "cc dd"]);
    }

    #[test]
    fn oversized_word_is_never_split() {
        let layout = layout_lines("a extraordinarily b", 40.0, 20.0, &fixed_width);
        assert_eq!(layout.lines, vec!["a", "extraordinarily", "b"]);
    }

    #[test]
    fn wrapped_lines_fit_unless_single_word() {
        let text = "the quick brown fox jumps over the lazy dog with a tremendouslylongword";
        for max_width in [30.0f32, 60.0, 90.0, 200.0] {
            let layout = layout_lines(text, max_width, 10.0, &fixed_width);
            for line in &layout.lines {
                let fits = fixed_width(line, 10.0) <= max_width;
                assert!(fits || !line.contains(' '), "line {line:?} overflows {max_width}");
            }
            assert_eq!(layout.lines.join(" "), text);
        }
    }

    #[test]
    fn place_lines_centres_block() {
        let layout = TextLayout {
            lines: vec!["Hello World".to_string()],
            line_height: 12.0 * LINE_HEIGHT_FACTOR,
        };
        let placed = place_lines(&layout, 100.0, 50.0, 12.0);
        assert_eq!(placed.len(), 1);
        let expected = 100.0 + (50.0 - 14.4) / 2.0;
        assert!((placed[0].y - expected).abs() < 1e-4);
    }

    #[test]
    fn place_lines_drops_overflowing_tail() {
        let layout = layout_lines("one two three four five", 30.0, 10.0, &fixed_width);
        assert_eq!(layout.lines.len(), 5);
        let placed = place_lines(&layout, 0.0, 30.0, 10.0);
        assert!(!placed.is_empty());
        assert!(placed.len() < layout.lines.len());
        for line in &placed {
            assert!(line.y + 10.0 <= 30.0);
        }
    }

    #[test]
    fn calculate_font_size_follows_aspect_ratio() {
        assert!((calculate_font_size(400.0, 100.0, 12.0) - 8.4).abs() < 1e-5);
        assert!((calculate_font_size(250.0, 100.0, 12.0) - 9.6).abs() < 1e-5);
        assert!((calculate_font_size(40.0, 100.0, 12.0) - 14.4).abs() < 1e-5);
        assert!((calculate_font_size(100.0, 100.0, 12.0) - 12.0).abs() < 1e-5);
    }

    #[test]
    fn calculate_font_size_clamps_to_height_and_floor() {
        // 20 * 0.6 = 12 caps the 1.2x boost.
        assert!((calculate_font_size(40.0, 20.0, 20.0) - 12.0).abs() < 1e-5);
        // Tiny boxes still get the 8pt floor.
        assert_eq!(calculate_font_size(10.0, 5.0, 12.0), 8.0);
    }

    #[test]
    fn preview_font_size_clamps_between_12_and_48() {
        let native = Size::new(800.0, 600.0);
        // base = 12, min(30, 20, 12) = 12.
        assert!((preview_font_size(200.0, 50.0, native) - 12.0).abs() < 1e-3);
        let huge = Size::new(8000.0, 6000.0);
        assert_eq!(preview_font_size(2000.0, 500.0, huge), 48.0);
        assert!((preview_font_size(10.0, 5.0, native) - 12.0).abs() < 1e-3);
        let mid = Size::new(2000.0, 1500.0);
        assert!((preview_font_size(300.0, 100.0, mid) - 30.0).abs() < 1e-3);
    }

    #[test]
    fn vector_text_classifier_is_total() {
        for text in ["Hello World", "john.doe@example.com", "A-1_b", "line\tbreak"] {
            assert!(is_vector_text_eligible(text), "{text}");
        }
        for text in ["สวัสดี", "Café", "a+b", "", "50%", "名前"] {
            assert!(!is_vector_text_eligible(text), "{text}");
        }
    }

    #[test]
    fn whitespace_set_matches_editor_label_check() {
        assert!(is_vector_text_eligible("a\u{FEFF}b"));
        assert!(is_vector_text_eligible("a\u{3000}b\u{2028}c"));
        assert!(!is_vector_text_eligible("a\u{85}b"));
        assert!(!is_vector_text_eligible("a\u{180E}b"));
        assert!(is_ecmascript_whitespace('\u{200A}'));
        assert!(!is_ecmascript_whitespace('\u{200B}'));
    }
}
