use crate::error::FieldStampError;
use crate::layout::{TextMeasure, is_ecmascript_whitespace};
use rustybuzz::{Face as HbFace, UnicodeBuffer};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// First and last WinAnsi codes written into embedded TrueType width tables.
/// Vector text is restricted to printable ASCII, so nothing above 126 is used.
pub(crate) const WIDTH_FIRST_CHAR: u8 = 32;
pub(crate) const WIDTH_LAST_CHAR: u8 = 126;

#[derive(Debug, Default)]
pub struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
}

#[derive(Debug)]
pub(crate) struct RegisteredFont {
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
    pub(crate) metrics: FontMetrics,
    pub(crate) program_kind: FontProgramKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FontProgramKind {
    TrueType,
    OpenTypeCff,
}

/// Metrics in 1000-unit glyph space, as PDF font dictionaries expect them.
#[derive(Debug)]
pub(crate) struct FontMetrics {
    pub(crate) widths: Vec<u16>,
    pub(crate) ascent: i16,
    pub(crate) descent: i16,
    pub(crate) cap_height: i16,
    pub(crate) italic_angle: i16,
    pub(crate) bbox: (i16, i16, i16, i16),
    pub(crate) missing_width: u16,
    pub(crate) is_fixed_pitch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GlyphPlacement {
    pub(crate) glyph_id: u16,
    /// Pen position in y-down device space.
    pub(crate) origin_x: f32,
    pub(crate) origin_y: f32,
    pub(crate) scale: f32,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn register_dir(&mut self, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        let Ok(entries) = fs::read_dir(path) else {
            log::debug!("font dir {} is not readable", path.display());
            return 0;
        };
        let mut registered = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && self.register_file(&path).is_ok() {
                registered += 1;
            }
        }
        registered
    }

    pub fn register_file(&mut self, path: impl AsRef<Path>) -> Result<String, FieldStampError> {
        let path = path.as_ref();
        if !is_supported_font_path(path) {
            return Err(FieldStampError::Asset(format!(
                "unsupported font file {}",
                path.display()
            )));
        }
        let data = fs::read(path)?;
        self.register_bytes(data, Some(&path.to_string_lossy()))
    }

    pub fn register_bytes(
        &mut self,
        data: Vec<u8>,
        source_name: Option<&str>,
    ) -> Result<String, FieldStampError> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let Ok(face) = ttf_parser::Face::parse(&data, 0) else {
            return Err(FieldStampError::Asset(format!(
                "invalid font data for {source}"
            )));
        };

        let (name, aliases) = font_names(&face, Path::new(source));
        let (metrics, program_kind) = FontMetrics::from_face(&face);
        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.clone(),
            data,
            metrics,
            program_kind,
        });

        for alias in std::iter::once(name.clone()).chain(aliases) {
            let key = normalize_name(&alias);
            if key.is_empty() || self.lookup.contains_key(&key) {
                continue;
            }
            self.lookup.insert(key, index);
        }
        log::debug!("registered font {name} from {source}");
        Ok(name)
    }

    /// Looks up the OS font directories for each family not yet registered.
    pub fn discover_system_fonts(&mut self, families: &[String]) -> usize {
        let dirs = system_font_dirs();
        let mut registered = 0;
        for family in families {
            if self.resolve(family).is_some() {
                continue;
            }
            'family: for file_name in system_font_file_candidates(family) {
                for dir in &dirs {
                    let path = dir.join(&file_name);
                    if !path.is_file() {
                        continue;
                    }
                    match fs::read(&path) {
                        Ok(bytes) => {
                            if self.register_bytes(bytes, Some(family)).is_ok() {
                                registered += 1;
                                break 'family;
                            }
                        }
                        Err(err) => log::debug!("skipping {}: {err}", path.display()),
                    }
                }
            }
        }
        registered
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<&RegisteredFont> {
        let key = normalize_name(name);
        self.lookup
            .get(&key)
            .and_then(|index| self.fonts.get(*index))
    }

    pub(crate) fn resolve_first(&self, families: &[String]) -> Option<&RegisteredFont> {
        families.iter().find_map(|family| self.resolve(family))
    }

    /// Every family in `families` that resolves, in order.
    pub(crate) fn resolve_all(&self, families: &[String]) -> Vec<&RegisteredFont> {
        families
            .iter()
            .filter_map(|family| self.resolve(family))
            .collect()
    }

    /// First family that has a glyph for every visible char of `text`.
    pub(crate) fn resolve_covering(
        &self,
        families: &[String],
        text: &str,
    ) -> Option<&RegisteredFont> {
        families
            .iter()
            .filter_map(|family| self.resolve(family))
            .find(|font| font.covers(text))
    }

    /// Shaped advance width. Unresolved fonts fall back to 0.6em per char.
    pub(crate) fn measure_text_width(
        font: Option<&RegisteredFont>,
        font_size: f32,
        text: &str,
    ) -> f32 {
        let Some(font) = font else {
            return fallback_width(font_size, text);
        };
        measure_text_width_full(font, font_size, text)
            .unwrap_or_else(|| fallback_width(font_size, text))
    }
}

impl RegisteredFont {
    /// True when the cmap maps every non-whitespace char to a real glyph.
    pub(crate) fn covers(&self, text: &str) -> bool {
        let Ok(face) = ttf_parser::Face::parse(&self.data, 0) else {
            return false;
        };
        text.chars()
            .filter(|ch| !ch.is_whitespace() && !is_ecmascript_whitespace(*ch))
            .all(|ch| face.glyph_index(ch).is_some_and(|id| id.0 != 0))
    }

    /// Distance from the top of the em box to the baseline.
    pub(crate) fn ascent_px(&self, font_size: f32) -> f32 {
        self.metrics.ascent.max(0) as f32 / 1000.0 * font_size
    }

    /// Shaped glyphs for one line, positioned in y-down device space.
    /// Unmapped glyphs (id 0) are left out.
    pub(crate) fn glyph_run(
        &self,
        text: &str,
        font_size: f32,
        baseline_x: f32,
        baseline_y: f32,
    ) -> Vec<GlyphPlacement> {
        let Some(face) = HbFace::from_slice(&self.data, 0) else {
            return Vec::new();
        };
        let scale = font_size / face.units_per_em().max(1) as f32;
        let mut buffer = UnicodeBuffer::new();
        buffer.push_str(text);
        let shaped = rustybuzz::shape(&face, &[], buffer);

        let (mut pen_x, mut pen_y) = (baseline_x, baseline_y);
        shaped
            .glyph_infos()
            .iter()
            .zip(shaped.glyph_positions())
            .filter_map(|(info, pos)| {
                let origin_x = pen_x + pos.x_offset as f32 * scale;
                let origin_y = pen_y - pos.y_offset as f32 * scale;
                pen_x += pos.x_advance as f32 * scale;
                pen_y -= pos.y_advance as f32 * scale;
                let glyph_id = u16::try_from(info.glyph_id).ok().filter(|id| *id != 0)?;
                Some(GlyphPlacement {
                    glyph_id,
                    origin_x,
                    origin_y,
                    scale,
                })
            })
            .collect()
    }
}

/// `TextMeasure` over the first registered family in a fallback list.
pub struct FontMeasure<'a> {
    font: Option<&'a RegisteredFont>,
}

impl<'a> FontMeasure<'a> {
    pub fn new(registry: &'a FontRegistry, families: &[String]) -> Self {
        Self {
            font: registry.resolve_first(families),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.font.is_some()
    }
}

impl TextMeasure for FontMeasure<'_> {
    fn measure(&self, text: &str, font_size: f32) -> f32 {
        FontRegistry::measure_text_width(self.font, font_size, text)
    }
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> (Self, FontProgramKind) {
        let scale = 1000.0 / face.units_per_em().max(1) as f32;
        let widths = (WIDTH_FIRST_CHAR..=WIDTH_LAST_CHAR)
            .map(|code| {
                let advance = face
                    .glyph_index(code as char)
                    .and_then(|id| face.glyph_hor_advance(id))
                    .unwrap_or(0);
                let scaled = (advance as f32 * scale).round() as i32;
                scaled.clamp(0, u16::MAX as i32) as u16
            })
            .collect::<Vec<_>>();
        let missing_width = widths.first().copied().unwrap_or(0);
        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);
        let program_kind = if face.tables().cff.is_some() {
            FontProgramKind::OpenTypeCff
        } else {
            FontProgramKind::TrueType
        };

        (
            Self {
                widths,
                ascent,
                descent,
                cap_height,
                italic_angle,
                bbox,
                missing_width,
                is_fixed_pitch: face.is_monospaced(),
            },
            program_kind,
        )
    }
}

fn fallback_width(font_size: f32, text: &str) -> f32 {
    let char_width = (font_size * 0.6).max(1.0);
    char_width * text.chars().count() as f32
}

fn measure_text_width_full(font: &RegisteredFont, font_size: f32, text: &str) -> Option<f32> {
    let face = HbFace::from_slice(&font.data, 0)?;
    let units_per_em = face.units_per_em().max(1) as f32;

    let mut buffer = UnicodeBuffer::new();
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let positions = output.glyph_positions();
    if positions.is_empty() {
        return None;
    }
    let total_units: i64 = positions.iter().map(|pos| pos.x_advance as i64).sum();
    Some((total_units.max(0) as f32 / units_per_em) * font_size)
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Primary name plus aliases. The PostScript name wins because document
/// embedding writes it as `BaseFont`.
fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let lookup = |ids: &[u16]| {
        face.names()
            .into_iter()
            .filter(|entry| ids.contains(&entry.name_id))
            .find_map(|entry| entry.to_string())
    };
    let post = lookup(&[name_id::POST_SCRIPT_NAME]);
    let full = lookup(&[name_id::FULL_NAME]);
    let family = lookup(&[name_id::TYPOGRAPHIC_FAMILY, name_id::FAMILY]);
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string);

    let mut names = [post, full, family, stem].into_iter().flatten();
    let primary = names.next().unwrap_or_else(|| "EmbeddedFont".to_string());
    let aliases = names.filter(|alias| *alias != primary).collect();
    (primary, aliases)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

pub(crate) fn is_supported_font_path(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
        return false;
    };
    matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf")
}

#[cfg(windows)]
const SYSTEM_FONT_ROOTS: &[&str] = &[r"C:\Windows\Fonts"];
#[cfg(target_os = "macos")]
const SYSTEM_FONT_ROOTS: &[&str] = &[
    "/System/Library/Fonts",
    "/System/Library/Fonts/Supplemental",
    "/Library/Fonts",
];
#[cfg(all(unix, not(target_os = "macos")))]
const SYSTEM_FONT_ROOTS: &[&str] = &["/usr/share/fonts", "/usr/local/share/fonts"];
#[cfg(not(any(windows, unix)))]
const SYSTEM_FONT_ROOTS: &[&str] = &[];

/// Distro packages nest fonts like `truetype/dejavu/`, so roots are walked a
/// few levels down.
const SYSTEM_FONT_DIR_DEPTH: usize = 3;

fn system_font_dirs() -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = SYSTEM_FONT_ROOTS.iter().map(PathBuf::from).collect();
    if let Ok(home) = std::env::var("HOME") {
        roots.push(Path::new(&home).join(".fonts"));
        roots.push(Path::new(&home).join(".local/share/fonts"));
    }
    let mut dirs = Vec::new();
    for root in roots {
        collect_font_dirs(root, SYSTEM_FONT_DIR_DEPTH, &mut dirs);
    }
    dirs
}

fn collect_font_dirs(dir: PathBuf, depth: usize, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(&dir) else {
        return;
    };
    let children: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    out.push(dir);
    if depth == 0 {
        return;
    }
    for child in children {
        collect_font_dirs(child, depth - 1, out);
    }
}

fn system_font_file_candidates(family: &str) -> Vec<String> {
    let normalized = normalize_name(family).replace([' ', '-', '_'], "");
    let known: &[&str] = match normalized.as_str() {
        "sarabun" | "thsarabun" | "thsarabunnew" => &[
            "Sarabun-Regular.ttf",
            "THSarabunNew.ttf",
            "THSarabun.ttf",
        ],
        "notosansthai" => &[
            "NotoSansThai-Regular.ttf",
            "NotoSansThaiUI-Regular.ttf",
        ],
        "arial" | "helvetica" | "sansserif" => &[
            "arial.ttf",
            "Arial.ttf",
            "Arial Unicode.ttf",
            "LiberationSans-Regular.ttf",
        ],
        "dejavusans" => &["DejaVuSans.ttf"],
        "liberationsans" => &["LiberationSans-Regular.ttf"],
        "timesnewroman" | "times" | "timesroman" => &[
            "times.ttf",
            "Times New Roman.ttf",
            "LiberationSerif-Regular.ttf",
        ],
        _ => &[],
    };
    let mut out: Vec<String> = known.iter().map(|v| v.to_string()).collect();
    if out.is_empty() {
        // Guess the common file-name shapes for an unknown family.
        let stem = family.trim().replace(' ', "");
        if !stem.is_empty() {
            out.push(format!("{stem}-Regular.ttf"));
            out.push(format!("{stem}.ttf"));
            out.push(format!("{stem}-Regular.otf"));
        }
    }
    out
}
