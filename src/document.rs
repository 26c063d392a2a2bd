use crate::composite::RenderContext;
use crate::error::FieldStampError;
use crate::font::{
    FontProgramKind, FontRegistry, RegisteredFont, WIDTH_FIRST_CHAR, WIDTH_LAST_CHAR,
};
use crate::geometry::{BoundsMapping, map_rect, to_document_space};
use crate::layout::{calculate_font_size, is_ecmascript_whitespace, is_vector_text_eligible};
use crate::metrics::CompositeMetrics;
use crate::render::render_check_mark;
use crate::surface::{PixmapSurface, RgbaRaster, Surface};
use crate::types::{Color, Field, FieldKind, Point, Rect, Size};
use lopdf::{
    Dictionary as LoDictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId,
    Stream as LoStream, dictionary,
};
use std::collections::BTreeSet;

/// Font size used when rasterizing check marks for documents.
const CHECK_RASTER_FONT_SIZE: f32 = 12.0;
/// Raster text is drawn at this multiple of its layout size, then scaled back.
const RASTER_TEXT_SCALE: f32 = 2.0;
const RASTER_TEXT_PADDING: f32 = 5.0;
/// Largest side, in pixels, of any per-field raster.
const MAX_RASTER_SIDE: f32 = 16_384.0;
/// Parent chains deeper than this are treated as malformed.
const MAX_INHERIT_DEPTH: usize = 32;

/// One entry in the document font fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentFont {
    /// One of the 14 standard PDF fonts, referenced by name only.
    Standard(String),
    /// A family from the compositor's font registry, embedded as TrueType.
    Registered(String),
}

impl DocumentFont {
    pub fn label(&self) -> &str {
        match self {
            DocumentFont::Standard(name) | DocumentFont::Registered(name) => name,
        }
    }
}

pub(crate) fn default_document_fonts() -> Vec<DocumentFont> {
    vec![
        DocumentFont::Standard("Helvetica".to_string()),
        DocumentFont::Standard("Times-Roman".to_string()),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInfo {
    pub version: String,
    /// Native size of each page, in page order.
    pub page_sizes: Vec<Size>,
    pub encrypted: bool,
}

impl DocumentInfo {
    pub fn page_count(&self) -> usize {
        self.page_sizes.len()
    }
}

pub(crate) fn inspect_document(bytes: &[u8]) -> Result<DocumentInfo, FieldStampError> {
    let doc = LoDocument::load_mem(bytes)?;
    let page_sizes = doc
        .get_pages()
        .values()
        .map(|page_id| page_size_for_id(&doc, *page_id))
        .collect();
    Ok(DocumentInfo {
        version: doc.version.clone(),
        page_sizes,
        encrypted: doc.is_encrypted(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlacedField {
    CheckMark,
    VectorText,
    RasterText,
    Blank,
}

pub(crate) fn generate_composite_document(
    ctx: &RenderContext<'_>,
    pdf: &[u8],
    fields: &[Field],
    page_number: usize,
    mapping: &BoundsMapping,
) -> Result<(Vec<u8>, CompositeMetrics), FieldStampError> {
    let mut doc = LoDocument::load_mem(pdf)?;
    if doc.is_encrypted() {
        return Err(FieldStampError::Document(
            "encrypted documents are not supported".to_string(),
        ));
    }

    let pages = doc.get_pages();
    let available = pages.len();
    let page_id = u32::try_from(page_number)
        .ok()
        .filter(|number| *number >= 1)
        .and_then(|number| pages.get(&number).copied())
        .ok_or(FieldStampError::PageOutOfRange {
            requested: page_number,
            available,
        })?;
    let page_size = page_size_for_id(&doc, page_id);
    log::debug!(
        "compositing {} fields onto page {page_number} ({}x{})",
        fields.len(),
        page_size.width,
        page_size.height
    );

    let font_id = embed_font_chain(&mut doc, ctx)?;
    let resources = inherited_dict(&doc, page_id, b"Resources");
    let mut overlay = PageOverlay::new(&doc, &resources);

    let mut metrics = CompositeMetrics::new(fields.len());
    for (index, field) in fields.iter().enumerate() {
        if !field.is_renderable() {
            metrics.skipped += 1;
            ctx.trace("document", index, field, "skipped", "non-positive or non-finite size");
            continue;
        }
        let target = to_document_space(map_rect(field.rect, mapping), page_size.height);
        match place_field(&mut doc, ctx, &mut overlay, field, target) {
            Ok(PlacedField::Blank) => {
                metrics.blank += 1;
                ctx.trace("document", index, field, "blank", "");
            }
            Ok(placed) => {
                metrics.drawn += 1;
                match placed {
                    PlacedField::VectorText => metrics.vector_text += 1,
                    PlacedField::RasterText => metrics.raster_text += 1,
                    PlacedField::CheckMark | PlacedField::Blank => {}
                }
                ctx.trace("document", index, field, "drawn", &format!("{placed:?}"));
            }
            Err(err) => {
                metrics.failed += 1;
                log::warn!("skipping {} field {index}: {err}", field.kind.as_str());
                ctx.trace("document", index, field, "failed", &err.to_string());
            }
        }
    }

    apply_overlay(&mut doc, page_id, resources, font_id, overlay)?;

    doc.compress();
    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|err| FieldStampError::Document(format!("pdf save failed: {err}")))?;
    metrics.output_bytes = out.len();
    Ok((out, metrics))
}

fn place_field(
    doc: &mut LoDocument,
    ctx: &RenderContext<'_>,
    overlay: &mut PageOverlay,
    field: &Field,
    target: Rect,
) -> Result<PlacedField, FieldStampError> {
    if !target.is_finite() {
        return Err(FieldStampError::Render(format!(
            "non-finite document rect {target:?}"
        )));
    }
    match &field.kind {
        FieldKind::CheckMark => {
            let raster = rasterize_check_mark(ctx, target)?;
            let image_id = embed_raster(doc, raster);
            overlay.draw_image(image_id, target);
            Ok(PlacedField::CheckMark)
        }
        FieldKind::TextLabel { .. } => {
            let Some(text) = field.trimmed_label() else {
                return Ok(PlacedField::Blank);
            };
            if is_vector_text_eligible(text) {
                overlay.draw_text(
                    text,
                    Point::new(target.x, target.y),
                    ctx.options.document_text_size,
                    ctx.options.document_text_color,
                );
                return Ok(PlacedField::VectorText);
            }
            let (raster, placed) = rasterize_text(ctx, text, target)?;
            let image_id = embed_raster(doc, raster);
            let placed = Rect::new(target.x, target.y, placed.width, placed.height);
            overlay.draw_image(image_id, placed);
            Ok(PlacedField::RasterText)
        }
    }
}

fn raster_dimension(value: f32) -> Result<u32, FieldStampError> {
    let side = value.ceil().max(1.0);
    if !side.is_finite() || side > MAX_RASTER_SIDE {
        return Err(FieldStampError::Render(format!(
            "field raster side {value} exceeds {MAX_RASTER_SIDE}"
        )));
    }
    Ok(side as u32)
}

fn rasterize_check_mark(
    ctx: &RenderContext<'_>,
    target: Rect,
) -> Result<RgbaRaster, FieldStampError> {
    let mut surface = PixmapSurface::new(
        raster_dimension(target.width)?,
        raster_dimension(target.height)?,
        Vec::new(),
    )?;
    let style = ctx.options.preview_style.with_font_size(CHECK_RASTER_FONT_SIZE);
    render_check_mark(
        &mut surface,
        Rect::new(0.0, 0.0, target.width, target.height),
        &style,
    )?;
    Ok(surface.into_rgba())
}

/// Renders `text` at double resolution on white with the first raster family
/// that covers it. Returns the pixels and the size they occupy on the page.
fn rasterize_text(
    ctx: &RenderContext<'_>,
    text: &str,
    target: Rect,
) -> Result<(RgbaRaster, Size), FieldStampError> {
    let font = ctx.raster_font_for(text).ok_or_else(|| {
        FieldStampError::Render(format!(
            "no raster font covers {text:?} (tried {})",
            ctx.options.raster_font_families.join(", ")
        ))
    })?;
    let font_size =
        calculate_font_size(target.width, target.height, ctx.options.document_text_size);
    let raster_size = font_size * RASTER_TEXT_SCALE;
    let text_width = FontRegistry::measure_text_width(Some(font), raster_size, text);
    let padded_width = text_width + RASTER_TEXT_PADDING * 2.0;
    let padded_height = raster_size + RASTER_TEXT_PADDING * 2.0;

    let mut surface = PixmapSurface::new(
        raster_dimension(padded_width.max(target.width))?,
        raster_dimension(padded_height.max(target.height))?,
        vec![font],
    )?;
    let canvas = surface.size();
    surface.fill_rect(Rect::new(0.0, 0.0, canvas.width, canvas.height), Color::WHITE)?;
    surface.fill_text(
        text,
        Point::new(RASTER_TEXT_PADDING, RASTER_TEXT_PADDING),
        raster_size,
        Color::BLACK,
    )?;
    let placed = Size::new(
        (padded_width / RASTER_TEXT_SCALE).min(target.width),
        (padded_height / RASTER_TEXT_SCALE).min(target.height),
    );
    Ok((surface.into_rgba(), placed))
}

/// Adds `raster` as an RGB image XObject, with an SMask when any pixel is not
/// opaque. Streams are left raw; `compress` deflates them before save.
fn embed_raster(doc: &mut LoDocument, raster: RgbaRaster) -> LoObjectId {
    let RgbaRaster {
        width,
        height,
        data,
    } = raster;
    let pixels = data.len() / 4;
    let mut rgb = Vec::with_capacity(pixels * 3);
    let mut alpha = Vec::with_capacity(pixels);
    for pixel in data.chunks_exact(4) {
        rgb.extend_from_slice(&pixel[..3]);
        alpha.push(pixel[3]);
    }
    let has_alpha = alpha.iter().any(|a| *a != 255);

    let mut image_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => LoObject::Integer(i64::from(width)),
        "Height" => LoObject::Integer(i64::from(height)),
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    if has_alpha {
        let smask_id = doc.add_object(LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => LoObject::Integer(i64::from(width)),
                "Height" => LoObject::Integer(i64::from(height)),
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        ));
        image_dict.set("SMask", smask_id);
    }
    doc.add_object(LoStream::new(image_dict, rgb))
}

/// Operators and resources accumulated for the target page.
struct PageOverlay {
    content: String,
    font_name: String,
    taken_xobjects: BTreeSet<Vec<u8>>,
    images: Vec<(String, LoObjectId)>,
}

impl PageOverlay {
    fn new(doc: &LoDocument, resources: &LoDictionary) -> Self {
        let fonts = resource_subdict(doc, resources, b"Font");
        let xobjects = resource_subdict(doc, resources, b"XObject");
        let font_name = unused_name(&key_set(&fonts), "FsF");
        Self {
            content: String::new(),
            font_name,
            taken_xobjects: key_set(&xobjects),
            images: Vec::new(),
        }
    }

    fn draw_image(&mut self, image_id: LoObjectId, rect: Rect) {
        let name = unused_name(&self.taken_xobjects, "FsIm");
        self.taken_xobjects.insert(name.as_bytes().to_vec());
        self.content.push_str(&format!(
            "q {} 0 0 {} {} {} cm /{} Do Q\n",
            fmt(rect.width),
            fmt(rect.height),
            fmt(rect.x),
            fmt(rect.y),
            name
        ));
        self.images.push((name, image_id));
    }

    fn draw_text(&mut self, text: &str, origin: Point, font_size: f32, color: Color) {
        self.content.push_str(&format!(
            "BT /{} {} Tf {} {} {} rg {} {} Td ({}) Tj ET\n",
            self.font_name,
            fmt(font_size),
            fmt(color.r),
            fmt(color.g),
            fmt(color.b),
            fmt(origin.x),
            fmt(origin.y),
            encode_vector_text(text)
        ));
    }
}

fn key_set(dict: &LoDictionary) -> BTreeSet<Vec<u8>> {
    dict.iter().map(|(key, _)| key.clone()).collect()
}

fn unused_name(taken: &BTreeSet<Vec<u8>>, prefix: &str) -> String {
    let mut n = 1usize;
    loop {
        let candidate = format!("{prefix}{n}");
        if !taken.contains(candidate.as_bytes()) {
            return candidate;
        }
        n += 1;
    }
}

/// Wraps the existing content in `q … Q`, appends the overlay stream and
/// writes the merged resources inline on the page.
fn apply_overlay(
    doc: &mut LoDocument,
    page_id: LoObjectId,
    mut resources: LoDictionary,
    font_id: LoObjectId,
    overlay: PageOverlay,
) -> Result<(), FieldStampError> {
    let mut fonts = resource_subdict(doc, &resources, b"Font");
    fonts.set(overlay.font_name.as_bytes().to_vec(), font_id);
    resources.set("Font", LoObject::Dictionary(fonts));
    if !overlay.images.is_empty() {
        let mut xobjects = resource_subdict(doc, &resources, b"XObject");
        for (name, image_id) in &overlay.images {
            xobjects.set(name.as_bytes().to_vec(), *image_id);
        }
        resources.set("XObject", LoObject::Dictionary(xobjects));
    }

    let page = doc.get_object(page_id).and_then(LoObject::as_dict)?;
    let existing = page_content_refs(doc, page);

    let open_id = doc.add_object(LoStream::new(dictionary! {}, b"q\n".to_vec()));
    let close_id = doc.add_object(LoStream::new(dictionary! {}, b"\nQ\n".to_vec()));
    let overlay_id = doc.add_object(LoStream::new(dictionary! {}, overlay.content.into_bytes()));
    let mut contents = Vec::with_capacity(existing.len() + 3);
    contents.push(LoObject::Reference(open_id));
    contents.extend(existing);
    contents.push(LoObject::Reference(close_id));
    contents.push(LoObject::Reference(overlay_id));

    let page_mut = doc.get_object_mut(page_id).and_then(LoObject::as_dict_mut)?;
    page_mut.set("Resources", LoObject::Dictionary(resources));
    page_mut.set("Contents", LoObject::Array(contents));
    Ok(())
}

fn page_content_refs(doc: &LoDocument, page: &LoDictionary) -> Vec<LoObject> {
    match page.get(b"Contents") {
        Ok(LoObject::Reference(id)) => match doc.get_object(*id) {
            Ok(LoObject::Array(items)) => items.clone(),
            _ => vec![LoObject::Reference(*id)],
        },
        Ok(LoObject::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

fn resolve<'a>(doc: &'a LoDocument, object: &'a LoObject) -> Option<&'a LoObject> {
    match object {
        LoObject::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Looks `key` up on the page, then on each ancestor `Pages` node.
fn inherited_attribute<'a>(
    doc: &'a LoDocument,
    page_id: LoObjectId,
    key: &[u8],
) -> Option<&'a LoObject> {
    let mut node = doc.get_object(page_id).and_then(LoObject::as_dict).ok()?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = node.get(key) {
            return resolve(doc, value);
        }
        let parent = node.get(b"Parent").and_then(LoObject::as_reference).ok()?;
        node = doc.get_object(parent).and_then(LoObject::as_dict).ok()?;
    }
    None
}

fn inherited_dict(doc: &LoDocument, page_id: LoObjectId, key: &[u8]) -> LoDictionary {
    inherited_attribute(doc, page_id, key)
        .and_then(|object| object.as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

fn resource_subdict(doc: &LoDocument, resources: &LoDictionary, key: &[u8]) -> LoDictionary {
    resources
        .get(key)
        .ok()
        .and_then(|object| resolve(doc, object))
        .and_then(|object| object.as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

/// MediaBox size, inherited if needed. US Letter when absent or malformed.
fn page_size_for_id(doc: &LoDocument, page_id: LoObjectId) -> Size {
    let Some(values) = inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|object| object.as_array().ok())
    else {
        return Size::letter();
    };
    let numbers: Vec<f32> = values
        .iter()
        .filter_map(|value| resolve(doc, value).and_then(|v| v.as_float().ok()))
        .collect();
    match numbers[..] {
        [x0, y0, x1, y1] if (x1 - x0).abs() > 0.0 && (y1 - y0).abs() > 0.0 => {
            Size::new((x1 - x0).abs(), (y1 - y0).abs())
        }
        _ => Size::letter(),
    }
}

fn embed_font_chain(
    doc: &mut LoDocument,
    ctx: &RenderContext<'_>,
) -> Result<LoObjectId, FieldStampError> {
    let mut tried = Vec::new();
    for font in &ctx.options.document_fonts {
        match embed_font(doc, ctx.registry, font) {
            Ok(font_id) => {
                log::debug!("document font {} embedded", font.label());
                return Ok(font_id);
            }
            Err(err) => {
                log::warn!("document font {} unavailable: {err}", font.label());
                tried.push(font.label().to_string());
            }
        }
    }
    Err(FieldStampError::FontUnavailable { tried })
}

fn embed_font(
    doc: &mut LoDocument,
    registry: &FontRegistry,
    font: &DocumentFont,
) -> Result<LoObjectId, FieldStampError> {
    match font {
        DocumentFont::Standard(name) => {
            let base = standard_font_name(name).ok_or_else(|| {
                FieldStampError::Config(format!("{name} is not a standard PDF font"))
            })?;
            Ok(doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => base,
                "Encoding" => "WinAnsiEncoding",
            }))
        }
        DocumentFont::Registered(family) => {
            let registered = registry.resolve(family).ok_or_else(|| {
                FieldStampError::Config(format!("font family {family} is not registered"))
            })?;
            embed_truetype(doc, registered)
        }
    }
}

fn embed_truetype(
    doc: &mut LoDocument,
    font: &RegisteredFont,
) -> Result<LoObjectId, FieldStampError> {
    if font.program_kind == FontProgramKind::OpenTypeCff {
        return Err(FieldStampError::Config(format!(
            "{} has CFF outlines; only TrueType programs are embedded",
            font.name
        )));
    }
    let base = sanitize_font_name(&font.name);
    let metrics = &font.metrics;

    let file_id = doc.add_object(LoStream::new(
        dictionary! { "Length1" => LoObject::Integer(font.data.len() as i64) },
        font.data.clone(),
    ));
    // Nonsymbolic, plus FixedPitch for monospaced faces.
    let flags: i64 = if metrics.is_fixed_pitch { 32 | 1 } else { 32 };
    let (x_min, y_min, x_max, y_max) = metrics.bbox;
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => LoObject::Name(base.as_bytes().to_vec()),
        "Flags" => flags,
        "FontBBox" => vec![
            LoObject::Integer(i64::from(x_min)),
            LoObject::Integer(i64::from(y_min)),
            LoObject::Integer(i64::from(x_max)),
            LoObject::Integer(i64::from(y_max)),
        ],
        "ItalicAngle" => LoObject::Integer(i64::from(metrics.italic_angle)),
        "Ascent" => LoObject::Integer(i64::from(metrics.ascent)),
        "Descent" => LoObject::Integer(i64::from(metrics.descent)),
        "CapHeight" => LoObject::Integer(i64::from(metrics.cap_height)),
        "StemV" => 80,
        "MissingWidth" => LoObject::Integer(i64::from(metrics.missing_width)),
        "FontFile2" => file_id,
    });
    let widths = metrics
        .widths
        .iter()
        .map(|width| LoObject::Integer(i64::from(*width)))
        .collect::<Vec<_>>();
    Ok(doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "TrueType",
        "BaseFont" => LoObject::Name(base.into_bytes()),
        "FirstChar" => LoObject::Integer(i64::from(WIDTH_FIRST_CHAR)),
        "LastChar" => LoObject::Integer(i64::from(WIDTH_LAST_CHAR)),
        "Widths" => widths,
        "FontDescriptor" => descriptor_id,
        "Encoding" => "WinAnsiEncoding",
    }))
}

fn standard_font_name(name: &str) -> Option<&'static str> {
    let normalized = name
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase();
    let base = match normalized.as_str() {
        "courier" => "Courier",
        "courier-bold" => "Courier-Bold",
        "courier-oblique" => "Courier-Oblique",
        "courier-boldoblique" => "Courier-BoldOblique",
        "helvetica" => "Helvetica",
        "helvetica-bold" => "Helvetica-Bold",
        "helvetica-oblique" => "Helvetica-Oblique",
        "helvetica-boldoblique" => "Helvetica-BoldOblique",
        "times-roman" => "Times-Roman",
        "times-bold" => "Times-Bold",
        "times-italic" => "Times-Italic",
        "times-bolditalic" => "Times-BoldItalic",
        "symbol" => "Symbol",
        "zapfdingbats" => "ZapfDingbats",
        _ => return None,
    };
    Some(base)
}

fn sanitize_font_name(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if ch == ' ' {
            out.push('-');
        }
    }
    if out.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        out
    }
}

/// Literal-string body for vector text. Callers pass only vector-eligible
/// text; any whitespace outside ASCII is written as a plain space.
fn encode_vector_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            c if c.is_ascii_graphic() || c == ' ' => out.push(c),
            c if is_ecmascript_whitespace(c) => out.push(' '),
            _ => out.push('?'),
        }
    }
    out
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    format_milli((value as f64 * 1000.0).round() as i64)
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        return format!("{sign}{int_part}");
    }
    let mut s = format!("{sign}{int_part}.{frac_part:03}");
    while s.ends_with('0') {
        s.pop();
    }
    s
}
