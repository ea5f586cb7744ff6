// THEORY:
// Text is rasterized into plain RGBA canvases that become tile textures. All
// layout decisions (wrapping, alignment, vertical centring) live here and are
// expressed against a small `TextPainter` trait, so the same layout runs on
// real fonts or on a font-free stand-in.
//
// Key architectural principles:
// 1.  **Painter Seam**: `CosmicPainter` shapes with cosmic-text (bidi aware, so
//     Hebrew runs right-to-left) and rasterizes with swash. `BoxPainter` draws
//     glyph boxes with deterministic metrics for headless runs and tests.
// 2.  **Fallback Fonts**: the configured families are looked up in the font
//     database. A missing family is logged once and shaping falls back to
//     whatever system font covers the text.
// 3.  **Lines, Not Paragraphs**: the painter draws a single line at a time.
//     Wrapping is done by `wrap_words`, the same greedy word fill for every
//     caller.

use cosmic_text::{Attrs, Buffer, Color, Family, FontSystem, Metrics, Shaping, SwashCache, Weight};
use image::{Rgba, RgbaImage};
use std::path::Path;

const RTL_MARK: char = '\u{200F}';
const RTL_PUNCTUATION: [char; 15] = [',', '.', ':', ';', '?', '!', '"', '\'', '(', ')', '[', ']', '-', '–', '—'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontRole {
    Title,
    Author,
    Headline,
    Sentence,
    /// Whatever the platform offers.
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub role: FontRole,
    pub size: f32,
    pub bold: bool,
    pub color: Rgba<u8>,
}

impl TextStyle {
    pub fn new(role: FontRole, size: f32, color: Rgba<u8>) -> Self {
        Self { role, size, bold: false, color }
    }

    pub fn bold(mut self, bold: bool) -> Self {
        self.bold = bold;
        self
    }
}

/// Family names per role.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FontFamilies {
    pub title: String,
    pub author: String,
    pub headline: String,
    pub sentence: String,
}

impl Default for FontFamilies {
    fn default() -> Self {
        Self {
            title: "TheBasics".into(),
            author: "NarkissYair".into(),
            headline: "GretaText".into(),
            sentence: "GretaText".into(),
        }
    }
}

impl FontFamilies {
    fn name(&self, role: FontRole) -> Option<&str> {
        match role {
            FontRole::Title => Some(&self.title),
            FontRole::Author => Some(&self.author),
            FontRole::Headline => Some(&self.headline),
            FontRole::Sentence => Some(&self.sentence),
            FontRole::System => None,
        }
    }
}

pub trait TextPainter: Send {
    /// Advance width of `text` on a single line.
    fn measure(&mut self, text: &str, style: &TextStyle) -> f32;

    /// Draws `text` as one line. `y` is the vertical centre of the line; `x` is
    /// the left edge, centre or right edge depending on `align`.
    fn draw_line(&mut self, canvas: &mut RgbaImage, text: &str, style: &TextStyle, x: f32, y: f32, align: TextAlign);
}

pub struct CosmicPainter {
    font_system: FontSystem,
    swash: SwashCache,
    families: FontFamilies,
}

impl CosmicPainter {
    /// Loads system fonts plus every font file in `font_dir`, if given.
    pub fn new(families: FontFamilies, font_dir: Option<&Path>) -> Self {
        let mut font_system = FontSystem::new();
        if let Some(dir) = font_dir {
            let before = font_system.db().len();
            font_system.db_mut().load_fonts_dir(dir);
            tracing::debug!(dir = %dir.display(), faces = font_system.db().len() - before, "loaded custom fonts");
        }
        let mut families = families;
        for role in [FontRole::Title, FontRole::Author, FontRole::Headline, FontRole::Sentence] {
            let Some(name) = families.name(role) else { continue };
            let available = font_system
                .db()
                .faces()
                .any(|face| face.families.iter().any(|(family, _)| family.eq_ignore_ascii_case(name)));
            if !available {
                tracing::warn!(?role, family = name, "font family not found, falling back to a system font");
                let slot = match role {
                    FontRole::Title => &mut families.title,
                    FontRole::Author => &mut families.author,
                    FontRole::Headline => &mut families.headline,
                    FontRole::Sentence | FontRole::System => &mut families.sentence,
                };
                slot.clear();
            }
        }
        Self { font_system, swash: SwashCache::new(), families }
    }

    fn shape(&mut self, text: &str, style: &TextStyle) -> Buffer {
        let metrics = Metrics::new(style.size.max(1.0), style.size.max(1.0) * 1.2);
        let mut buffer = Buffer::new(&mut self.font_system, metrics);
        buffer.set_size(&mut self.font_system, None, None);
        let attrs = attrs_for(&self.families, style);
        buffer.set_text(&mut self.font_system, text, attrs, Shaping::Advanced);
        buffer.shape_until_scroll(&mut self.font_system, false);
        buffer
    }
}

fn attrs_for<'a>(families: &'a FontFamilies, style: &TextStyle) -> Attrs<'a> {
    let family = match families.name(style.role) {
        Some(name) if !name.is_empty() => Family::Name(name),
        _ => Family::SansSerif,
    };
    let attrs = Attrs::new().family(family);
    if style.bold { attrs.weight(Weight::BOLD) } else { attrs }
}

fn buffer_width(buffer: &Buffer) -> f32 {
    buffer.layout_runs().map(|run| run.line_w).fold(0.0, f32::max)
}

impl TextPainter for CosmicPainter {
    fn measure(&mut self, text: &str, style: &TextStyle) -> f32 {
        let buffer = self.shape(text, style);
        buffer_width(&buffer)
    }

    fn draw_line(&mut self, canvas: &mut RgbaImage, text: &str, style: &TextStyle, x: f32, y: f32, align: TextAlign) {
        if text.trim().is_empty() {
            return;
        }
        let buffer = self.shape(text, style);
        let width = buffer_width(&buffer);
        let left = aligned_left(x, width, align).round() as i32;
        let top = (y - buffer.metrics().line_height / 2.0).round() as i32;
        let [r, g, b, a] = style.color.0;
        buffer.draw(&mut self.font_system, &mut self.swash, Color::rgba(r, g, b, a), |gx, gy, w, h, color| {
            let rgba = Rgba([color.r(), color.g(), color.b(), color.a()]);
            fill_rect(canvas, left + gx, top + gy, w, h, rgba);
        });
    }
}

/// A font-free painter. Every non-space character is a box of
/// `0.45 x 0.7` ems on a `0.55` em advance.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoxPainter;

impl BoxPainter {
    const ADVANCE: f32 = 0.55;
}

impl TextPainter for BoxPainter {
    fn measure(&mut self, text: &str, style: &TextStyle) -> f32 {
        text.chars().filter(|c| *c != RTL_MARK).count() as f32 * style.size * Self::ADVANCE
    }

    fn draw_line(&mut self, canvas: &mut RgbaImage, text: &str, style: &TextStyle, x: f32, y: f32, align: TextAlign) {
        let width = self.measure(text, style);
        let mut pen = aligned_left(x, width, align);
        let glyph_w = (style.size * 0.45).max(1.0) as u32;
        let glyph_h = (style.size * 0.7).max(1.0) as u32;
        let top = (y - style.size * 0.35).round() as i32;
        for c in text.chars().filter(|c| *c != RTL_MARK) {
            if !c.is_whitespace() {
                fill_rect(canvas, pen.round() as i32, top, glyph_w, glyph_h, style.color);
            }
            pen += style.size * Self::ADVANCE;
        }
    }
}

fn aligned_left(x: f32, width: f32, align: TextAlign) -> f32 {
    match align {
        TextAlign::Left => x,
        TextAlign::Center => x - width / 2.0,
        TextAlign::Right => x - width,
    }
}

/// Source-over blend of a rectangle, clipped to the canvas.
pub fn fill_rect(canvas: &mut RgbaImage, x: i32, y: i32, w: u32, h: u32, color: Rgba<u8>) {
    let (cw, ch) = canvas.dimensions();
    let x0 = x.max(0) as u32;
    let y0 = y.max(0) as u32;
    let x1 = (x + w as i32).clamp(0, cw as i32) as u32;
    let y1 = (y + h as i32).clamp(0, ch as i32) as u32;
    for py in y0..y1 {
        for px in x0..x1 {
            blend_pixel(canvas.get_pixel_mut(px, py), color);
        }
    }
}

pub fn blend_pixel(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let alpha = u32::from(src[3]);
    if alpha == 0 {
        return;
    }
    if alpha == 255 {
        *dst = src;
        return;
    }
    let inv = 255 - alpha;
    for i in 0..3 {
        dst[i] = ((u32::from(src[i]) * alpha + u32::from(dst[i]) * inv) / 255) as u8;
    }
    dst[3] = (alpha + u32::from(dst[3]) * inv / 255).min(255) as u8;
}

/// Inserts a right-to-left mark before punctuation so it stays attached to the
/// Hebrew run it ends.
pub fn fix_hebrew_punctuation(text: &str) -> String {
    let mut fixed = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        if RTL_PUNCTUATION.contains(&c) {
            fixed.push(RTL_MARK);
        }
        fixed.push(c);
    }
    fixed
}

/// Greedy word wrap. A single word wider than `max_width` gets its own line.
pub fn wrap_words(text: &str, max_width: f32, mut measure: impl FnMut(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split(' ').filter(|w| !w.is_empty()) {
        let candidate = if current.is_empty() { word.to_string() } else { format!("{current} {word}") };
        if !current.is_empty() && measure(&candidate) > max_width {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Draws already-wrapped lines as a block vertically centred on `y`.
pub fn draw_block(
    painter: &mut dyn TextPainter,
    canvas: &mut RgbaImage,
    lines: &[(String, TextStyle)],
    x: f32,
    y: f32,
    line_height: f32,
    align: TextAlign,
) {
    let start = y - lines.len() as f32 * line_height / 2.0 + line_height / 2.0;
    for (i, (line, style)) in lines.iter().enumerate() {
        painter.draw_line(canvas, line, style, x, start + i as f32 * line_height, align);
    }
}

/// Wraps `text` to `max_width` and draws it centred on `y`.
#[allow(clippy::too_many_arguments)]
pub fn draw_wrapped(
    painter: &mut dyn TextPainter,
    canvas: &mut RgbaImage,
    text: &str,
    style: &TextStyle,
    x: f32,
    y: f32,
    max_width: f32,
    line_height: f32,
    align: TextAlign,
) {
    let lines: Vec<(String, TextStyle)> = wrap_words(text, max_width, |s| painter.measure(s, style))
        .into_iter()
        .map(|line| (line, *style))
        .collect();
    draw_block(painter, canvas, &lines, x, y, line_height, align);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const INK: Rgba<u8> = Rgba([0x44, 0x44, 0x44, 255]);

    #[test]
    fn wraps_greedily_by_measured_width() {
        let lines = wrap_words("aa bb cc dd", 5.0, |s| s.chars().count() as f32);
        assert_eq!(lines, vec!["aa bb".to_string(), "cc dd".to_string()]);
        let long = wrap_words("abcdefgh ij", 3.0, |s| s.chars().count() as f32);
        assert_eq!(long, vec!["abcdefgh".to_string(), "ij".to_string()]);
        assert!(wrap_words("   ", 3.0, |_| 0.0).is_empty());
    }

    #[test]
    fn marks_punctuation_for_rtl() {
        assert_eq!(fix_hebrew_punctuation("שלום, עולם."), "שלום\u{200F}, עולם\u{200F}.");
        assert_eq!(fix_hebrew_punctuation("מ-1998"), "מ\u{200F}-1998");
        assert_eq!(fix_hebrew_punctuation("אבג"), "אבג");
    }

    #[test]
    fn box_painter_respects_alignment() {
        let mut painter = BoxPainter;
        let style = TextStyle::new(FontRole::Title, 10.0, INK);
        let mut canvas = RgbaImage::from_pixel(40, 20, Rgba([255, 255, 255, 255]));
        painter.draw_line(&mut canvas, "ab", &style, 40.0, 10.0, TextAlign::Right);
        // Two glyphs, 5.5px advance: the block starts at 29.
        assert_eq!(*canvas.get_pixel(30, 10), INK);
        assert_eq!(*canvas.get_pixel(10, 10), Rgba([255, 255, 255, 255]));
        assert_eq!(painter.measure("a\u{200F}b", &style), 11.0);
    }

    #[test]
    fn blend_mixes_by_alpha() {
        let mut px = Rgba([0, 0, 0, 255]);
        blend_pixel(&mut px, Rgba([255, 255, 255, 128]));
        assert!((127..=129).contains(&px[0]));
        assert_eq!(px[3], 255);
    }

    #[test]
    fn fill_rect_clips_to_canvas() {
        let mut canvas = RgbaImage::new(4, 4);
        fill_rect(&mut canvas, -2, -2, 4, 4, INK);
        assert_eq!(*canvas.get_pixel(1, 1), INK);
        assert_eq!(canvas.get_pixel(2, 2)[3], 0);
    }
}
