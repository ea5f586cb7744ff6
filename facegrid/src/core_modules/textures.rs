// THEORY:
// Every canvas the grid shows that is not camera imagery is painted here:
// title and author panels (regular and bold), pixelation captions, headline
// characters, overlay text badges and the 3x3 hover canvas.
//
// Key architectural principles:
// 1.  **Pure Painters**: each function takes a painter, the content and a
//     pixel size and returns a fresh `RgbaImage`. Caching is the caller's job.
// 2.  **Two-Ink Palette**: panels alternate `#444` on `#ddddd1` and the
//     reverse; the hover canvas is paper-coloured with faint grid lines.
// 3.  **Transparent Overlays**: characters and overlay text are drawn on a
//     transparent canvas and blended over the tile by the renderer.

use super::articles::{CreditEntry, HoverContent};
use super::text_render::{
    FontRole, TextAlign, TextPainter, TextStyle, draw_block, draw_wrapped, fill_rect, fix_hebrew_punctuation, wrap_words,
};
use image::{Rgba, RgbaImage};

pub const INK: Rgba<u8> = Rgba([0x44, 0x44, 0x44, 255]);
pub const PAPER: Rgba<u8> = Rgba([0xdd, 0xdd, 0xd1, 255]);
const CHARACTER_INK: Rgba<u8> = Rgba([0x22, 0x22, 0x22, 255]);
const GRID_LINE: Rgba<u8> = Rgba([0x99, 0x99, 0x99, 153]);

/// Visual treatment of an overlay text badge, chosen from the text itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayStyle {
    Live,
    Broadcast,
    Hebrew,
    Default,
}

impl OverlayStyle {
    pub fn for_text(text: &str) -> Self {
        match text {
            "LIVE" | "חי" | "ON AIR" | "שידור" => OverlayStyle::Live,
            "REC" | "BROADCAST" | "STREAMING" => OverlayStyle::Broadcast,
            "עכשיו" | "אוויר" | "רשת" | "מקוון" => OverlayStyle::Hebrew,
            _ => OverlayStyle::Default,
        }
    }

    fn font(self, min_side: f32) -> (FontRole, f32, Rgba<u8>) {
        match self {
            OverlayStyle::Broadcast => (FontRole::System, min_side * 0.08, Rgba([0xff, 0, 0, 255])),
            OverlayStyle::Live => (FontRole::System, min_side * 0.1, Rgba([0, 0xff, 0, 255])),
            OverlayStyle::Hebrew => (FontRole::Headline, min_side * 0.09, Rgba([0xff, 0xff, 0xff, 255])),
            OverlayStyle::Default => (FontRole::System, min_side * 0.07, Rgba([0xff, 0xff, 0xff, 255])),
        }
    }
}

fn min_side(width: u32, height: u32) -> f32 {
    width.min(height) as f32
}

/// Dark panel, light text, right aligned.
pub fn title_texture(painter: &mut dyn TextPainter, title: &str, width: u32, height: u32, bold: bool) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width, height, INK);
    let size = min_side(width, height) * 0.12;
    let style = TextStyle::new(FontRole::Title, size, PAPER).bold(bold);
    let (w, h) = (width as f32, height as f32);
    draw_wrapped(painter, &mut canvas, title, &style, w / 1.1, h / 2.0, w * 0.9, size, TextAlign::Right);
    canvas
}

/// Light panel, dark text, centred.
pub fn author_texture(painter: &mut dyn TextPainter, author: &str, width: u32, height: u32, bold: bool) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width, height, PAPER);
    let size = min_side(width, height) * 0.12;
    let style = TextStyle::new(FontRole::Author, size, INK).bold(bold);
    let (w, h) = (width as f32, height as f32);
    draw_wrapped(painter, &mut canvas, author, &style, w / 2.0, h / 2.0, w * 0.9, size, TextAlign::Center);
    canvas
}

/// Pixelation caption. Even captions are dark, odd captions light.
pub fn caption_texture(painter: &mut dyn TextPainter, text: &str, caption_index: usize, width: u32, height: u32) -> RgbaImage {
    let (background, ink) = if caption_index % 2 == 0 { (INK, PAPER) } else { (PAPER, INK) };
    let mut canvas = RgbaImage::from_pixel(width, height, background);
    let size = min_side(width, height) * 0.15;
    let style = TextStyle::new(FontRole::Author, size, ink);
    let (w, h) = (width as f32, height as f32);
    draw_wrapped(painter, &mut canvas, text, &style, w / 2.0, h / 2.0, w * 0.9, size * 1.1, TextAlign::Center);
    canvas
}

/// One headline character filling most of the tile, on a transparent canvas.
pub fn character_texture(painter: &mut dyn TextPainter, character: char, width: u32, height: u32) -> RgbaImage {
    let mut canvas = RgbaImage::new(width, height);
    let style = TextStyle::new(FontRole::Headline, min_side(width, height), CHARACTER_INK).bold(true);
    let mut buf = [0u8; 4];
    painter.draw_line(
        &mut canvas,
        character.encode_utf8(&mut buf),
        &style,
        width as f32 / 2.0,
        height as f32 / 1.8,
        TextAlign::Center,
    );
    canvas
}

/// A centred overlay badge on a transparent canvas.
pub fn overlay_text_texture(painter: &mut dyn TextPainter, text: &str, style: OverlayStyle, width: u32, height: u32) -> RgbaImage {
    let mut canvas = RgbaImage::new(width, height);
    let (role, size, color) = style.font(min_side(width, height));
    let text_style = TextStyle::new(role, size, color).bold(true);
    painter.draw_line(&mut canvas, text, &text_style, width as f32 / 2.0, height as f32 / 2.0, TextAlign::Center);
    canvas
}

/// The single canvas stretched over a 3x3 hover neighbourhood.
pub fn hover_texture(painter: &mut dyn TextPainter, content: &HoverContent, width: u32, height: u32) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width, height, PAPER);
    draw_thirds(&mut canvas);

    let (w, h) = (width as f32, height as f32);
    let font_size = min_side(width, height) * 0.05;
    let (x, y, max_width) = (w / 1.15, h / 2.2, w * 0.7);
    match content {
        HoverContent::Sentences(sentences) => {
            let text = fix_hebrew_punctuation(&sentences.join(" "));
            let line_height = font_size * 1.1;
            let style = TextStyle::new(FontRole::Sentence, line_height, INK);
            draw_wrapped(painter, &mut canvas, &text, &style, x, y, max_width, line_height, TextAlign::Right);
        }
        HoverContent::Credits(entries) => {
            let lines = credit_lines(painter, entries, font_size, max_width);
            draw_block(painter, &mut canvas, &lines, x, y, font_size * 1.2, TextAlign::Right);
        }
    }
    canvas
}

/// Bold title at 1.2x, wrapped names, a blank line between entries.
fn credit_lines(painter: &mut dyn TextPainter, entries: &[CreditEntry], font_size: f32, max_width: f32) -> Vec<(String, TextStyle)> {
    let title_style = TextStyle::new(FontRole::Sentence, font_size * 1.2, INK).bold(true);
    let names_style = TextStyle::new(FontRole::Author, font_size, INK);
    let mut lines = Vec::new();
    for entry in entries {
        lines.push((fix_hebrew_punctuation(&entry.title), title_style));
        let names = fix_hebrew_punctuation(&entry.names);
        for line in wrap_words(&names, max_width, |s| painter.measure(s, &names_style)) {
            lines.push((line, names_style));
        }
        lines.push((String::new(), title_style));
    }
    if lines.last().is_some_and(|(text, _)| text.is_empty()) {
        lines.pop();
    }
    lines
}

/// Two vertical and two horizontal one-pixel lines splitting the canvas in thirds.
fn draw_thirds(canvas: &mut RgbaImage) {
    let (width, height) = canvas.dimensions();
    for i in 1..3 {
        let x = (width * i / 3) as i32;
        let y = (height * i / 3) as i32;
        fill_rect(canvas, x, 0, 1, height, GRID_LINE);
        fill_rect(canvas, 0, y, width, 1, GRID_LINE);
    }
}
