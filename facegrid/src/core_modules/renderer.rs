// THEORY:
// The compositor turns the tile list into one RGBA framebuffer. It is the CPU
// equivalent of drawing every tile mesh with its live material, then the
// overlay planes, then the hover plane on top.
//
// Key architectural principles:
// 1.  **Resolve, Then Rasterize**: every tile's source image is looked up once
//     before any pixel is touched. The per-pixel loop only samples, shades and
//     blends.
// 2.  **Banded Parallelism**: the framebuffer is cut into horizontal bands,
//     one per CPU, rendered on scoped threads. Bands never overlap, so each
//     thread owns its slice outright and no locking is needed.
// 3.  **Painter's Order**: tile material, then character/badge overlay, then
//     primitive markers, then the hover plane. Each layer is a plain
//     source-over blend.

use super::frame_history::FrameHistory;
use super::grid_partitioner::{GridLayout, PixelRect};
use super::hover::ActiveHover;
use super::materials::apply_reveal;
use super::primitive::MARKER_EXTENT;
use super::tile::{Tile, TileSource};
use glam::{Vec2, Vec3};
use image::{Rgba, RgbaImage};

/// Outline width of wireframe markers, in framebuffer pixels.
const MARKER_LINE_PX: f32 = 1.5;

/// Everything one frame is drawn from.
pub struct FrameInput<'a> {
    pub layout: &'a GridLayout,
    pub tiles: &'a [Tile],
    /// Eased reveal value per tile.
    pub reveal: &'a [f32],
    pub history: &'a FrameHistory,
    pub hover: Option<&'a ActiveHover>,
}

pub struct Compositor {
    threads: usize,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

struct ResolvedTile<'a> {
    tile: &'a Tile,
    rect: PixelRect,
    source: Option<&'a RgbaImage>,
    reveal: f32,
}

impl Compositor {
    pub fn new() -> Self {
        Self::with_threads(num_cpus::get())
    }

    pub fn with_threads(threads: usize) -> Self {
        Self { threads: threads.max(1) }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Draws a full frame into `target`, which defines the output resolution.
    pub fn render(&self, input: &FrameInput<'_>, target: &mut RgbaImage) {
        let (width, height) = target.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let resolved = resolve(input, width, height);
        let hover = input.hover.map(|active| {
            let n = &active.neighborhood;
            let rect = input.layout.block_rect_in(n.start_col, n.start_row, n.span_cols, n.span_rows, width, height);
            (rect, active.texture.as_ref())
        });

        let stride = width as usize * 4;
        let band_rows = height.div_ceil(self.threads as u32).max(1);
        let buffer: &mut [u8] = &mut **target;
        if self.threads == 1 {
            render_band(&resolved, hover, buffer, 0, width);
            return;
        }
        std::thread::scope(|scope| {
            for (band, chunk) in buffer.chunks_mut(band_rows as usize * stride).enumerate() {
                let resolved = &resolved;
                scope.spawn(move || render_band(resolved, hover, chunk, band as u32 * band_rows, width));
            }
        });
    }
}

fn resolve<'a>(input: &FrameInput<'a>, width: u32, height: u32) -> Vec<ResolvedTile<'a>> {
    let live = input.history.newest();
    let bold_key = input.hover.map(|h| h.key);
    input
        .tiles
        .iter()
        .map(|tile| {
            let source = match &tile.source {
                TileSource::Live => live,
                TileSource::History(offset) => input.history.delayed_frame(*offset).or(live),
                TileSource::Still(image) => Some(image.as_ref()),
                TileSource::Panel => {
                    let bold = bold_key.is_some() && tile.hover_key() == bold_key;
                    tile.panel_texture(bold).map(|t| t.as_ref())
                }
            };
            ResolvedTile {
                tile,
                rect: input.layout.tile_rect_in(tile.index, width, height),
                source,
                reveal: input.reveal.get(tile.index).copied().unwrap_or(1.0),
            }
        })
        .collect()
}

fn render_band(tiles: &[ResolvedTile<'_>], hover: Option<(PixelRect, &RgbaImage)>, band: &mut [u8], y0: u32, width: u32) {
    let rows = (band.len() / (width as usize * 4)) as u32;
    let y1 = y0 + rows;
    for resolved in tiles {
        let rect = resolved.rect;
        let (top, bottom) = (rect.y0.max(y0), rect.y1.min(y1));
        if top >= bottom || rect.width() == 0 {
            continue;
        }
        for y in top..bottom {
            for x in rect.x0..rect.x1 {
                let u = (x - rect.x0) as f32 + 0.5;
                let v = (y - rect.y0) as f32 + 0.5;
                let local = Vec2::new(u / rect.width() as f32, v / rect.height() as f32);
                let offset = ((y - y0) as usize * width as usize + x as usize) * 4;
                let pixel = shade_tile_pixel(resolved, local);
                band[offset..offset + 4].copy_from_slice(&pixel.0);
            }
        }
    }

    if let Some((rect, texture)) = hover {
        let (top, bottom) = (rect.y0.max(y0), rect.y1.min(y1));
        for y in top..bottom {
            for x in rect.x0..rect.x1 {
                let local = Vec2::new(
                    ((x - rect.x0) as f32 + 0.5) / rect.width().max(1) as f32,
                    ((y - rect.y0) as f32 + 0.5) / rect.height().max(1) as f32,
                );
                let offset = ((y - y0) as usize * width as usize + x as usize) * 4;
                let src = sample(texture, local);
                blend_into(&mut band[offset..offset + 4], src, 1.0);
            }
        }
    }
}

/// `local` is the pixel position inside the tile, origin top-left, in `0..1`.
fn shade_tile_pixel(resolved: &ResolvedTile<'_>, local: Vec2) -> Rgba<u8> {
    let tile = resolved.tile;
    let gl_uv = Vec2::new(local.x, 1.0 - local.y);
    let source_uv = tile.material.source_uv(gl_uv);
    let sampled = resolved
        .source
        .map(|img| {
            let px = sample(img, Vec2::new(source_uv.x, 1.0 - source_uv.y));
            Vec3::new(px[0] as f32, px[1] as f32, px[2] as f32) / 255.0
        })
        .unwrap_or(Vec3::ZERO);
    let color = apply_reveal(tile.material.shade(sampled), resolved.reveal);
    let mut out = [to_u8(color.x), to_u8(color.y), to_u8(color.z), 255];

    if let Some(overlay) = &tile.overlay {
        let src = sample(overlay.texture(), local);
        blend_into(&mut out, src, overlay.opacity(resolved.reveal));
    }

    if let Some(markers) = &tile.markers {
        let p = Vec2::new((local.x - 0.5) * 2.0, -(local.y - 0.5) * 2.0) / MARKER_EXTENT;
        let extent = resolved.rect.width().min(resolved.rect.height()).max(1) as f32 * MARKER_EXTENT / 2.0;
        let thickness = MARKER_LINE_PX / extent;
        for shape in markers.shapes.iter().filter(|s| s.covers(p, thickness)) {
            blend_into(&mut out, markers.color, shape.opacity * resolved.reveal);
        }
    }
    Rgba(out)
}

fn to_u8(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Nearest-neighbour sample at image coordinates in `0..1`, origin top-left.
fn sample(img: &RgbaImage, uv: Vec2) -> Rgba<u8> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let x = ((uv.x * w as f32) as i64).clamp(0, i64::from(w) - 1) as u32;
    let y = ((uv.y * h as f32) as i64).clamp(0, i64::from(h) - 1) as u32;
    *img.get_pixel(x, y)
}

fn blend_into(dst: &mut [u8], src: Rgba<u8>, opacity: f32) {
    let alpha = src[3] as f32 / 255.0 * opacity.clamp(0.0, 1.0);
    if alpha <= 0.0 {
        return;
    }
    for i in 0..3 {
        dst[i] = (src[i] as f32 * alpha + dst[i] as f32 * (1.0 - alpha)).round() as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::grid_partitioner::Viewport;
    use crate::core_modules::hover::{HoverKey, neighborhood};
    use crate::core_modules::materials::{EffectVariant, Material};
    use crate::core_modules::tile::{PanelKind, PanelTextures, TextPanelInfo, TileOverlay};
    use std::sync::Arc;
    use std::time::Instant;

    fn history_with(color: [u8; 4]) -> FrameHistory {
        let mut history = FrameHistory::new(4, 8, 6, 60);
        history.capture_tick(Instant::now(), |img| {
            for px in img.pixels_mut() {
                *px = Rgba(color);
            }
        });
        history
    }

    fn grid(cols: u32, rows: u32) -> (GridLayout, Vec<Tile>) {
        let layout = GridLayout::with_target(Viewport::new(cols * 10, rows * 10), 10);
        let tiles = (0..layout.tile_count()).map(|i| Tile::new(i, cols, EffectVariant::Original)).collect();
        (layout, tiles)
    }

    #[test]
    fn live_tiles_show_the_newest_frame() {
        let (layout, tiles) = grid(3, 2);
        let history = history_with([200, 100, 50, 255]);
        let reveal = vec![1.0; tiles.len()];
        let input = FrameInput { layout: &layout, tiles: &tiles, reveal: &reveal, history: &history, hover: None };
        let mut target = RgbaImage::new(30, 20);
        Compositor::with_threads(3).render(&input, &mut target);
        assert_eq!(*target.get_pixel(0, 0), Rgba([200, 100, 50, 255]));
        assert_eq!(*target.get_pixel(29, 19), Rgba([200, 100, 50, 255]));
    }

    #[test]
    fn unrevealed_tiles_are_black() {
        let (layout, tiles) = grid(2, 2);
        let history = history_with([255, 255, 255, 255]);
        let mut reveal = vec![1.0; tiles.len()];
        reveal[3] = 0.0;
        let input = FrameInput { layout: &layout, tiles: &tiles, reveal: &reveal, history: &history, hover: None };
        let mut target = RgbaImage::new(20, 20);
        Compositor::with_threads(2).render(&input, &mut target);
        assert_eq!(*target.get_pixel(15, 15), Rgba([0, 0, 0, 255]));
        assert_eq!(*target.get_pixel(5, 5), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn thread_count_does_not_change_the_image() {
        let (layout, mut tiles) = grid(4, 3);
        for (i, tile) in tiles.iter_mut().enumerate() {
            tile.material = Material::Effect { variant: EffectVariant::from_index(i), mirror: i % 2 == 0 };
        }
        let history = history_with([30, 160, 220, 255]);
        let reveal: Vec<f32> = (0..tiles.len()).map(|i| i as f32 / 12.0).collect();
        let input = FrameInput { layout: &layout, tiles: &tiles, reveal: &reveal, history: &history, hover: None };
        let mut single = RgbaImage::new(40, 30);
        let mut banded = RgbaImage::new(40, 30);
        Compositor::with_threads(1).render(&input, &mut single);
        Compositor::with_threads(7).render(&input, &mut banded);
        assert!(single == banded);
    }

    #[test]
    fn overlays_and_hover_draw_on_top() {
        let (layout, mut tiles) = grid(3, 3);
        let red = Arc::new(RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255])));
        tiles[4].overlay = Some(TileOverlay::Character { character: 'א', char_index: 0, texture: red });
        let paper = Arc::new(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255])));
        tiles[0].set_panel(
            TextPanelInfo { kind: PanelKind::Caption, source_index: 0 },
            PanelTextures { regular: paper.clone(), bold: None },
        );

        let history = history_with([0, 0, 0, 255]);
        let reveal = vec![1.0; tiles.len()];
        let input = FrameInput { layout: &layout, tiles: &tiles, reveal: &reveal, history: &history, hover: None };
        let mut target = RgbaImage::new(30, 30);
        Compositor::with_threads(2).render(&input, &mut target);
        // 0.95 opacity red over black.
        assert_eq!(target.get_pixel(15, 15)[0], 242);
        assert_eq!(*target.get_pixel(5, 5), Rgba([0, 0, 255, 255]));

        let active = ActiveHover {
            key: HoverKey::Test,
            neighborhood: neighborhood(3, 3, 4),
            texture: Arc::new(RgbaImage::from_pixel(3, 3, Rgba([0, 255, 0, 255]))),
        };
        let input = FrameInput { hover: Some(&active), ..input };
        Compositor::with_threads(2).render(&input, &mut target);
        assert_eq!(*target.get_pixel(15, 15), Rgba([0, 255, 0, 255]));
        assert_eq!(*target.get_pixel(0, 29), Rgba([0, 255, 0, 255]));
    }
}
