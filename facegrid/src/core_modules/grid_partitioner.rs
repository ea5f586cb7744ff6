// THEORY:
// The `GridLayout` is the geometric foundation of the whole display. Every other
// module (text allocation, character scatter, effect distribution, rendering,
// hover hit-testing) speaks in terms of the tile indices and rectangles it
// produces, so it must be exact and boringly deterministic.
//
// Key architectural principles:
// 1.  **Exact Tiling**: The number of columns and rows is chosen from a target
//     tile size, but the final tile size is *derived* from the viewport
//     (`width / cols`), never the other way around. The grid therefore covers
//     the viewport edge-to-edge with no leftover strip.
// 2.  **Determinism**: Identical viewports always produce identical grids. The
//     mode-scoped caches (text pairs, caption positions, character scatter) are
//     keyed by `GridKey`, so they are invalidated exactly when the grid changes.
// 3.  **Two Coordinate Systems**: Pixel space (for rasterization) and a
//     normalized world space of fixed width 10 (for positioning tiles and
//     overlays, and for hit-testing the pointer the way a raycaster would).

use glam::{Vec2, Vec3};

/// Fixed width of the world-space plane the tiles are laid out on.
pub const WORLD_WIDTH: f32 = 10.0;
/// Device pixel density is never honoured above this factor.
pub const MAX_PIXEL_RATIO: f32 = 2.0;
/// Viewports narrower than this are treated as mobile screens.
pub const MOBILE_BREAKPOINT: u32 = 768;

const MOBILE_TARGET_SIZE: u32 = 120;
const UHD_TARGET_SIZE: u32 = 200;
const QHD_TARGET_SIZE: u32 = 170;
const DEFAULT_TARGET_SIZE: u32 = 150;

/// The drawable surface the grid must cover.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    /// Raw device pixel density as reported by the host.
    pub pixel_ratio: f32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, pixel_ratio: 1.0 }
    }

    pub fn with_pixel_ratio(mut self, pixel_ratio: f32) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }

    /// The density actually used for offscreen text canvases.
    pub fn effective_pixel_ratio(&self) -> f32 {
        if self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0 {
            self.pixel_ratio.min(MAX_PIXEL_RATIO)
        } else {
            1.0
        }
    }

    pub fn is_mobile(&self) -> bool {
        self.width < MOBILE_BREAKPOINT
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

/// Target tile edge in pixels, keyed to the total pixel count of the viewport.
pub fn target_tile_size(viewport: &Viewport) -> u32 {
    if viewport.is_mobile() {
        return MOBILE_TARGET_SIZE;
    }
    let total_pixels = viewport.width as u64 * viewport.height as u64;
    if total_pixels > 3840 * 2160 {
        UHD_TARGET_SIZE
    } else if total_pixels > 1920 * 1080 {
        QHD_TARGET_SIZE
    } else {
        DEFAULT_TARGET_SIZE
    }
}

/// Identity of a grid for cache invalidation purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridKey {
    pub cols: u32,
    pub rows: u32,
}

/// An integer pixel rectangle, half-open on the right and bottom edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// A world-space axis-aligned rectangle described by its centre and size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldRect {
    pub center: Vec2,
    pub size: Vec2,
}

/// The result of partitioning a viewport into tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    pub viewport: Viewport,
    /// Target tile edge the column/row counts were derived from.
    pub target_size: u32,
    pub cols: u32,
    pub rows: u32,
    /// Exact tile width in pixels (`viewport.width / cols`).
    pub tile_width: f32,
    /// Exact tile height in pixels (`viewport.height / rows`).
    pub tile_height: f32,
    pub world_width: f32,
    pub world_height: f32,
    pub tile_world_width: f32,
    pub tile_world_height: f32,
}

impl GridLayout {
    /// Partitions the viewport using the size heuristic.
    pub fn partition(viewport: Viewport) -> Self {
        let target = target_tile_size(&viewport);
        Self::with_target(viewport, target)
    }

    /// Partitions the viewport with an explicit target tile size.
    pub fn with_target(viewport: Viewport, target_size: u32) -> Self {
        let target = target_size.max(1);
        let width = viewport.width.max(1);
        let height = viewport.height.max(1);
        let cols = width.div_ceil(target);
        let rows = height.div_ceil(target);

        let world_width = WORLD_WIDTH;
        let world_height = WORLD_WIDTH / viewport.aspect_ratio();

        Self {
            viewport,
            target_size: target,
            cols,
            rows,
            tile_width: width as f32 / cols as f32,
            tile_height: height as f32 / rows as f32,
            world_width,
            world_height,
            tile_world_width: world_width / cols as f32,
            tile_world_height: world_height / rows as f32,
        }
    }

    pub fn key(&self) -> GridKey {
        GridKey { cols: self.cols, rows: self.rows }
    }

    pub fn tile_count(&self) -> usize {
        (self.cols * self.rows) as usize
    }

    pub fn index_of(&self, col: u32, row: u32) -> usize {
        (row * self.cols + col) as usize
    }

    /// Returns `(col, row)` for a row-major tile index.
    pub fn position_of(&self, index: usize) -> (u32, u32) {
        let index = index as u32;
        (index % self.cols, index / self.cols)
    }

    /// The reserved bottom-left tile that never hosts text or characters.
    pub fn bottom_left_index(&self) -> usize {
        self.index_of(0, self.rows - 1)
    }

    /// World-space centre of a tile. Row 0 is at the top.
    pub fn tile_world_center(&self, index: usize) -> Vec3 {
        let (col, row) = self.position_of(index);
        let start_x = -self.world_width / 2.0 + self.tile_world_width / 2.0;
        let start_y = self.world_height / 2.0 - self.tile_world_height / 2.0;
        Vec3::new(
            start_x + col as f32 * self.tile_world_width,
            start_y - row as f32 * self.tile_world_height,
            0.0,
        )
    }

    /// Tile rectangle inside a render target of the given size.
    ///
    /// Edges are rounded from the exact fractional boundaries, so adjacent tiles
    /// share edges and the union of all rectangles is the whole target.
    pub fn tile_rect_in(&self, index: usize, target_width: u32, target_height: u32) -> PixelRect {
        let (col, row) = self.position_of(index);
        let edge = |i: u32, count: u32, extent: u32| -> u32 {
            ((i as f64 * extent as f64) / count as f64).round() as u32
        };
        PixelRect {
            x0: edge(col, self.cols, target_width),
            y0: edge(row, self.rows, target_height),
            x1: edge(col + 1, self.cols, target_width),
            y1: edge(row + 1, self.rows, target_height),
        }
    }

    /// Tile rectangle in viewport pixels.
    pub fn tile_rect(&self, index: usize) -> PixelRect {
        self.tile_rect_in(index, self.viewport.width.max(1), self.viewport.height.max(1))
    }

    /// Converts a viewport pixel position into world coordinates.
    pub fn pixel_to_world(&self, x: f32, y: f32) -> Vec2 {
        let ndc_x = (x / self.viewport.width.max(1) as f32) * 2.0 - 1.0;
        let ndc_y = -(y / self.viewport.height.max(1) as f32) * 2.0 + 1.0;
        Vec2::new(ndc_x * self.world_width / 2.0, ndc_y * self.world_height / 2.0)
    }

    /// Finds the tile under a viewport pixel position by intersecting in world space.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<usize> {
        let world = self.pixel_to_world(x, y);
        let from_left = world.x + self.world_width / 2.0;
        let from_top = self.world_height / 2.0 - world.y;
        if from_left < 0.0 || from_top < 0.0 {
            return None;
        }
        let col = (from_left / self.tile_world_width).floor() as u32;
        let row = (from_top / self.tile_world_height).floor() as u32;
        (col < self.cols && row < self.rows).then(|| self.index_of(col, row))
    }

    /// World footprint of a block of tiles starting at `(start_col, start_row)`.
    pub fn block_world_rect(&self, start_col: u32, start_row: u32, cols: u32, rows: u32) -> WorldRect {
        let first = self.tile_world_center(self.index_of(start_col, start_row));
        let last = self.tile_world_center(self.index_of(start_col + cols - 1, start_row + rows - 1));
        WorldRect {
            center: Vec2::new((first.x + last.x) / 2.0, (first.y + last.y) / 2.0),
            size: Vec2::new(self.tile_world_width * cols as f32, self.tile_world_height * rows as f32),
        }
    }

    /// Pixel footprint of a block of tiles inside a render target.
    pub fn block_rect_in(
        &self,
        start_col: u32,
        start_row: u32,
        cols: u32,
        rows: u32,
        target_width: u32,
        target_height: u32,
    ) -> PixelRect {
        let first = self.tile_rect_in(self.index_of(start_col, start_row), target_width, target_height);
        let last = self.tile_rect_in(
            self.index_of(start_col + cols - 1, start_row + rows - 1),
            target_width,
            target_height,
        );
        PixelRect { x0: first.x0, y0: first.y0, x1: last.x1, y1: last.y1 }
    }
}
