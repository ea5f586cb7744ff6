// THEORY:
// The hover overlay is a single textured plane stretched over the 3x3 block of
// tiles around a hovered text tile. The state kept here is only "which block is
// showing, for which content"; the canvas itself is built by a caller-provided
// closure so this module stays free of fonts and catalogs.
//
// Key architectural principles:
// 1.  **Clamped Window**: the block is centred on the hovered tile when
//     possible and slides inwards at grid edges. Grids narrower than three
//     tiles get a block as wide as the grid.
// 2.  **Twin Stability**: the title and author tiles of one article share a
//     `HoverKey`. Moving between them keeps the current overlay, so the plane
//     does not flicker when crossing the pair.
// 3.  **Suppression Wins**: while the navbar grid is open every update hides
//     the overlay and nothing is rebuilt.

use image::RgbaImage;
use std::sync::Arc;

/// A rectangular block of tiles, in grid coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighborhood {
    pub start_col: u32,
    pub start_row: u32,
    pub span_cols: u32,
    pub span_rows: u32,
    /// Row-major tile indices inside the block.
    pub indices: Vec<usize>,
}

impl Neighborhood {
    pub fn contains(&self, tile: usize) -> bool {
        self.indices.contains(&tile)
    }
}

fn window_start(center: u32, count: u32) -> u32 {
    center.saturating_sub(1).min(count.saturating_sub(3))
}

/// The 3x3 block around `hovered`, shifted to stay inside the grid.
pub fn neighborhood(cols: u32, rows: u32, hovered: usize) -> Neighborhood {
    let cols = cols.max(1);
    let col = hovered as u32 % cols;
    let row = hovered as u32 / cols;
    let start_col = window_start(col, cols);
    let start_row = window_start(row, rows);
    let span_cols = cols.min(3);
    let span_rows = rows.min(3);
    let indices = (start_row..start_row + span_rows)
        .flat_map(|r| (start_col..start_col + span_cols).map(move |c| (r * cols + c) as usize))
        .collect();
    Neighborhood { start_col, start_row, span_cols, span_rows, indices }
}

/// What content an overlay shows. Both tiles of a pair map to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoverKey {
    /// Title/author pair, by pair index.
    Pair(usize),
    /// Pixelation caption, by caption index.
    Caption(usize),
    /// Developer test overlay.
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoverHit {
    pub tile: usize,
    pub key: HoverKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverChange {
    Unchanged,
    Shown,
    Hidden,
}

#[derive(Debug, Clone)]
pub struct ActiveHover {
    pub key: HoverKey,
    pub neighborhood: Neighborhood,
    pub texture: Arc<RgbaImage>,
}

#[derive(Debug, Default)]
pub struct HoverState {
    active: Option<ActiveHover>,
}

impl HoverState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ActiveHover> {
        self.active.as_ref()
    }

    pub fn key(&self) -> Option<HoverKey> {
        self.active.as_ref().map(|a| a.key)
    }

    pub fn is_visible(&self) -> bool {
        self.active.is_some()
    }

    /// Applies one pointer update. `hit` is the text tile under the pointer,
    /// if any; `build` paints the overlay canvas for a new block.
    pub fn update(
        &mut self,
        hit: Option<HoverHit>,
        grid_open: bool,
        cols: u32,
        rows: u32,
        build: impl FnOnce(HoverKey, &Neighborhood) -> RgbaImage,
    ) -> HoverChange {
        let hit = match hit {
            Some(hit) if !grid_open => hit,
            _ => return self.hide(),
        };
        if self.key() == Some(hit.key) {
            return HoverChange::Unchanged;
        }
        self.show(hit, cols, rows, build);
        HoverChange::Shown
    }

    /// Shows an overlay unconditionally, replacing any current one.
    pub fn show(&mut self, hit: HoverHit, cols: u32, rows: u32, build: impl FnOnce(HoverKey, &Neighborhood) -> RgbaImage) {
        let block = neighborhood(cols, rows, hit.tile);
        let texture = Arc::new(build(hit.key, &block));
        tracing::debug!(key = ?hit.key, tile = hit.tile, tiles = block.indices.len(), "hover overlay shown");
        self.active = Some(ActiveHover { key: hit.key, neighborhood: block, texture });
    }

    pub fn hide(&mut self) -> HoverChange {
        match self.active.take() {
            Some(_) => HoverChange::Hidden,
            None => HoverChange::Unchanged,
        }
    }
}
