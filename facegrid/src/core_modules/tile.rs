// THEORY:
// A `Tile` is one grid cell and everything the compositor needs to draw it:
// which material is live, where its pixels come from, and what is layered on
// top (a headline character, an overlay badge or primitive markers).
//
// Key architectural principles:
// 1.  **Batch Lifecycle**: tiles are created together by a grid rebuild and
//     dropped together by the next one. No tile outlives its grid, so nothing
//     can point into a stale layout.
// 2.  **Wiring Is Separate From Content**: content (text panels, characters,
//     overlays) is decided at rebuild time; `wire` only picks the material and
//     pixel source for the active mode. Detection results and delay toggles
//     re-wire without rebuilding.
// 3.  **Text Keeps Its Texture**: a text panel never takes delay, zoom,
//     primitive or pixelation substitution. In delay mode it is drawn with a
//     non-mirrored plain material over the same texture.

use super::delay::DelayOrder;
use super::fallback::FallbackImagery;
use super::hover::HoverKey;
use super::materials::{EffectVariant, Material, PixelationVariant};
use super::mode::Mode;
use super::primitive::PrimitiveMarkers;
use super::textures::OverlayStyle;
use super::zoom::{ZoomSetting, ZoomSettings};
use glam::Vec2;
use image::RgbaImage;
use std::sync::Arc;

const IDENTITY_ZOOM: ZoomSetting = ZoomSetting { zoom: 1.0, pan: Vec2::ZERO };

/// The per-tile stand-in for randomness: stable for a given index.
pub fn tile_seed(index: usize) -> u32 {
    (index.wrapping_mul(7919) % 1000) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelKind {
    Title,
    Author,
    Caption,
    Character,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPanelInfo {
    pub kind: PanelKind,
    /// Article index for titles and authors, caption index for captions,
    /// character index for characters.
    pub source_index: usize,
}

/// Regular and hover-bold renderings of a panel.
#[derive(Debug, Clone)]
pub struct PanelTextures {
    pub regular: Arc<RgbaImage>,
    pub bold: Option<Arc<RgbaImage>>,
}

/// Where a tile's pixels come from.
#[derive(Debug, Clone)]
pub enum TileSource {
    /// The newest frame in the history.
    Live,
    /// A fixed ring slot, for delay mode.
    History(usize),
    /// A fallback still.
    Still(Arc<RgbaImage>),
    /// The tile's own panel texture.
    Panel,
}

#[derive(Debug, Clone)]
pub enum TileOverlay {
    Character { character: char, char_index: usize, texture: Arc<RgbaImage> },
    Text { text: String, style: OverlayStyle, texture: Arc<RgbaImage> },
}

impl TileOverlay {
    /// Opacity for a tile whose eased reveal value is `reveal`. Characters fade
    /// in with their tile; badges do not.
    pub fn opacity(&self, reveal: f32) -> f32 {
        match self {
            TileOverlay::Character { .. } => reveal * 0.95,
            TileOverlay::Text { .. } => 0.9,
        }
    }

    pub fn texture(&self) -> &Arc<RgbaImage> {
        match self {
            TileOverlay::Character { texture, .. } | TileOverlay::Text { texture, .. } => texture,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tile {
    pub index: usize,
    pub col: u32,
    pub row: u32,
    pub seed: u32,
    pub effect_variant: EffectVariant,
    pub text_panel: Option<TextPanelInfo>,
    /// The other tile of a title/author pair.
    pub partner: Option<usize>,
    pub panel: Option<PanelTextures>,
    pub delay_offset: Option<usize>,
    pub material: Material,
    pub source: TileSource,
    pub overlay: Option<TileOverlay>,
    pub markers: Option<PrimitiveMarkers>,
}

impl Tile {
    pub fn new(index: usize, cols: u32, effect_variant: EffectVariant) -> Self {
        let cols = cols.max(1) as usize;
        Self {
            index,
            col: (index % cols) as u32,
            row: (index / cols) as u32,
            seed: tile_seed(index),
            effect_variant,
            text_panel: None,
            partner: None,
            panel: None,
            delay_offset: None,
            material: Material::Plain { mirror: false },
            source: TileSource::Live,
            overlay: None,
            markers: None,
        }
    }

    /// Title, author and caption tiles. Character tiles are video tiles with
    /// an overlay.
    pub fn is_text_panel(&self) -> bool {
        matches!(
            self.text_panel,
            Some(TextPanelInfo { kind: PanelKind::Title | PanelKind::Author | PanelKind::Caption, .. })
        )
    }

    pub fn set_panel(&mut self, info: TextPanelInfo, textures: PanelTextures) {
        self.text_panel = Some(info);
        self.panel = Some(textures);
        self.source = TileSource::Panel;
        self.material = Material::Text;
    }

    pub fn panel_texture(&self, bold: bool) -> Option<&Arc<RgbaImage>> {
        let panel = self.panel.as_ref()?;
        match (&panel.bold, bold) {
            (Some(bold), true) => Some(bold),
            _ => Some(&panel.regular),
        }
    }

    /// The hover content this tile opens, for text panels.
    pub fn hover_key(&self) -> Option<HoverKey> {
        match self.text_panel? {
            TextPanelInfo { kind: PanelKind::Title | PanelKind::Author, source_index } => Some(HoverKey::Pair(source_index)),
            TextPanelInfo { kind: PanelKind::Caption, source_index } => Some(HoverKey::Caption(source_index)),
            TextPanelInfo { kind: PanelKind::Character, .. } => None,
        }
    }

    /// Picks the live material and pixel source for the active mode.
    pub fn wire(&mut self, wiring: &Wiring<'_>) {
        if self.is_text_panel() {
            self.delay_offset = None;
            self.source = TileSource::Panel;
            self.material = match wiring.mode {
                Mode::Delay => Material::Plain { mirror: false },
                _ => Material::Text,
            };
            return;
        }

        self.delay_offset = match wiring.mode {
            Mode::Delay => wiring.delay.and_then(|order| order.offset(self.index)),
            _ => None,
        };
        let still = wiring.stills.and_then(|stills| stills.tile_image(wiring.mode, self.index)).cloned();
        self.source = match (self.delay_offset, still) {
            (Some(offset), _) => TileSource::History(offset),
            (None, Some(image)) => TileSource::Still(image),
            (None, None) => TileSource::Live,
        };

        let mirror = wiring.mirror && !matches!(self.source, TileSource::Still(_));
        self.material = match wiring.mode {
            Mode::Effects => Material::Effect { variant: self.effect_variant, mirror },
            Mode::Delay | Mode::Primitive => Material::Plain { mirror },
            Mode::Zoom => Material::Zoom {
                setting: wiring.zoom.and_then(|z| z.get(self.index)).unwrap_or(IDENTITY_ZOOM),
                mirror,
            },
            Mode::Pixelation => Material::Pixelation { variant: PixelationVariant::for_tile(self.index), mirror },
        };
    }
}

/// Mode-wide inputs to [`Tile::wire`].
#[derive(Debug, Clone, Copy)]
pub struct Wiring<'a> {
    pub mode: Mode,
    /// True while frames come from a live camera.
    pub mirror: bool,
    pub zoom: Option<&'a ZoomSettings>,
    pub delay: Option<&'a DelayOrder>,
    /// Present only while running without a camera.
    pub stills: Option<&'a FallbackImagery>,
}
