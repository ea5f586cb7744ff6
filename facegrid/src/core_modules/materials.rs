// THEORY:
// A `Material` is the per-tile "shader": a pure description of how a tile maps
// its output coordinates to a source texture coordinate and how it transforms
// the sampled colour. The renderer evaluates materials per pixel on the CPU.
//
// Key architectural principles:
// 1.  **Tagged Union**: exactly one material is live per tile. The five kinds
//     are enum variants, so inactive kinds are simply never constructed, and a
//     mode switch builds the new variant instead of swapping references.
// 2.  **Two Stages**: `source_uv` (mirroring, zoom/pan, pixel quantization) and
//     `shade` (colour transform) are separate, so the renderer can sample once
//     between them.
// 3.  **Reveal Is Universal**: every kind blends from black by the tile's
//     `reveal` scalar. That blend is done once by the renderer, not by each
//     variant.
//
// Texture coordinates follow the usual GPU convention: origin bottom-left,
// `v` growing upwards.

use super::zoom::ZoomSetting;
use glam::{Vec2, Vec3};

/// `#ddddd1`, the light half of the duotone palette and the caption paper colour.
pub const PALETTE_LIGHT: Vec3 = Vec3::new(0.867, 0.867, 0.820);
/// `#444444`, the dark half.
pub const PALETTE_DARK: Vec3 = Vec3::splat(0.267);

const LUMA: Vec3 = Vec3::new(0.299, 0.587, 0.114);
/// Width/height ratio of the capture resolution.
const CAPTURE_ASPECT: f32 = 640.0 / 480.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    Effect,
    Plain,
    Text,
    Zoom,
    Pixelation,
}

/// Colour transforms available in effects mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EffectVariant {
    #[default]
    Original,
    /// High contrast, six-level posterize.
    Posterize,
    /// Luminance pushed into a red monochrome.
    Red,
    /// Luminance pushed into a cyan monochrome.
    Cyan,
    /// Inverted with rotated channels.
    Invert,
    /// Strong oversaturation.
    Saturate,
}

impl EffectVariant {
    pub const ALL: [EffectVariant; 6] = [
        EffectVariant::Original,
        EffectVariant::Posterize,
        EffectVariant::Red,
        EffectVariant::Cyan,
        EffectVariant::Invert,
        EffectVariant::Saturate,
    ];
    pub const COUNT: usize = Self::ALL.len();

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % Self::COUNT]
    }

    pub fn shade(self, c: Vec3) -> Vec3 {
        match self {
            EffectVariant::Original => c,
            EffectVariant::Posterize => {
                let contrasted = (c - 0.5) * 2.5 + 0.5;
                (contrasted * 6.0).floor() / 6.0
            }
            EffectVariant::Red => {
                let l = c.dot(LUMA);
                pow(Vec3::new(l * 2.0, l * 0.1, l * 0.1), 0.7)
            }
            EffectVariant::Cyan => {
                let l = c.dot(LUMA);
                pow(Vec3::new(l * 0.2, l * 1.5, l * 2.0), 0.8)
            }
            EffectVariant::Invert => {
                let inverted = Vec3::ONE - c;
                pow(Vec3::new(inverted.y, inverted.z, inverted.x), 0.6)
            }
            EffectVariant::Saturate => {
                let gray = Vec3::splat(c.dot(LUMA));
                pow(gray.lerp(c, 3.5), 0.8)
            }
        }
    }
}

struct PixelationSpec {
    blocks: Vec2,
    /// `(gray threshold, light mix)` bands, brightest first.
    bands: &'static [(f32, f32)],
    /// Light mix below every threshold.
    floor: f32,
}

const PIXELATION_SPECS: [PixelationSpec; 5] = [
    PixelationSpec { blocks: Vec2::new(15.0, 12.0), bands: &[(0.6, 1.0), (0.3, 0.6)], floor: 0.0 },
    PixelationSpec { blocks: Vec2::new(25.0, 20.0), bands: &[(0.7, 1.0), (0.4, 0.5), (0.15, 0.25)], floor: 0.0 },
    PixelationSpec { blocks: Vec2::new(40.0, 30.0), bands: &[(0.6, 0.85), (0.3, 0.45)], floor: 0.1 },
    PixelationSpec { blocks: Vec2::new(8.0, 6.0), bands: &[(0.5, 0.8), (0.25, 0.4)], floor: 0.0 },
    PixelationSpec { blocks: Vec2::new(20.0, 20.0), bands: &[(0.6, 0.75), (0.3, 0.35)], floor: 0.02 },
];

/// One of the five block-size/threshold presets of pixelation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelationVariant(u8);

impl PixelationVariant {
    pub const COUNT: usize = PIXELATION_SPECS.len();

    /// Variant for a tile: tiles cycle through the presets by index.
    pub fn for_tile(index: usize) -> Self {
        Self((index % Self::COUNT) as u8)
    }

    fn spec(self) -> &'static PixelationSpec {
        &PIXELATION_SPECS[self.0 as usize]
    }

    pub fn blocks(self) -> Vec2 {
        self.spec().blocks
    }

    pub fn quantize(self, uv: Vec2) -> Vec2 {
        let blocks = self.blocks();
        (uv * blocks).floor() / blocks
    }

    /// Maps a colour through the duotone palette.
    pub fn shade(self, c: Vec3) -> Vec3 {
        let gray = c.dot(LUMA);
        let spec = self.spec();
        let mix = spec
            .bands
            .iter()
            .find(|(threshold, _)| gray > *threshold)
            .map_or(spec.floor, |(_, mix)| *mix);
        PALETTE_DARK.lerp(PALETTE_LIGHT, mix)
    }
}

/// The live material of one tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Material {
    Effect { variant: EffectVariant, mirror: bool },
    Plain { mirror: bool },
    Text,
    Zoom { setting: ZoomSetting, mirror: bool },
    Pixelation { variant: PixelationVariant, mirror: bool },
}

impl Material {
    pub fn kind(&self) -> MaterialKind {
        match self {
            Material::Effect { .. } => MaterialKind::Effect,
            Material::Plain { .. } => MaterialKind::Plain,
            Material::Text => MaterialKind::Text,
            Material::Zoom { .. } => MaterialKind::Zoom,
            Material::Pixelation { .. } => MaterialKind::Pixelation,
        }
    }

    pub fn is_mirrored(&self) -> bool {
        match *self {
            Material::Effect { mirror, .. }
            | Material::Plain { mirror }
            | Material::Zoom { mirror, .. }
            | Material::Pixelation { mirror, .. } => mirror,
            Material::Text => false,
        }
    }

    /// Maps a tile coordinate to the coordinate sampled from the source texture.
    pub fn source_uv(&self, uv: Vec2) -> Vec2 {
        let uv = if self.is_mirrored() { Vec2::new(1.0 - uv.x, uv.y) } else { uv };
        match *self {
            Material::Zoom { setting, .. } => {
                let mut uv = Vec2::new((uv.x - 0.5) * CAPTURE_ASPECT + 0.5, uv.y);
                uv = (uv - 0.5) / setting.zoom.max(f32::EPSILON) + 0.5;
                uv.x += setting.pan.x * 0.3;
                uv.y += setting.pan.y * 0.2 + 0.1;
                uv - uv.floor()
            }
            Material::Pixelation { variant, .. } => variant.quantize(uv),
            _ => uv,
        }
    }

    /// Transforms the sampled colour. The result is clamped to `0..=1`.
    pub fn shade(&self, color: Vec3) -> Vec3 {
        let shaded = match *self {
            Material::Effect { variant, .. } => variant.shade(color),
            Material::Pixelation { variant, .. } => variant.shade(color),
            Material::Plain { .. } | Material::Text | Material::Zoom { .. } => color,
        };
        shaded.clamp(Vec3::ZERO, Vec3::ONE)
    }
}

/// `mix(black, color, reveal)`.
pub fn apply_reveal(color: Vec3, reveal: f32) -> Vec3 {
    color * reveal.clamp(0.0, 1.0)
}

fn pow(c: Vec3, e: f32) -> Vec3 {
    c.max(Vec3::ZERO).powf(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-3
    }

    #[test]
    fn mirroring_flips_u_only() {
        let m = Material::Plain { mirror: true };
        assert_eq!(m.source_uv(Vec2::new(0.2, 0.7)), Vec2::new(0.8, 0.7));
        assert_eq!(Material::Text.source_uv(Vec2::new(0.2, 0.7)), Vec2::new(0.2, 0.7));
        assert!(!Material::Text.is_mirrored());
    }

    #[test]
    fn zoom_wraps_instead_of_clamping() {
        let setting = ZoomSetting { zoom: 0.5, pan: Vec2::new(1.0, 1.0) };
        let m = Material::Zoom { setting, mirror: false };
        for uv in [Vec2::ZERO, Vec2::ONE, Vec2::new(0.9, 0.15)] {
            let s = m.source_uv(uv);
            assert!((0.0..1.0).contains(&s.x) && (0.0..1.0).contains(&s.y), "{s:?}");
        }
    }

    #[test]
    fn unit_zoom_centre_is_shifted_by_pan_and_bias() {
        let setting = ZoomSetting { zoom: 1.0, pan: Vec2::ZERO };
        let m = Material::Zoom { setting, mirror: false };
        let s = m.source_uv(Vec2::splat(0.5));
        assert!((s.x - 0.5).abs() < 1e-6);
        assert!((s.y - 0.6).abs() < 1e-6);
    }

    #[test]
    fn pixelation_quantizes_to_block_grid() {
        let v = PixelationVariant::for_tile(3);
        assert_eq!(v.blocks(), Vec2::new(8.0, 6.0));
        let q = v.quantize(Vec2::new(0.26, 0.99));
        assert_eq!(q, Vec2::new(2.0 / 8.0, 5.0 / 6.0));
        assert_eq!(PixelationVariant::for_tile(5), PixelationVariant::for_tile(0));
    }

    #[test]
    fn pixelation_maps_to_duotone() {
        let v = PixelationVariant::for_tile(0);
        assert!(close(v.shade(Vec3::ONE), PALETTE_LIGHT));
        assert!(close(v.shade(Vec3::ZERO), PALETTE_DARK));
        assert!(close(v.shade(Vec3::splat(0.45)), PALETTE_DARK.lerp(PALETTE_LIGHT, 0.6)));
        let v2 = PixelationVariant::for_tile(2);
        assert!(close(v2.shade(Vec3::ZERO), PALETTE_DARK.lerp(PALETTE_LIGHT, 0.1)));
    }

    #[test]
    fn effect_variants_stay_in_range() {
        let samples = [Vec3::ZERO, Vec3::ONE, Vec3::new(0.9, 0.2, 0.4), Vec3::splat(0.5)];
        for variant in EffectVariant::ALL {
            let material = Material::Effect { variant, mirror: false };
            for c in samples {
                let out = material.shade(c);
                assert!(out.min_element() >= 0.0 && out.max_element() <= 1.0);
            }
        }
        assert_eq!(EffectVariant::Original.shade(Vec3::splat(0.3)), Vec3::splat(0.3));
        assert!(close(EffectVariant::Invert.shade(Vec3::new(1.0, 0.0, 0.0)), Vec3::new(1.0, 1.0, 0.0)));
        assert_eq!(EffectVariant::from_index(7), EffectVariant::Posterize);
    }

    #[test]
    fn reveal_blends_from_black() {
        let c = Vec3::new(0.4, 0.8, 1.0);
        assert_eq!(apply_reveal(c, 0.0), Vec3::ZERO);
        assert_eq!(apply_reveal(c, 1.0), c);
        assert_eq!(apply_reveal(c, 2.0), c);
    }
}
