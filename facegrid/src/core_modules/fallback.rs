// THEORY:
// Fallback imagery is what the grid shows when no camera is available: a
// per-mode list of still images, cycled once a second, or a procedural gradient
// when no image could be loaded. The engine never refuses to draw for lack of a
// camera.
//
// Key architectural principles:
// 1.  **Load Failures Degrade**: an image that fails to load is logged and
//     skipped. If a mode ends up with no images it uses the gradient.
// 2.  **Pre-Scaled**: every image is resized to the capture resolution at load
//     time, so capture is a straight copy.
// 3.  **Stable Per-Tile Split**: with two or more images, non-text tiles outside
//     delay mode show image 0 or 1 by a fixed hash of their index.

use super::mode::Mode;
use crate::error::AssetError;
use image::{Rgba, RgbaImage, imageops};
use rand::Rng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const GRADIENT_EDGE: [u8; 3] = [0x1a, 0x1a, 0x1a];
const GRADIENT_MID: [u8; 3] = [0x2d, 0x2d, 0x2d];
const NOISE_DOTS: usize = 1000;
const NOISE_ALPHA: f32 = 0.03;

/// `#1a1a1a -> #2d2d2d -> #1a1a1a` along the diagonal, with faint noise dots.
pub fn procedural_gradient<R: Rng + ?Sized>(width: u32, height: u32, rng: &mut R) -> RgbaImage {
    let span = (width + height).saturating_sub(2).max(1) as f32;
    let mut img = RgbaImage::from_fn(width, height, |x, y| {
        let t = (x + y) as f32 / span;
        let k = 1.0 - (2.0 * t - 1.0).abs();
        let c = |i: usize| (f32::from(GRADIENT_EDGE[i]) + (f32::from(GRADIENT_MID[i]) - f32::from(GRADIENT_EDGE[i])) * k).round() as u8;
        Rgba([c(0), c(1), c(2), 255])
    });
    if width == 0 || height == 0 {
        return img;
    }
    for _ in 0..NOISE_DOTS {
        let (x, y) = (rng.gen_range(0..width), rng.gen_range(0..height));
        let px = img.get_pixel_mut(x, y);
        for channel in px.0.iter_mut().take(3) {
            *channel = (f32::from(*channel) * (1.0 - NOISE_ALPHA) + 255.0 * NOISE_ALPHA).round() as u8;
        }
    }
    img
}

/// Loads one image and scales it to `width x height`.
pub fn load_image(path: &Path, width: u32, height: u32) -> Result<RgbaImage, AssetError> {
    let decoded = image::open(path).map_err(|source| match source {
        image::ImageError::IoError(io) => AssetError::Io { path: path.to_path_buf(), source: io },
        other => AssetError::Image { path: path.to_path_buf(), source: other },
    })?;
    Ok(imageops::resize(&decoded.to_rgba8(), width, height, imageops::FilterType::Triangle))
}

#[derive(Debug, Clone)]
pub struct FallbackImagery {
    per_mode: HashMap<Mode, Vec<Arc<RgbaImage>>>,
    gradient: Arc<RgbaImage>,
}

impl FallbackImagery {
    /// Gradient only.
    pub fn gradient_only<R: Rng + ?Sized>(width: u32, height: u32, rng: &mut R) -> Self {
        Self { per_mode: HashMap::new(), gradient: Arc::new(procedural_gradient(width, height, rng)) }
    }

    /// Loads every configured image. Failures are logged and skipped.
    pub fn load<R: Rng + ?Sized>(paths: &HashMap<Mode, Vec<PathBuf>>, width: u32, height: u32, rng: &mut R) -> Self {
        let mut imagery = Self::gradient_only(width, height, rng);
        for (mode, files) in paths {
            let loaded: Vec<Arc<RgbaImage>> = files
                .iter()
                .filter_map(|path| match load_image(path, width, height) {
                    Ok(img) => Some(Arc::new(img)),
                    Err(e) => {
                        tracing::warn!(error = %e, mode = %mode, "fallback image failed to load, skipping");
                        None
                    }
                })
                .collect();
            tracing::debug!(mode = %mode, loaded = loaded.len(), requested = files.len(), "fallback images loaded");
            if !loaded.is_empty() {
                imagery.per_mode.insert(*mode, loaded);
            }
        }
        imagery
    }

    pub fn insert(&mut self, mode: Mode, images: Vec<RgbaImage>) {
        self.per_mode.insert(mode, images.into_iter().map(Arc::new).collect());
    }

    pub fn images(&self, mode: Mode) -> &[Arc<RgbaImage>] {
        self.per_mode.get(&mode).map_or(&[], Vec::as_slice)
    }

    pub fn gradient(&self) -> &Arc<RgbaImage> {
        &self.gradient
    }

    /// The frame captured into the history while no camera is ready.
    pub fn frame_for(&self, mode: Mode, elapsed: Duration) -> &RgbaImage {
        let images = self.images(mode);
        if images.is_empty() {
            return &self.gradient;
        }
        &images[elapsed.as_secs() as usize % images.len()]
    }

    /// The still shown by a non-text tile in fallback mode, when the mode has
    /// at least two images. Delay mode always reads the history instead.
    pub fn tile_image(&self, mode: Mode, tile_index: usize) -> Option<&Arc<RgbaImage>> {
        let images = self.images(mode);
        if mode == Mode::Delay || images.len() < 2 {
            return None;
        }
        let pick = if tile_index.wrapping_mul(7919) % 1000 < 500 { 0 } else { 1 };
        images.get(pick)
    }
}
