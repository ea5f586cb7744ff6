// THEORY:
// Zoom mode turns every tile into a magnifying glass trained on part of the
// viewer's face, mostly around the eyes. Each tile gets its own zoom factor and
// pan offset. Those values are computed once per activation and then frozen:
// the look is "stable" until the viewer explicitly asks for new positions.
//
// Key architectural principles:
// 1.  **Two Origins**: a randomized placeholder is used the moment zoom mode is
//     entered. The first detection result replaces it once with face-aware
//     settings, after which the set never changes on its own.
// 2.  **Eye Regions**: face-aware settings cycle through twelve points
//     around the eyes and nose bridge of the main face, so neighbouring tiles
//     look at different features.
// 3.  **Pure Construction**: both constructors take an injected RNG and return
//     plain data; freezing is the caller's responsibility (see `mode.rs`).

use super::detection::{Detection, main_face};
use glam::Vec2;
use rand::Rng;

/// Base zoom factors cycled by face-aware settings.
pub const ZOOM_LEVELS: [f32; 6] = [1.2, 2.0, 3.5, 5.0, 7.5, 10.0];

/// Face assumed when detections contain no face at all.
pub const FALLBACK_FACE: Detection = Detection::face(0.5, 0.4, 0.25, 0.33, 0.8);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomSetting {
    pub zoom: f32,
    pub pan: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomOrigin {
    Randomized,
    FaceAware,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoomSettings {
    pub origin: ZoomOrigin,
    settings: Vec<ZoomSetting>,
}

impl ZoomSettings {
    /// Placeholder settings: zoom in `1.2..8.9`, pan spread around the centre.
    pub fn randomized<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Self {
        let settings = (0..count)
            .map(|_| ZoomSetting {
                zoom: 1.2 + rng.r#gen::<f32>() * 7.7,
                pan: Vec2::new((rng.r#gen::<f32>() - 0.5) * 1.5, (rng.r#gen::<f32>() - 0.5) * 1.2),
            })
            .collect();
        Self { origin: ZoomOrigin::Randomized, settings }
    }

    /// Settings aimed at the eye area of the main detected face.
    pub fn face_aware<R: Rng + ?Sized>(count: usize, detections: &[Detection], rng: &mut R) -> Self {
        let face = main_face(detections).copied().unwrap_or(FALLBACK_FACE);
        let regions = eye_regions(&face);
        let settings = (0..count)
            .map(|i| {
                let level = ZOOM_LEVELS[rng.gen_range(0..ZOOM_LEVELS.len())];
                let region = regions[i % regions.len()];
                ZoomSetting {
                    zoom: level * (0.8 + rng.r#gen::<f32>() * 0.4),
                    pan: Vec2::new((region.x - 0.5) * 1.6, (region.y - 0.45) * 1.2),
                }
            })
            .collect();
        Self { origin: ZoomOrigin::FaceAware, settings }
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    pub fn get(&self, tile: usize) -> Option<ZoomSetting> {
        self.settings.get(tile).copied()
    }
}

/// Twelve focus points around the eyes of `face`, in normalized coordinates.
pub fn eye_regions(face: &Detection) -> [Vec2; 12] {
    let (cx, cy) = (face.x, face.y);
    [
        Vec2::new(cx - 0.08, cy - 0.05),
        Vec2::new(cx - 0.10, cy - 0.05),
        Vec2::new(cx - 0.06, cy - 0.05),
        Vec2::new(cx - 0.08, cy - 0.07),
        Vec2::new(cx - 0.08, cy - 0.03),
        Vec2::new(cx + 0.08, cy - 0.05),
        Vec2::new(cx + 0.10, cy - 0.05),
        Vec2::new(cx + 0.06, cy - 0.05),
        Vec2::new(cx + 0.08, cy - 0.07),
        Vec2::new(cx + 0.08, cy - 0.03),
        // nose bridge, then between the eyes
        Vec2::new(cx, cy - 0.05),
        Vec2::new(cx, cy - 0.08),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn randomized_settings_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(4);
        let settings = ZoomSettings::randomized(200, &mut rng);
        assert_eq!(settings.len(), 200);
        for i in 0..200 {
            let s = settings.get(i).unwrap();
            assert!((1.2..=8.9).contains(&s.zoom));
            assert!(s.pan.x.abs() <= 0.75 && s.pan.y.abs() <= 0.6);
        }
    }

    #[test]
    fn face_aware_pans_follow_eye_regions() {
        let mut rng = StdRng::seed_from_u64(4);
        let face = Detection::face(0.5, 0.45, 0.3, 0.3, 0.9);
        let settings = ZoomSettings::face_aware(24, &[Detection::eye(0.1, 0.1, 0.1, 0.1, 1.0), face], &mut rng);
        assert_eq!(settings.origin, ZoomOrigin::FaceAware);

        let nose_bridge = settings.get(10).unwrap();
        assert!((nose_bridge.pan.x - 0.0).abs() < 1e-6);
        assert!((nose_bridge.pan.y - (-0.05 * 1.2)).abs() < 1e-5);
        // Regions repeat every twelve tiles.
        assert_eq!(settings.get(3).unwrap().pan, settings.get(15).unwrap().pan);
        for i in 0..24 {
            let zoom = settings.get(i).unwrap().zoom;
            assert!((1.2 * 0.8..=10.0 * 1.2).contains(&zoom));
        }
    }

    #[test]
    fn eyes_only_falls_back_to_default_face() {
        let mut rng = StdRng::seed_from_u64(8);
        let settings = ZoomSettings::face_aware(1, &[Detection::eye(0.9, 0.9, 0.1, 0.1, 1.0)], &mut rng);
        let expected = (FALLBACK_FACE.x - 0.08 - 0.5) * 1.6;
        assert!((settings.get(0).unwrap().pan.x - expected).abs() < 1e-6);
    }
}
