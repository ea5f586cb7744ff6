//! Face and eye markers drawn over tiles in primitive mode.
//!
//! Markers live in a tile-local square space where `(-1, -1)` and `(1, 1)` are
//! the corners of the central 80% of the tile, with `y` pointing up. A
//! detection at normalized `(x, y)` lands at `((x - 0.5) * 2, -(y - 0.5) * 2)`.

use super::detection::{Detection, main_face};
use glam::Vec2;
use image::Rgba;

/// Per-tile marker colours, cycled by tile index.
pub const MARKER_COLORS: [Rgba<u8>; 5] = [
    Rgba([0xff, 0x6b, 0x6b, 255]),
    Rgba([0x4e, 0xcd, 0xc4, 255]),
    Rgba([0x45, 0xb7, 0xd1, 255]),
    Rgba([0xff, 0x9f, 0x43, 255]),
    Rgba([0x5f, 0x27, 0xcd, 255]),
];

/// Share of the tile the marker space covers.
pub const MARKER_EXTENT: f32 = 0.8;

const FACE_RADIUS: f32 = 0.4;
const FACE_Y_SCALE: f32 = 1.2;
const MOUTH_OFFSET: f32 = 0.25;
const MOUTH_RADIUS: f32 = 0.08;
const EYE_RADIUS: f32 = 0.04;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerShape {
    pub center: Vec2,
    pub radii: Vec2,
    pub opacity: f32,
    /// Drawn as an outline instead of filled.
    pub wireframe: bool,
}

impl MarkerShape {
    /// Coverage of a marker-space point, 0 or 1. Outlines are `thickness` wide.
    pub fn covers(&self, p: Vec2, thickness: f32) -> bool {
        let d = (p - self.center) / self.radii.max(Vec2::splat(f32::EPSILON));
        let r = d.length();
        if self.wireframe {
            let band = thickness / self.radii.min_element().max(f32::EPSILON);
            (r - 1.0).abs() <= band / 2.0
        } else {
            r <= 1.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveMarkers {
    pub color: Rgba<u8>,
    /// Back to front.
    pub shapes: Vec<MarkerShape>,
}

fn to_marker_space(x: f32, y: f32) -> Vec2 {
    Vec2::new((x - 0.5) * 2.0, -(y - 0.5) * 2.0)
}

/// Markers for one tile. Without any eye detection nothing is drawn.
pub fn primitive_markers(tile_index: usize, detections: &[Detection]) -> Option<PrimitiveMarkers> {
    let eyes: Vec<&Detection> = detections.iter().filter(|d| d.is_eye).collect();
    if eyes.is_empty() {
        return None;
    }

    let mut shapes = Vec::with_capacity(eyes.len() + 2);
    if let Some(face) = main_face(detections).or_else(|| detections.first()) {
        let center = to_marker_space(face.x, face.y);
        shapes.push(MarkerShape {
            center,
            radii: Vec2::new(FACE_RADIUS, FACE_RADIUS * FACE_Y_SCALE),
            opacity: 0.2,
            wireframe: true,
        });
        shapes.push(MarkerShape {
            center: center - Vec2::new(0.0, MOUTH_OFFSET),
            radii: Vec2::new(MOUTH_RADIUS * 1.5, MOUTH_RADIUS * 0.5),
            opacity: 0.7,
            wireframe: false,
        });
    }
    shapes.extend(eyes.iter().map(|eye| MarkerShape {
        center: to_marker_space(eye.x, eye.y),
        radii: Vec2::splat(EYE_RADIUS),
        opacity: 0.9,
        wireframe: false,
    }));

    Some(PrimitiveMarkers { color: MARKER_COLORS[tile_index % MARKER_COLORS.len()], shapes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::heuristic_detections;

    #[test]
    fn heuristic_detections_give_face_mouth_and_two_eyes() {
        let markers = primitive_markers(7, &heuristic_detections()).expect("heuristic has eyes");
        assert_eq!(markers.color, MARKER_COLORS[2]);
        assert_eq!(markers.shapes.len(), 4);
        let face = markers.shapes[0];
        assert!(face.wireframe);
        assert!((face.radii.y - 0.48).abs() < 1e-6);
        let mouth = markers.shapes[1];
        assert!((mouth.center.y - (face.center.y - 0.25)).abs() < 1e-6);
        assert!(markers.shapes[2..].iter().all(|s| (s.opacity - 0.9).abs() < 1e-6));
    }

    #[test]
    fn no_eyes_no_markers() {
        let faces = [Detection::face(0.5, 0.5, 0.2, 0.2, 0.9)];
        assert!(primitive_markers(0, &faces).is_none());
    }

    #[test]
    fn outline_covers_only_the_rim() {
        let ring = MarkerShape { center: Vec2::ZERO, radii: Vec2::splat(0.4), opacity: 0.2, wireframe: true };
        assert!(ring.covers(Vec2::new(0.4, 0.0), 0.02));
        assert!(!ring.covers(Vec2::ZERO, 0.02));
        let dot = MarkerShape { wireframe: false, ..ring };
        assert!(dot.covers(Vec2::ZERO, 0.02));
    }
}
