//! Haar-cascade face and eye detection behind the engine's detector trait.

use crate::capture::rgba_to_gray;
use facegrid::core_modules::detection::MIN_DETECTION_CONFIDENCE;
use facegrid::error::DetectError;
use facegrid::{Detection, FaceDetector};
use futures::future::BoxFuture;
use image::RgbaImage;
use opencv::{
    core::{Rect, Size, Vector},
    objdetect::CascadeClassifier,
    prelude::*,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Haar cascades report no score; every hit is kept at this confidence.
const CASCADE_CONFIDENCE: f32 = 0.9;

struct Cascades {
    faces: Mutex<CascadeClassifier>,
    eyes: Option<Mutex<CascadeClassifier>>,
}

pub struct HaarDetector {
    cascades: Arc<Cascades>,
}

impl HaarDetector {
    pub fn load(face_cascade: &Path, eye_cascade: Option<&Path>) -> anyhow::Result<Self> {
        let faces = CascadeClassifier::new(&face_cascade.to_string_lossy())?;
        let eyes = match eye_cascade {
            Some(path) => Some(Mutex::new(CascadeClassifier::new(&path.to_string_lossy())?)),
            None => None,
        };
        Ok(Self { cascades: Arc::new(Cascades { faces: Mutex::new(faces), eyes }) })
    }
}

impl FaceDetector for HaarDetector {
    fn detect(&self, frame: Arc<RgbaImage>) -> BoxFuture<'static, Result<Vec<Detection>, DetectError>> {
        let cascades = self.cascades.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || cascades.run(&frame))
                .await
                .map_err(|e| DetectError::Failed(e.to_string()))?
        })
    }

    fn name(&self) -> &str {
        "haar-cascade"
    }
}

fn run_cascade(cascade: &Mutex<CascadeClassifier>, gray: &Mat, min_size: i32) -> Result<Vector<Rect>, DetectError> {
    let mut cascade = cascade.lock().map_err(|_| DetectError::Failed("cascade lock poisoned".into()))?;
    let mut found = Vector::<Rect>::new();
    cascade
        .detect_multi_scale(gray, &mut found, 1.1, 4, 0, Size::new(min_size, min_size), Size::new(0, 0))
        .map_err(|e| DetectError::Failed(e.to_string()))?;
    Ok(found)
}

fn normalized(rect: Rect, width: f32, height: f32) -> (f32, f32, f32, f32) {
    (
        (rect.x as f32 + rect.width as f32 / 2.0) / width,
        (rect.y as f32 + rect.height as f32 / 2.0) / height,
        rect.width as f32 / width,
        rect.height as f32 / height,
    )
}

impl Cascades {
    fn run(&self, frame: &RgbaImage) -> Result<Vec<Detection>, DetectError> {
        let gray = rgba_to_gray(frame).map_err(|e| DetectError::Failed(e.to_string()))?;
        let (width, height) = (frame.width().max(1) as f32, frame.height().max(1) as f32);

        let mut detections: Vec<Detection> = run_cascade(&self.faces, &gray, 40)?
            .iter()
            .map(|rect| {
                let (x, y, w, h) = normalized(rect, width, height);
                Detection::face(x, y, w, h, CASCADE_CONFIDENCE)
            })
            .filter(|d| d.confidence >= MIN_DETECTION_CONFIDENCE)
            .collect();
        // Largest face first so it becomes the main face.
        detections.sort_by(|a, b| (b.width * b.height).total_cmp(&(a.width * a.height)));

        if let (Some(eyes), Some(face)) = (&self.eyes, detections.first().copied()) {
            let in_upper_face = |d: &Detection| {
                (d.x - face.x).abs() < face.width / 2.0 && d.y < face.y && d.y > face.y - face.height / 2.0
            };
            let found: Vec<Detection> = run_cascade(eyes, &gray, 12)?
                .iter()
                .map(|rect| {
                    let (x, y, w, h) = normalized(rect, width, height);
                    Detection::eye(x, y, w, h, CASCADE_CONFIDENCE)
                })
                .filter(in_upper_face)
                .take(2)
                .collect();
            detections.extend(found);
        }
        Ok(detections)
    }
}
