//! OpenCV-backed camera for the tester: a V4L/AVFoundation device by index, or
//! a video file that loops.

use facegrid::error::CameraError;
use facegrid::{Camera, VideoStream};
use futures::future::BoxFuture;
use image::RgbaImage;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum CaptureSource {
    Device(i32),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct OpenCvCamera {
    pub source: CaptureSource,
    pub width: u32,
    pub height: u32,
}

impl Camera for OpenCvCamera {
    fn acquire(&self) -> BoxFuture<'static, Result<Box<dyn VideoStream>, CameraError>> {
        let camera = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || camera.open())
                .await
                .map_err(|e| CameraError::Backend(e.to_string()))?
        })
    }
}

fn backend(e: opencv::Error) -> CameraError {
    CameraError::Backend(e.to_string())
}

impl OpenCvCamera {
    fn open(&self) -> Result<Box<dyn VideoStream>, CameraError> {
        let (mut cap, looping) = match &self.source {
            CaptureSource::Device(index) => (VideoCapture::new(*index, videoio::CAP_ANY).map_err(backend)?, false),
            CaptureSource::File(path) => {
                let path = path.to_string_lossy();
                (VideoCapture::from_file(&path, videoio::CAP_ANY).map_err(backend)?, true)
            }
        };
        if !cap.is_opened().map_err(backend)? {
            return Err(CameraError::Unavailable(format!("{:?} could not be opened", self.source)));
        }
        if !looping {
            cap.set(videoio::CAP_PROP_FRAME_WIDTH, f64::from(self.width)).map_err(backend)?;
            cap.set(videoio::CAP_PROP_FRAME_HEIGHT, f64::from(self.height)).map_err(backend)?;
        }
        tracing::info!(source = ?self.source, "capture opened");
        Ok(Box::new(OpenCvStream { cap, frame: Mat::default(), rgba: Mat::default(), looping, stopped: false }))
    }
}

pub struct OpenCvStream {
    cap: VideoCapture,
    frame: Mat,
    rgba: Mat,
    looping: bool,
    stopped: bool,
}

impl VideoStream for OpenCvStream {
    fn is_ready(&self) -> bool {
        !self.stopped
    }

    fn read_frame(&mut self) -> Result<Option<RgbaImage>, CameraError> {
        if self.stopped {
            return Err(CameraError::StreamEnded);
        }
        let read = self.cap.read(&mut self.frame).map_err(backend)?;
        if !read || self.frame.empty() {
            if self.looping {
                self.cap.set(videoio::CAP_PROP_POS_FRAMES, 0.0).map_err(backend)?;
                return Ok(None);
            }
            return Err(CameraError::StreamEnded);
        }
        imgproc::cvt_color(&self.frame, &mut self.rgba, imgproc::COLOR_BGR2RGBA, 0).map_err(backend)?;
        let (width, height) = (self.rgba.cols() as u32, self.rgba.rows() as u32);
        let data = self.rgba.data_bytes().map_err(backend)?.to_vec();
        RgbaImage::from_raw(width, height, data)
            .map(Some)
            .ok_or_else(|| CameraError::Backend("frame buffer size mismatch".into()))
    }

    fn stop(&mut self) {
        self.stopped = true;
        if let Err(e) = self.cap.release() {
            tracing::warn!(error = %e, "failed to release capture");
        }
    }

    /// Files are played back as recorded.
    fn is_live(&self) -> bool {
        !self.looping
    }
}

/// Copies an RGBA image into a BGR `Mat` for display or recording.
pub fn rgba_to_bgr(image: &RgbaImage) -> opencv::Result<Mat> {
    let mut rgba = Mat::new_rows_cols_with_default(
        image.height() as i32,
        image.width() as i32,
        opencv::core::CV_8UC4,
        opencv::core::Scalar::all(0.0),
    )?;
    rgba.data_bytes_mut()?.copy_from_slice(image.as_raw());
    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgba, &mut bgr, imgproc::COLOR_RGBA2BGR, 0)?;
    Ok(bgr)
}

/// Grayscale `Mat` of an RGBA image, histogram-equalized for the cascades.
pub fn rgba_to_gray(image: &RgbaImage) -> opencv::Result<Mat> {
    let bgr = rgba_to_bgr(image)?;
    let mut gray = Mat::default();
    imgproc::cvt_color(&bgr, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
    let mut equalized = Mat::default();
    imgproc::equalize_hist(&gray, &mut equalized)?;
    Ok(equalized)
}
