// THEORY:
// The camera is an external collaborator behind two traits. `Camera::acquire`
// is the single asynchronous request the engine makes of the platform; the
// `VideoStream` it yields is polled synchronously once per capture tick.
//
// Key architectural principles:
// 1.  **Acquisition Can Fail, Startup Cannot**: the engine treats an acquisition
//     error as "no camera" and keeps running on fallback imagery.
// 2.  **Readiness Is Explicit**: a stream that is not yet ready (or returns no
//     frame) makes the capture step substitute a fallback frame rather than skip.
// 3.  **Release On Stop**: `stop` releases the underlying device; a stopped stream
//     never reports ready again.

use crate::error::CameraError;
use futures::future::BoxFuture;
use image::{Rgba, RgbaImage};
use std::time::Instant;

pub trait VideoStream: Send {
    /// True once frames can be read (the device delivered its first frame).
    fn is_ready(&self) -> bool;

    /// The most recent frame, or `None` if none is available right now.
    fn read_frame(&mut self) -> Result<Option<RgbaImage>, CameraError>;

    /// Releases the device.
    fn stop(&mut self);

    /// True when frames come from a live camera and should be mirrored.
    fn is_live(&self) -> bool {
        true
    }
}

pub trait Camera: Send + Sync {
    fn acquire(&self) -> BoxFuture<'static, Result<Box<dyn VideoStream>, CameraError>>;
}

/// A synthetic stream of moving colour bands. Stands in for a camera in
/// headless and browser-streamed runs.
pub struct PatternStream {
    width: u32,
    height: u32,
    started: Instant,
    stopped: bool,
}

impl PatternStream {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, started: Instant::now(), stopped: false }
    }

    fn render(&self, t: f32) -> RgbaImage {
        let (w, h) = (self.width.max(1) as f32, self.height.max(1) as f32);
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let u = x as f32 / w;
            let v = y as f32 / h;
            let r = 0.5 + 0.5 * (u * 6.0 + t).sin();
            let g = 0.5 + 0.5 * (v * 4.0 - t * 0.7).sin();
            let b = 0.5 + 0.5 * ((u + v) * 5.0 + t * 1.3).cos();
            Rgba([(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8, 255])
        })
    }
}

impl VideoStream for PatternStream {
    fn is_ready(&self) -> bool {
        !self.stopped
    }

    fn read_frame(&mut self) -> Result<Option<RgbaImage>, CameraError> {
        if self.stopped {
            return Err(CameraError::StreamEnded);
        }
        Ok(Some(self.render(self.started.elapsed().as_secs_f32())))
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn is_live(&self) -> bool {
        false
    }
}

/// A camera that always yields a [`PatternStream`].
#[derive(Debug, Clone, Copy)]
pub struct PatternCamera {
    pub width: u32,
    pub height: u32,
}

impl Camera for PatternCamera {
    fn acquire(&self) -> BoxFuture<'static, Result<Box<dyn VideoStream>, CameraError>> {
        let (width, height) = (self.width, self.height);
        Box::pin(async move { Ok(Box::new(PatternStream::new(width, height)) as Box<dyn VideoStream>) })
    }
}

/// A camera that is never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCamera;

impl Camera for NoCamera {
    fn acquire(&self) -> BoxFuture<'static, Result<Box<dyn VideoStream>, CameraError>> {
        Box::pin(async { Err(CameraError::Unavailable("no camera configured".into())) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pattern_camera_streams_until_stopped() {
        let mut stream = PatternCamera { width: 8, height: 6 }.acquire().await.expect("pattern camera");
        assert!(stream.is_ready());
        assert!(!stream.is_live());
        let frame = stream.read_frame().unwrap().expect("frame");
        assert_eq!(frame.dimensions(), (8, 6));
        stream.stop();
        assert!(!stream.is_ready());
        assert!(matches!(stream.read_frame(), Err(CameraError::StreamEnded)));
    }

    #[tokio::test]
    async fn no_camera_is_unavailable() {
        assert!(matches!(NoCamera.acquire().await, Err(CameraError::Unavailable(_))));
    }
}
