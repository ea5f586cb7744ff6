// THEORY:
// Face detection is a best-effort collaborator. The engine asks for detections
// on a fixed cadence, but it never waits for them, never queues them, and never
// lets a failing detector take the display down with it.
//
// Key architectural principles:
// 1.  **Explicit Request/Response**: a detector is a trait object returning a
//     boxed future. Every request runs under a timeout, and a timeout counts as a
//     failure like any other.
// 2.  **Reentrancy Guard**: the poller carries a busy flag. A poll that arrives
//     while a request is in flight is skipped, not queued.
// 3.  **Failure Budget**: more than `failure_limit` consecutive failures
//     permanently disable the detector for the session. From then on (and when no
//     detector exists at all) fixed heuristic positions stand in for real faces.

use crate::error::DetectError;
use futures::future::BoxFuture;
use image::RgbaImage;
use std::sync::Arc;
use std::time::Duration;

/// Minimum confidence a detector should report for a face to be kept.
pub const MIN_DETECTION_CONFIDENCE: f32 = 0.7;

/// A detected region in normalized frame coordinates (`0..1`, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Detection {
    /// Centre x.
    pub x: f32,
    /// Centre y.
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    #[serde(default)]
    pub is_eye: bool,
}

impl Detection {
    pub const fn face(x: f32, y: f32, width: f32, height: f32, confidence: f32) -> Self {
        Self { x, y, width, height, confidence, is_eye: false }
    }

    pub const fn eye(x: f32, y: f32, width: f32, height: f32, confidence: f32) -> Self {
        Self { x, y, width, height, confidence, is_eye: true }
    }
}

/// Detections used whenever no working detector is available: one face, two
/// eyes, mouth and nose.
pub fn heuristic_detections() -> Vec<Detection> {
    vec![
        Detection::face(0.5, 0.4, 0.25, 0.33, 0.9),
        Detection::eye(0.45, 0.35, 0.08, 0.06, 0.8),
        Detection::eye(0.55, 0.35, 0.08, 0.06, 0.8),
        Detection::face(0.5, 0.48, 0.1, 0.06, 0.7),
        Detection::face(0.5, 0.42, 0.06, 0.08, 0.6),
    ]
}

/// The first non-eye detection, if any.
pub fn main_face(detections: &[Detection]) -> Option<&Detection> {
    detections.iter().find(|d| !d.is_eye)
}

/// A face/eye detector.
///
/// Implementations own whatever model they need; the frame is shared so the
/// request can move to a blocking thread.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, frame: Arc<RgbaImage>) -> BoxFuture<'static, Result<Vec<Detection>, DetectError>>;

    fn name(&self) -> &str {
        "detector"
    }
}

/// Tunables for the poller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionPolicy {
    pub interval: Duration,
    pub timeout: Duration,
    /// Failures tolerated before the detector is disabled.
    pub failure_limit: u32,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(150),
            timeout: Duration::from_millis(1000),
            failure_limit: 5,
        }
    }
}

/// Outcome of asking the poller to start a detection round.
pub enum PollStart {
    /// A request is already in flight; skip this round.
    Busy,
    /// No usable detector: use these detections immediately.
    Fallback(Vec<Detection>),
    /// Run this job, then hand its result to [`DetectionPoller::finish`].
    Job(DetectionJob),
}

/// A single in-flight request.
pub struct DetectionJob {
    future: BoxFuture<'static, Result<Vec<Detection>, DetectError>>,
    timeout: Duration,
}

impl DetectionJob {
    pub async fn run(self) -> Result<Vec<Detection>, DetectError> {
        match tokio::time::timeout(self.timeout, self.future).await {
            Ok(result) => result,
            Err(_) => Err(DetectError::Timeout(self.timeout)),
        }
    }
}

pub struct DetectionPoller {
    detector: Option<Arc<dyn FaceDetector>>,
    policy: DetectionPolicy,
    consecutive_failures: u32,
    disabled: bool,
    busy: bool,
}

impl DetectionPoller {
    pub fn new(detector: Option<Arc<dyn FaceDetector>>, policy: DetectionPolicy) -> Self {
        if detector.is_none() {
            tracing::info!("no face detector configured, using heuristic positions");
        }
        Self { detector, policy, consecutive_failures: 0, disabled: false, busy: false }
    }

    pub fn policy(&self) -> DetectionPolicy {
        self.policy
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// True once the detector is gone for the session (or never existed).
    pub fn is_disabled(&self) -> bool {
        self.disabled || self.detector.is_none()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn begin(&mut self, frame: Arc<RgbaImage>) -> PollStart {
        if self.busy {
            return PollStart::Busy;
        }
        let detector = match (&self.detector, self.disabled) {
            (Some(detector), false) => detector.clone(),
            _ => return PollStart::Fallback(heuristic_detections()),
        };
        self.busy = true;
        PollStart::Job(DetectionJob { future: detector.detect(frame), timeout: self.policy.timeout })
    }

    /// Records the result of a job and returns the detections to use.
    pub fn finish(&mut self, result: Result<Vec<Detection>, DetectError>) -> Vec<Detection> {
        self.busy = false;
        match result {
            Ok(detections) => {
                self.consecutive_failures = 0;
                detections
            }
            Err(e) => {
                self.consecutive_failures += 1;
                tracing::warn!(error = %e, failures = self.consecutive_failures, "face detection failed");
                if self.consecutive_failures > self.policy.failure_limit && !self.disabled {
                    self.disabled = true;
                    tracing::warn!(
                        limit = self.policy.failure_limit,
                        "face detector disabled for this session, falling back to heuristic positions"
                    );
                }
                heuristic_detections()
            }
        }
    }

    /// Runs one complete round inline. Returns `None` when skipped as busy.
    pub async fn poll(&mut self, frame: Arc<RgbaImage>) -> Option<Vec<Detection>> {
        match self.begin(frame) {
            PollStart::Busy => None,
            PollStart::Fallback(detections) => Some(detections),
            PollStart::Job(job) => {
                let result = job.run().await;
                Some(self.finish(result))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    impl FaceDetector for Flaky {
        fn detect(&self, _frame: Arc<RgbaImage>) -> BoxFuture<'static, Result<Vec<Detection>, DetectError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(DetectError::Failed("no model".into()))
                } else {
                    Ok(vec![Detection::face(0.3, 0.3, 0.2, 0.2, 0.95)])
                }
            })
        }
    }

    struct Stalled;

    impl FaceDetector for Stalled {
        fn detect(&self, _frame: Arc<RgbaImage>) -> BoxFuture<'static, Result<Vec<Detection>, DetectError>> {
            Box::pin(futures::future::pending())
        }
    }

    fn frame() -> Arc<RgbaImage> {
        Arc::new(RgbaImage::new(4, 4))
    }

    #[tokio::test]
    async fn disables_after_more_than_limit_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let detector: Arc<dyn FaceDetector> = Arc::new(Flaky { calls: calls.clone(), fail: true });
        let mut poller = DetectionPoller::new(Some(detector), DetectionPolicy::default());

        for _ in 0..6 {
            let detections = poller.poll(frame()).await.expect("not busy");
            assert_eq!(detections, heuristic_detections());
        }
        assert!(poller.is_disabled());
        assert_eq!(calls.load(Ordering::SeqCst), 6);

        poller.poll(frame()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let calls = Arc::new(AtomicU32::new(0));
        let detector: Arc<dyn FaceDetector> = Arc::new(Flaky { calls, fail: false });
        let mut poller = DetectionPoller::new(Some(detector), DetectionPolicy::default());
        poller.consecutive_failures = 3;
        let detections = poller.poll(frame()).await.expect("not busy");
        assert_eq!(detections.len(), 1);
        assert_eq!(poller.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_detector_times_out() {
        let policy = DetectionPolicy { timeout: Duration::from_millis(50), ..DetectionPolicy::default() };
        let mut poller = DetectionPoller::new(Some(Arc::new(Stalled)), policy);
        let detections = poller.poll(frame()).await.expect("not busy");
        assert_eq!(detections, heuristic_detections());
        assert_eq!(poller.consecutive_failures(), 1);
    }

    #[test]
    fn overlapping_rounds_are_skipped() {
        let mut poller = DetectionPoller::new(Some(Arc::new(Stalled)), DetectionPolicy::default());
        assert!(matches!(poller.begin(frame()), PollStart::Job(_)));
        assert!(matches!(poller.begin(frame()), PollStart::Busy));
    }

    #[test]
    fn missing_detector_uses_heuristics() {
        let mut poller = DetectionPoller::new(None, DetectionPolicy::default());
        assert!(poller.is_disabled());
        match poller.begin(frame()) {
            PollStart::Fallback(d) => assert_eq!(main_face(&d).map(|f| f.x), Some(0.5)),
            _ => panic!("expected heuristic fallback"),
        }
    }
}
