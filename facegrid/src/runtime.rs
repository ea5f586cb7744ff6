// THEORY:
// The runtime is the event loop around `FaceGridEngine`. One tokio task owns
// the engine outright; everything else talks to it through channels, the way
// the frame workers of the old parallel pipeline were fed through mpsc queues
// and answered through oneshots.
//
// Key architectural principles:
// 1.  **Single Owner**: the engine is never shared or locked. Commands arrive
//     on an mpsc queue, composited frames leave on a broadcast channel, and a
//     watch channel carries the latest debug snapshot.
// 2.  **Nothing Blocks The Display Tick**: camera acquisition and face
//     detection run as spawned tasks whose results come back as messages. The
//     detection poller's busy flag keeps at most one request in flight.
// 3.  **Debounced Resizes**: bursts of resize events collapse into one grid
//     rebuild after the debounce window.
// 4.  **Drop Means Stop**: dropping the handle asks the loop to shut down and
//     release the camera.

use crate::core_modules::camera::{Camera, VideoStream};
use crate::core_modules::detection::{Detection, DetectionPoller, FaceDetector, PollStart};
use crate::core_modules::grid_partitioner::Viewport;
use crate::engine::{DebugState, EngineCommand, FaceGridEngine};
use crate::error::{CameraError, DetectError, FaceGridError, Result};
use image::RgbaImage;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant as TokioInstant, MissedTickBehavior};

const FRAME_CHANNEL_CAPACITY: usize = 4;
const NAVIGATION_CHANNEL_CAPACITY: usize = 16;

/// One composited frame.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub frame_id: u64,
    pub timestamp: std::time::Instant,
    pub image: Arc<RgbaImage>,
}

type CameraResult = std::result::Result<Box<dyn VideoStream>, CameraError>;
type DetectionResult = std::result::Result<Vec<Detection>, DetectError>;

/// The engine's clock. Follows tokio's clock so paused-time tests drive it.
fn now() -> std::time::Instant {
    TokioInstant::now().into_std()
}

pub struct FaceGridRuntime {
    engine: FaceGridEngine,
    camera: Arc<dyn Camera>,
    poller: DetectionPoller,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    frames: broadcast::Sender<RenderedFrame>,
    navigation: broadcast::Sender<String>,
    state: watch::Sender<DebugState>,
    frame_counter: u64,
}

impl FaceGridRuntime {
    /// Moves `engine` onto a new task. Must be called inside a tokio runtime.
    pub fn spawn(engine: FaceGridEngine, camera: Arc<dyn Camera>, detector: Option<Arc<dyn FaceDetector>>) -> RuntimeHandle {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (frames, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        let (navigation, _) = broadcast::channel(NAVIGATION_CHANNEL_CAPACITY);
        let (state, state_rx) = watch::channel(engine.debug_state());

        let runtime = Self {
            poller: DetectionPoller::new(detector, engine.config().detection_policy()),
            engine,
            camera,
            commands,
            frames: frames.clone(),
            navigation: navigation.clone(),
            state,
            frame_counter: 0,
        };
        let task = tokio::spawn(runtime.run());
        RuntimeHandle { commands: command_tx, frames, navigation, state: state_rx, task: Some(task) }
    }

    async fn run(mut self) {
        let mut display = tokio::time::interval(self.engine.config().frame_interval());
        display.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut detection = tokio::time::interval(self.poller.policy().interval);
        detection.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let debounce = self.engine.config().resize_debounce();

        let (detection_tx, mut detection_rx) = mpsc::unbounded_channel::<DetectionResult>();
        let (camera_tx, mut camera_rx) = mpsc::unbounded_channel::<CameraResult>();
        let mut pending_resize: Option<(TokioInstant, Viewport)> = None;

        tracing::info!(mode = %self.engine.mode(), "face grid runtime started");
        loop {
            let resize_at = pending_resize.map(|(at, _)| at);
            tokio::select! {
                _ = display.tick() => self.display_tick(),
                _ = detection.tick() => self.begin_detection(&detection_tx),
                Some(result) = detection_rx.recv() => {
                    let detections = self.poller.finish(result);
                    self.engine.set_detector_failures(self.poller.consecutive_failures());
                    self.engine.apply_detections(detections);
                    self.publish_state();
                }
                Some(result) = camera_rx.recv() => {
                    self.engine.on_camera_result(result, now());
                    self.publish_state();
                }
                _ = tokio::time::sleep_until(resize_at.unwrap_or_else(TokioInstant::now)), if resize_at.is_some() => {
                    if let Some((_, viewport)) = pending_resize.take() {
                        self.engine.resize(viewport, now());
                        self.publish_state();
                    }
                }
                command = self.commands.recv() => match command {
                    None | Some(EngineCommand::Shutdown) => break,
                    Some(EngineCommand::StartCamera) => {
                        let acquire = self.camera.acquire();
                        let camera_tx = camera_tx.clone();
                        tokio::spawn(async move {
                            let _ = camera_tx.send(acquire.await);
                        });
                    }
                    Some(EngineCommand::Resize(viewport)) => {
                        pending_resize = Some((TokioInstant::now() + debounce, viewport));
                    }
                    Some(command) => {
                        let publish = !matches!(command, EngineCommand::PointerMoved { .. });
                        if let Some(url) = self.engine.apply(command, now()) {
                            tracing::info!(%url, "navigating to article");
                            let _ = self.navigation.send(url);
                        }
                        if publish {
                            self.publish_state();
                        }
                    }
                },
            }
        }

        if self.engine.is_running() {
            self.engine.stop_camera();
        }
        tracing::info!(frames = self.frame_counter, "face grid runtime stopped");
    }

    fn display_tick(&mut self) {
        let now = now();
        if !self.engine.tick(now) || self.frames.receiver_count() == 0 {
            return;
        }
        let image = Arc::new(self.engine.render_frame(now));
        self.frame_counter += 1;
        let _ = self.frames.send(RenderedFrame { frame_id: self.frame_counter, timestamp: now, image });
    }

    fn begin_detection(&mut self, results: &mpsc::UnboundedSender<DetectionResult>) {
        if self.poller.is_busy() {
            return;
        }
        let Some(frame) = self.engine.detection_frame() else { return };
        match self.poller.begin(frame) {
            PollStart::Busy => {}
            PollStart::Fallback(detections) => {
                self.engine.apply_detections(detections);
                self.publish_state();
            }
            PollStart::Job(job) => {
                let results = results.clone();
                tokio::spawn(async move {
                    let _ = results.send(job.run().await);
                });
            }
        }
    }

    fn publish_state(&self) {
        self.state.send_replace(self.engine.debug_state());
    }
}

/// The outside world's side of a running [`FaceGridRuntime`].
pub struct RuntimeHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    frames: broadcast::Sender<RenderedFrame>,
    navigation: broadcast::Sender<String>,
    state: watch::Receiver<DebugState>,
    task: Option<JoinHandle<()>>,
}

impl RuntimeHandle {
    pub fn send(&self, command: EngineCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| FaceGridError::RuntimeClosed)
    }

    /// A cloneable command sender, for input sources that outlive a borrow.
    pub fn commands(&self) -> mpsc::UnboundedSender<EngineCommand> {
        self.commands.clone()
    }

    /// Frames are only composited while someone is subscribed.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<RenderedFrame> {
        self.frames.subscribe()
    }

    /// Click-through URLs.
    pub fn subscribe_navigation(&self) -> broadcast::Receiver<String> {
        self.navigation.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<DebugState> {
        self.state.clone()
    }

    /// Stops the loop and waits for the camera to be released.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(EngineCommand::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "runtime task ended abnormally");
            }
        }
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(EngineCommand::Shutdown);
        }
    }
}
