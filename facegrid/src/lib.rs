// THEORY:
// This file is the main entry point for the `facegrid` library crate. It
// exposes the engine (`FaceGridEngine`), the tokio runtime that drives it
// (`FaceGridRuntime`) and the configuration, error and logging layers that
// surround them. The binaries in this workspace (the OpenCV visual tester and
// the web visualizer) are thin shells over this API.
//
// The building blocks live in `core_modules`: grid partitioning, the frame
// history ring, mode state, materials, reveal animation, text panels, hover
// overlays and the compositor. They are public so the binaries and the tests
// can reach them, but a consumer normally only needs the re-exports below.

pub mod config;
pub mod core_modules;
pub mod engine;
pub mod error;
pub mod keyboard;
pub mod logging;
pub mod runtime;

pub use config::EngineConfig;
pub use core_modules::camera::{Camera, NoCamera, PatternCamera, VideoStream};
pub use core_modules::detection::{Detection, FaceDetector};
pub use core_modules::grid_partitioner::Viewport;
pub use core_modules::mode::Mode;
pub use engine::{CameraState, DebugState, EngineCommand, FaceGridEngine};
pub use error::{FaceGridError, Result};
pub use runtime::{FaceGridRuntime, RenderedFrame, RuntimeHandle};
