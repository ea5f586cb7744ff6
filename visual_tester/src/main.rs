mod capture;
mod detector;

use capture::{CaptureSource, OpenCvCamera, rgba_to_bgr};
use clap::Parser;
use detector::HaarDetector;
use facegrid::core_modules::text_render::CosmicPainter;
use facegrid::keyboard::{HELP, command_for_key};
use facegrid::logging::{self, LogFormat};
use facegrid::{EngineCommand, EngineConfig, FaceDetector, FaceGridEngine, FaceGridRuntime, Mode, Viewport};
use opencv::{
    core,
    highgui,
    prelude::*,
    videoio::VideoWriter,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

const WINDOW: &str = "facegrid";
const KEY_ESCAPE: i32 = 27;

/// Drives the face grid from an OpenCV camera or video file and shows it in a
/// HighGUI window.
#[derive(Debug, Parser)]
#[command(name = "visual_tester", version)]
struct Args {
    /// Camera device index.
    #[arg(long, default_value_t = 0)]
    camera: i32,
    /// Play a video file instead of opening a camera.
    #[arg(long)]
    input: Option<PathBuf>,
    /// Record the composited output to this file (mp4v).
    #[arg(long)]
    output: Option<PathBuf>,
    /// Haar cascade for faces. Heuristic positions are used without one.
    #[arg(long, env = "FACEGRID_FACE_CASCADE")]
    face_cascade: Option<PathBuf>,
    /// Haar cascade for eyes.
    #[arg(long, env = "FACEGRID_EYE_CASCADE")]
    eye_cascade: Option<PathBuf>,
    /// JSON engine configuration.
    #[arg(long, env = "FACEGRID_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 1280)]
    width: u32,
    #[arg(long, default_value_t = 720)]
    height: u32,
    #[arg(long)]
    mode: Option<Mode>,
    #[arg(long)]
    seed: Option<u64>,
    /// Stop after this many displayed frames.
    #[arg(long)]
    frames: Option<u64>,
    /// Mirror frames to the web visualizer on this address (`web` feature).
    #[arg(long)]
    serve: Option<String>,
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Argument Parsing & Setup ---
    let args = Args::parse();
    logging::init(if args.json_logs { LogFormat::Json } else { LogFormat::Pretty }, "info");

    let mut config = EngineConfig::load(args.config.as_deref())?;
    if let Some(mode) = args.mode {
        config.initial_mode = mode;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    // --- 2. Collaborators ---
    let source = match &args.input {
        Some(path) => CaptureSource::File(path.clone()),
        None => CaptureSource::Device(args.camera),
    };
    let camera = Arc::new(OpenCvCamera { source, width: config.capture_width, height: config.capture_height });
    let detector: Option<Arc<dyn FaceDetector>> = match &args.face_cascade {
        Some(path) => match HaarDetector::load(path, args.eye_cascade.as_deref()) {
            Ok(detector) => Some(Arc::new(detector)),
            Err(e) => {
                tracing::warn!(error = %e, "face cascade failed to load, using heuristic positions");
                None
            }
        },
        None => None,
    };

    // --- 3. Engine & Runtime ---
    let painter = CosmicPainter::new(config.fonts.clone(), config.font_dir.as_deref());
    let engine = FaceGridEngine::new(config, Viewport::new(args.width, args.height), Box::new(painter), std::time::Instant::now())?;
    let runtime = FaceGridRuntime::spawn(engine, camera, detector);
    let mut frames = runtime.subscribe_frames();
    let mut navigation = runtime.subscribe_navigation();

    #[cfg(feature = "web")]
    let _server = match &args.serve {
        Some(bind) => Some(serve(&runtime, bind.clone(), args.width, args.height).await?),
        None => None,
    };
    if cfg!(not(feature = "web")) && args.serve.is_some() {
        tracing::warn!("--serve needs the `web` feature, ignoring");
    }

    // --- 4. Window & Input ---
    highgui::named_window(WINDOW, highgui::WINDOW_AUTOSIZE)?;
    let pointer = runtime.commands();
    highgui::set_mouse_callback(
        WINDOW,
        Some(Box::new(move |event, x, y, _flags| {
            let command = match event {
                highgui::EVENT_MOUSEMOVE => EngineCommand::PointerMoved { x: x as f32, y: y as f32 },
                highgui::EVENT_LBUTTONDOWN => EngineCommand::Click { x: x as f32, y: y as f32 },
                _ => return,
            };
            let _ = pointer.send(command);
        })),
    )?;

    let mut writer = match &args.output {
        Some(path) => {
            let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
            let size = core::Size::new(args.width as i32, args.height as i32);
            Some(VideoWriter::new(&path.to_string_lossy(), fourcc, 30.0, size, true)?)
        }
        None => None,
    };

    tracing::info!("\n{HELP}\n  q  quit");
    runtime.send(EngineCommand::StartCamera)?;

    // --- 5. Main Display Loop ---
    let mut shown = 0u64;
    loop {
        match tokio::time::timeout(Duration::from_millis(30), frames.recv()).await {
            Ok(Ok(frame)) => {
                let bgr = rgba_to_bgr(&frame.image)?;
                highgui::imshow(WINDOW, &bgr)?;
                if let Some(writer) = writer.as_mut() {
                    writer.write(&bgr)?;
                }
                shown += 1;
                if args.frames.is_some_and(|limit| shown >= limit) {
                    break;
                }
            }
            Ok(Err(RecvError::Lagged(skipped))) => tracing::debug!(skipped, "display lagged"),
            Ok(Err(RecvError::Closed)) => break,
            // The engine is idle (camera stopped): keep servicing keys.
            Err(_) => {}
        }

        while let Ok(url) = navigation.try_recv() {
            tracing::info!(%url, "article link");
        }

        let key = highgui::wait_key(1)?;
        if key < 0 {
            continue;
        }
        if key == KEY_ESCAPE || key == i32::from(b'q') {
            break;
        }
        if let Some(command) = char::from_u32(key as u32).and_then(command_for_key) {
            runtime.send(command)?;
        }
    }

    // --- 6. Teardown ---
    runtime.shutdown().await;
    if let Some(mut writer) = writer {
        writer.release()?;
    }
    highgui::destroy_all_windows()?;
    tracing::info!(frames = shown, "visual tester finished");
    Ok(())
}

#[cfg(feature = "web")]
async fn serve(
    runtime: &facegrid::RuntimeHandle,
    bind: String,
    width: u32,
    height: u32,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    use facegrid::core_modules::articles::ArticleCatalog;
    use facegrid_visualizer::{ControlHandle, FrameBus, FrameFormat, ServerConfig, spawn_frame_pump, start_server};

    let bus = FrameBus::new(2);
    spawn_frame_pump(runtime, bus.clone(), FrameFormat::Jpeg, 80);
    let cfg = ServerConfig { bind_addr: bind, canvas_width: width, canvas_height: height };
    let navbar = ArticleCatalog::embedded()?.navbar;
    start_server(bus, cfg, ControlHandle::new(runtime), navbar).await
}
