use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use facegrid::core_modules::articles::ArticleCatalog;
use facegrid::core_modules::text_render::CosmicPainter;
use facegrid::logging::{self, LogFormat};
use facegrid::{EngineCommand, EngineConfig, FaceGridEngine, FaceGridRuntime, Mode, PatternCamera, Viewport};
use facegrid_visualizer::{ControlHandle, FrameBus, FrameFormat, ServerConfig, spawn_frame_pump, start_server};

/// Serves the face grid to a browser, driven by a synthetic camera.
#[derive(Debug, Parser)]
#[command(name = "facegrid-visualizer", version)]
struct Args {
    #[arg(long, env = "FACEGRID_BIND", default_value = "127.0.0.1:3001")]
    bind: String,
    /// JSON engine configuration.
    #[arg(long, env = "FACEGRID_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 1280)]
    width: u32,
    #[arg(long, default_value_t = 720)]
    height: u32,
    #[arg(long)]
    mode: Option<Mode>,
    #[arg(long, default_value = "jpeg")]
    format: FrameFormat,
    #[arg(long, default_value_t = 80)]
    quality: u8,
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(if args.json_logs { LogFormat::Json } else { LogFormat::Pretty }, "info");

    let mut config = EngineConfig::load(args.config.as_deref())?;
    if let Some(mode) = args.mode {
        config.initial_mode = mode;
    }
    let navbar = match &config.catalog_path {
        Some(path) => ArticleCatalog::from_json_file(path)?.navbar,
        None => ArticleCatalog::embedded()?.navbar,
    };
    let painter = CosmicPainter::new(config.fonts.clone(), config.font_dir.as_deref());
    let viewport = Viewport::new(args.width, args.height);
    let engine = FaceGridEngine::new(config, viewport, Box::new(painter), std::time::Instant::now())?;

    let camera = Arc::new(PatternCamera { width: 640, height: 480 });
    let runtime = FaceGridRuntime::spawn(engine, camera, None);
    let bus = FrameBus::new(2);
    let pump = spawn_frame_pump(&runtime, bus.clone(), args.format, args.quality);

    let cfg = ServerConfig { bind_addr: args.bind, canvas_width: args.width, canvas_height: args.height };
    let server = start_server(bus, cfg, ControlHandle::new(&runtime), navbar).await?;
    runtime.send(EngineCommand::StartCamera)?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted, shutting down"),
        _ = server => tracing::warn!("server task ended"),
    }
    runtime.shutdown().await;
    pump.abort();
    Ok(())
}
