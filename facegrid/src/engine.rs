// THEORY:
// `FaceGridEngine` is the orchestrator. It owns every piece of mutable state
// the display has (grid, tiles, mode machine, frame history, reveal animator,
// hover overlay, camera stream) and exposes the handful of operations the
// outside world uses: mode changes from the navbar, pointer events, keyboard
// commands, camera start/stop, and the per-frame `tick`/`render` pair.
//
// Key architectural principles:
// 1.  **Synchronous Core**: every method is a plain `&mut self` call that takes
//     `now` as an argument. The engine never sleeps, spawns or awaits anything
//     except camera acquisition, so it is trivially testable with synthetic
//     time and a seeded RNG.
// 2.  **Atomic Rebuilds**: a rebuild computes the complete new tile list and
//     swaps it in at the end. Pointer handlers compare the tile count with the
//     grid before touching tiles, so a stale event is a no-op.
// 3.  **Never Fail The Loop**: camera, detector and asset failures are logged
//     and converted into fallback behaviour here. `tick` and `render` do not
//     return errors.
// 4.  **Content vs. Wiring**: rebuilds decide what each tile shows; `rewire`
//     only refreshes materials and sources. Detection results, delay toggles
//     and camera state changes rewire without reshuffling the layout.

use crate::config::EngineConfig;
use crate::core_modules::articles::{ArticleCatalog, HoverContent};
use crate::core_modules::camera::{Camera, VideoStream};
use crate::core_modules::character_scatter::{ScatterGrid, ScatteredCharacter, next_gap_probability, scatter_characters, split_headline};
use crate::core_modules::delay::DelayOrdering;
use crate::core_modules::detection::Detection;
use crate::core_modules::effect_strategy::EffectStrategy;
use crate::core_modules::fallback::FallbackImagery;
use crate::core_modules::frame_history::{FrameHistory, blit_scaled};
use crate::core_modules::grid_partitioner::{GridKey, GridLayout, Viewport};
use crate::core_modules::hover::{HoverChange, HoverHit, HoverKey, HoverState, Neighborhood, neighborhood};
use crate::core_modules::materials::EffectVariant;
use crate::core_modules::mode::{Mode, ModeMachine};
use crate::core_modules::primitive::primitive_markers;
use crate::core_modules::renderer::{Compositor, FrameInput};
use crate::core_modules::reveal::{EntranceReveal, RevealSpeed};
use crate::core_modules::text_panels::{CAPTION_AVOID_ROW, select_single_panels_avoiding_row, select_text_pairs};
use crate::core_modules::text_render::TextPainter;
use crate::core_modules::textures::{
    OverlayStyle, author_texture, caption_texture, character_texture, hover_texture, overlay_text_texture, title_texture,
};
use crate::core_modules::tile::{PanelKind, PanelTextures, TextPanelInfo, Tile, TileOverlay, Wiring};
use crate::error::{CameraError, Result};
use image::RgbaImage;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Share of tiles that carry an overlay badge, out of 1000.
const OVERLAY_THRESHOLD: usize = 300;

/// Everything the navbar, keyboard and pointer can ask of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    SetMode(Mode),
    SetModeWithHeadline { mode: Mode, headline: String },
    Resize(Viewport),
    PointerMoved { x: f32, y: f32 },
    PointerLeft,
    Click { x: f32, y: f32 },
    SetGridOpen(bool),
    Randomize,
    ToggleOrder,
    StartCamera,
    StopCamera,
    ReinitializeZoom,
    CycleStrategy,
    ToggleOverlayText,
    ToggleCharacters,
    ShowTestOverlay,
    Rescatter,
    CycleGaps,
    DebugDump,
    Help,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraState {
    /// Never started, or stopped.
    Stopped,
    /// A live camera stream.
    Live,
    /// A synthetic stream.
    Synthetic,
    /// Running on fallback imagery.
    Fallback,
}

/// Snapshot of the engine for the `d` key and the web visualizer.
#[derive(Debug, Clone, Serialize)]
pub struct DebugState {
    pub mode: Mode,
    pub cols: u32,
    pub rows: u32,
    pub tiles: usize,
    pub text_panels: usize,
    pub strategy: &'static str,
    pub camera: CameraState,
    pub running: bool,
    pub headline: String,
    pub scattered: Vec<(char, usize)>,
    pub gap_probability: f32,
    pub overlay_text_enabled: bool,
    pub show_characters: bool,
    pub delay_ordering: &'static str,
    pub zoom_initialized: bool,
    pub reveal_animating: bool,
    pub reveal_started: usize,
    pub hover_visible: bool,
    pub detector_failures: Option<u32>,
    pub fps: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TextureKey {
    Title { mode: Mode, index: usize, bold: bool },
    Author { mode: Mode, index: usize, bold: bool },
    Caption(usize),
    Character(char),
    Overlay(String),
}

/// What a scatter was computed against. Any change to the panel layout
/// invalidates it, including a re-roll of the same mode.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScatterKey {
    headline: String,
    grid: GridKey,
    mode: Mode,
    panels: Vec<usize>,
}

struct FpsCounter {
    window_start: Option<Instant>,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self { window_start: None, frames: 0, fps: 0.0 }
    }

    /// Counts a frame. Returns the new reading once per second.
    fn frame(&mut self, now: Instant) -> Option<f32> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        let elapsed = now.saturating_duration_since(start);
        if elapsed < Duration::from_secs(1) {
            return None;
        }
        self.fps = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.window_start = Some(now);
        Some(self.fps)
    }
}

pub struct FaceGridEngine {
    config: EngineConfig,
    rng: StdRng,
    layout: GridLayout,
    tiles: Vec<Tile>,
    machine: ModeMachine,
    strategy: EffectStrategy,
    history: FrameHistory,
    reveal: EntranceReveal,
    pending_reveal: Option<(Instant, RevealSpeed)>,
    hover: HoverState,
    grid_open: bool,
    catalog: ArticleCatalog,
    fallback: FallbackImagery,
    painter: Box<dyn TextPainter>,
    textures: HashMap<TextureKey, Arc<RgbaImage>>,
    texture_size: (u32, u32),
    stream: Option<Box<dyn VideoStream>>,
    running: bool,
    initial_load: bool,
    headline: String,
    gap_probability: f32,
    overlay_text_enabled: bool,
    show_characters: bool,
    scattered: Vec<ScatteredCharacter>,
    scatter_key: Option<ScatterKey>,
    detections: Vec<Detection>,
    detector_failures: Option<u32>,
    started_at: Instant,
    fps: FpsCounter,
    compositor: Compositor,
}

impl FaceGridEngine {
    /// Builds an idle engine for `viewport`. Nothing is drawn until the camera
    /// is started (successfully or not).
    pub fn new(config: EngineConfig, viewport: Viewport, painter: Box<dyn TextPainter>, now: Instant) -> Result<Self> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let catalog = match &config.catalog_path {
            Some(path) => ArticleCatalog::from_json_file(path).or_else(|e| {
                tracing::warn!(error = %e, path = %path.display(), "article catalog failed to load, using the embedded one");
                ArticleCatalog::embedded()
            })?,
            None => ArticleCatalog::embedded()?,
        };
        let fallback = FallbackImagery::load(&config.fallback_images, config.capture_width, config.capture_height, &mut rng);
        let history = FrameHistory::new(config.history_capacity, config.capture_width, config.capture_height, config.capture_rate_hz);
        let layout = GridLayout::partition(viewport);

        let mut engine = Self {
            rng,
            tiles: Vec::new(),
            machine: ModeMachine::new(config.initial_mode),
            strategy: EffectStrategy::default(),
            history,
            reveal: EntranceReveal::idle(layout.tile_count()),
            pending_reveal: None,
            hover: HoverState::new(),
            grid_open: false,
            catalog,
            fallback,
            painter,
            textures: HashMap::new(),
            texture_size: (0, 0),
            stream: None,
            running: false,
            initial_load: true,
            headline: config.headline.clone(),
            gap_probability: config.gap_probability,
            overlay_text_enabled: config.overlay_text_enabled,
            show_characters: config.show_characters,
            scattered: Vec::new(),
            scatter_key: None,
            detections: Vec::new(),
            detector_failures: None,
            started_at: now,
            fps: FpsCounter::new(),
            compositor: Compositor::new(),
            layout,
            config,
        };
        engine.rebuild();
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn mode(&self) -> Mode {
        self.machine.mode()
    }

    pub fn machine(&self) -> &ModeMachine {
        &self.machine
    }

    pub fn history(&self) -> &FrameHistory {
        &self.history
    }

    pub fn reveal(&self) -> &EntranceReveal {
        &self.reveal
    }

    pub fn hover(&self) -> &HoverState {
        &self.hover
    }

    pub fn catalog(&self) -> &ArticleCatalog {
        &self.catalog
    }

    pub fn scattered(&self) -> &[ScatteredCharacter] {
        &self.scattered
    }

    pub fn strategy(&self) -> EffectStrategy {
        self.strategy
    }

    pub fn headline(&self) -> &str {
        &self.headline
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_reveal_pending(&self) -> bool {
        self.pending_reveal.is_some()
    }

    pub fn viewport(&self) -> Viewport {
        self.layout.viewport
    }

    pub fn camera_state(&self) -> CameraState {
        match (&self.stream, self.running) {
            (_, false) => CameraState::Stopped,
            (Some(stream), true) if stream.is_live() => CameraState::Live,
            (Some(_), true) => CameraState::Synthetic,
            (None, true) => CameraState::Fallback,
        }
    }

    fn is_live(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_live())
    }

    // ---- camera -------------------------------------------------------------

    /// Requests a stream from `camera` and starts running either way.
    pub async fn start_camera(&mut self, camera: &dyn Camera, now: Instant) {
        let result = camera.acquire().await;
        self.on_camera_result(result, now);
    }

    /// Completes a camera request. A failure puts the engine in fallback mode.
    pub fn on_camera_result(&mut self, result: std::result::Result<Box<dyn VideoStream>, CameraError>, now: Instant) {
        if let Some(mut old) = self.stream.take() {
            old.stop();
        }
        match result {
            Ok(stream) => {
                tracing::info!(live = stream.is_live(), "camera started");
                self.stream = Some(stream);
            }
            Err(e) => tracing::warn!(error = %e, "camera unavailable, continuing with fallback imagery"),
        }
        self.running = true;
        if self.initial_load {
            self.initial_load = false;
            self.pending_reveal = Some((now + self.config.initial_reveal_delay(), self.config.slow_reveal()));
        }
        self.rewire();
    }

    /// Releases the stream, hides the hover overlay and idles the loop.
    pub fn stop_camera(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        self.running = false;
        self.hover.hide();
        tracing::info!("camera stopped");
        self.rewire();
    }

    // ---- modes and layout -----------------------------------------------------

    pub fn set_mode(&mut self, mode: Mode, now: Instant) {
        self.hover.hide();
        let transition = self.machine.set_mode(mode);
        self.rebuild();
        if !self.initial_load {
            self.pending_reveal = Some((now + self.config.mode_switch_reveal_delay(), self.config.fast_reveal()));
        }
        tracing::debug!(from = %transition.from, to = %transition.to, fresh = transition.fresh, "mode applied");
    }

    /// Navbar entry point: switch mode and show `headline` as scattered
    /// characters. Blank headlines leave the current one in place.
    pub fn set_mode_with_headline(&mut self, mode: Mode, headline: &str, now: Instant) {
        if let Some(resolved) = self.catalog.resolve_headline(headline) {
            if resolved != self.headline {
                self.headline = resolved.to_string();
                self.scatter_key = None;
            }
        }
        self.set_mode(mode, now);
    }

    pub fn resize(&mut self, viewport: Viewport, now: Instant) {
        if viewport == self.layout.viewport {
            return;
        }
        self.layout = GridLayout::partition(viewport);
        tracing::info!(
            width = viewport.width,
            height = viewport.height,
            cols = self.layout.cols,
            rows = self.layout.rows,
            "viewport resized"
        );
        self.rebuild();
        self.pending_reveal = Some((now, self.config.fast_reveal()));
    }

    /// Reshuffles text panels and characters.
    pub fn randomize(&mut self, now: Instant) {
        self.machine.clear_layout_caches();
        self.scatter_key = None;
        self.rebuild();
        self.pending_reveal = Some((now, self.config.fast_reveal()));
    }

    pub fn rescatter(&mut self) {
        self.scatter_key = None;
        self.rebuild();
    }

    pub fn cycle_gaps(&mut self) -> f32 {
        self.gap_probability = next_gap_probability(self.gap_probability);
        tracing::info!(gap_probability = self.gap_probability, "character gap probability changed");
        self.rescatter();
        self.gap_probability
    }

    pub fn toggle_overlay_text(&mut self) -> bool {
        self.overlay_text_enabled = !self.overlay_text_enabled;
        self.rebuild();
        self.overlay_text_enabled
    }

    pub fn toggle_characters(&mut self) -> bool {
        self.show_characters = !self.show_characters;
        self.rebuild();
        self.show_characters
    }

    /// Next effect distribution. Effects mode only.
    pub fn cycle_strategy(&mut self) -> Option<EffectStrategy> {
        if self.machine.mode() != Mode::Effects {
            return None;
        }
        self.strategy = self.strategy.next();
        tracing::info!(strategy = self.strategy.name(), "effect strategy changed");
        self.rebuild();
        Some(self.strategy)
    }

    /// Flips random/sequential delay ordering. Delay mode only.
    pub fn toggle_order(&mut self) -> Option<DelayOrdering> {
        let ordering = self.machine.toggle_delay_ordering()?;
        self.machine.ensure_settings(self.tiles.len(), self.history.capacity(), &mut self.rng);
        tracing::info!(ordering = ordering.name(), "delay ordering changed");
        self.rewire();
        Some(ordering)
    }

    /// Drops frozen zoom settings; the next detection result refreezes them.
    pub fn reinitialize_zoom(&mut self) -> bool {
        if !self.machine.reinitialize_zoom() {
            return false;
        }
        self.machine.ensure_settings(self.tiles.len(), self.history.capacity(), &mut self.rng);
        tracing::info!("zoom settings cleared, waiting for detection");
        self.rewire();
        true
    }

    // ---- detection ------------------------------------------------------------

    /// The newest frame, when the active mode wants a detection round.
    pub fn detection_frame(&self) -> Option<Arc<RgbaImage>> {
        if !self.running || !self.machine.wants_detection() {
            return None;
        }
        self.history.newest().map(|frame| Arc::new(frame.clone()))
    }

    pub fn wants_detection(&self) -> bool {
        self.running && self.machine.wants_detection()
    }

    pub fn set_detector_failures(&mut self, failures: u32) {
        self.detector_failures = Some(failures);
    }

    pub fn apply_detections(&mut self, detections: Vec<Detection>) {
        self.detections = detections;
        let count = self.tiles.len();
        let froze = self.machine.apply_detections(&self.detections, count, &mut self.rng);
        if froze || self.machine.mode() == Mode::Primitive {
            self.rewire();
        }
    }

    // ---- pointer and navbar ---------------------------------------------------

    fn grid_is_consistent(&self) -> bool {
        self.tiles.len() == self.layout.tile_count()
    }

    pub fn set_grid_open(&mut self, open: bool) {
        self.grid_open = open;
        if open {
            self.hover.hide();
        }
    }

    pub fn pointer_moved(&mut self, x: f32, y: f32) -> HoverChange {
        if !self.running || !self.grid_is_consistent() {
            return HoverChange::Unchanged;
        }
        let hit = self
            .layout
            .hit_test(x, y)
            .and_then(|index| self.tiles.get(index))
            .and_then(|tile| tile.hover_key().map(|key| HoverHit { tile: tile.index, key }));

        let (cols, rows) = (self.layout.cols, self.layout.rows);
        let content = hit.and_then(|hit| self.hover_content(hit.key));
        let (tw, th) = self.texture_size;
        let painter = self.painter.as_mut();
        self.hover.update(hit, self.grid_open, cols, rows, |_, block| match content {
            Some(content) => hover_texture(painter, &content, tw * block.span_cols, th * block.span_rows),
            None => RgbaImage::new(1, 1),
        })
    }

    pub fn pointer_left(&mut self) {
        self.hover.hide();
    }

    /// Click-through target of the text tile under the pointer.
    pub fn click(&self, x: f32, y: f32) -> Option<String> {
        if !self.grid_is_consistent() {
            return None;
        }
        let tile = self.tiles.get(self.layout.hit_test(x, y)?)?;
        let info = tile.text_panel?;
        if !matches!(info.kind, PanelKind::Title | PanelKind::Author) {
            return None;
        }
        let url = self.catalog.url_for(self.machine.mode(), info.source_index);
        if url.is_none() {
            tracing::warn!(mode = %self.machine.mode(), article = info.source_index, "article has no link");
        }
        url.map(str::to_string)
    }

    /// Shows the hover overlay around the centre tile.
    pub fn show_test_overlay(&mut self) {
        let center = self.layout.index_of(self.layout.cols / 2, self.layout.rows / 2);
        let content = self
            .catalog
            .hover_content_for_article(self.machine.mode(), 0)
            .unwrap_or_else(|| HoverContent::Sentences(vec![self.headline.clone()]));
        let block = neighborhood(self.layout.cols, self.layout.rows, center);
        let (w, h) = self.block_texture_size(&block);
        let painter = self.painter.as_mut();
        self.hover.show(HoverHit { tile: center, key: HoverKey::Test }, self.layout.cols, self.layout.rows, |_, _| {
            hover_texture(painter, &content, w, h)
        });
    }

    fn hover_content(&self, key: HoverKey) -> Option<HoverContent> {
        match key {
            HoverKey::Pair(index) => self.catalog.hover_content_for_article(self.machine.mode(), index),
            HoverKey::Caption(index) => self.catalog.hover_content_for_caption(index),
            HoverKey::Test => None,
        }
    }

    fn block_texture_size(&self, block: &Neighborhood) -> (u32, u32) {
        let (tw, th) = self.texture_size;
        (tw * block.span_cols, th * block.span_rows)
    }

    // ---- frame loop -----------------------------------------------------------

    /// One display tick: FPS bookkeeping, reveal step, capture. Returns `false`
    /// while the engine is idle.
    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.running {
            return false;
        }
        if let Some(fps) = self.fps.frame(now) {
            tracing::debug!(fps, "display rate");
        }

        if let Some((at, speed)) = self.pending_reveal {
            if now >= at {
                self.pending_reveal = None;
                self.reveal.start(self.tiles.len(), speed, now);
            }
        }
        self.reveal.step(now, &mut self.rng);
        self.capture(now);
        true
    }

    fn capture(&mut self, now: Instant) {
        let mode = self.machine.mode();
        let elapsed = now.saturating_duration_since(self.started_at);
        let stream = &mut self.stream;
        let fallback = &self.fallback;
        let mut ended = false;
        self.history.capture_tick(now, |slot| {
            let frame = match stream.as_mut() {
                Some(stream) if stream.is_ready() => match stream.read_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        ended = matches!(e, CameraError::StreamEnded);
                        tracing::warn!(error = %e, "camera read failed, capturing fallback frame");
                        None
                    }
                },
                _ => None,
            };
            match frame {
                Some(frame) => blit_scaled(&frame, slot),
                None => blit_scaled(fallback.frame_for(mode, elapsed), slot),
            }
        });
        if ended {
            self.stream = None;
            tracing::warn!("camera stream ended, continuing with fallback imagery");
            self.rewire();
        }
    }

    /// Per-tile reveal values at `now`. Tiles stay dark while a reveal is
    /// scheduled but not yet started.
    pub fn reveal_values(&self, now: Instant) -> Vec<f32> {
        if self.pending_reveal.is_some() {
            return vec![0.0; self.tiles.len()];
        }
        (0..self.tiles.len()).map(|i| self.reveal.reveal(i, now)).collect()
    }

    /// Composites the grid into `target`.
    pub fn render(&self, target: &mut RgbaImage, now: Instant) {
        let reveal = self.reveal_values(now);
        let input = FrameInput {
            layout: &self.layout,
            tiles: &self.tiles,
            reveal: &reveal,
            history: &self.history,
            hover: self.hover.active(),
        };
        self.compositor.render(&input, target);
    }

    /// Allocates a framebuffer matching the viewport and renders into it.
    pub fn render_frame(&self, now: Instant) -> RgbaImage {
        let viewport = self.layout.viewport;
        let mut target = RgbaImage::new(viewport.width.max(1), viewport.height.max(1));
        self.render(&mut target, now);
        target
    }

    // ---- debug ----------------------------------------------------------------

    pub fn debug_state(&self) -> DebugState {
        DebugState {
            mode: self.machine.mode(),
            cols: self.layout.cols,
            rows: self.layout.rows,
            tiles: self.tiles.len(),
            text_panels: self.tiles.iter().filter(|t| t.is_text_panel()).count(),
            strategy: self.strategy.name(),
            camera: self.camera_state(),
            running: self.running,
            headline: self.headline.clone(),
            scattered: self.scattered.iter().map(|c| (c.character, c.tile_index)).collect(),
            gap_probability: self.gap_probability,
            overlay_text_enabled: self.overlay_text_enabled,
            show_characters: self.show_characters,
            delay_ordering: self.machine.delay_ordering().name(),
            zoom_initialized: self.machine.zoom_initialized(),
            reveal_animating: self.reveal.is_animating(),
            reveal_started: self.reveal.started_count(),
            hover_visible: self.hover.is_visible(),
            detector_failures: self.detector_failures,
            fps: self.fps.fps,
        }
    }

    pub fn log_debug_state(&self) {
        let state = self.debug_state();
        match serde_json::to_string(&state) {
            Ok(json) => tracing::info!(state = %json, "engine state"),
            Err(e) => tracing::warn!(error = %e, "engine state could not be serialized"),
        }
    }

    /// Applies a synchronous command. `StartCamera` and `Shutdown` need the
    /// runtime and are ignored here. Returns a click-through URL, if any.
    pub fn apply(&mut self, command: EngineCommand, now: Instant) -> Option<String> {
        match command {
            EngineCommand::SetMode(mode) => self.set_mode(mode, now),
            EngineCommand::SetModeWithHeadline { mode, headline } => self.set_mode_with_headline(mode, &headline, now),
            EngineCommand::Resize(viewport) => self.resize(viewport, now),
            EngineCommand::PointerMoved { x, y } => {
                self.pointer_moved(x, y);
            }
            EngineCommand::PointerLeft => self.pointer_left(),
            EngineCommand::Click { x, y } => return self.click(x, y),
            EngineCommand::SetGridOpen(open) => self.set_grid_open(open),
            EngineCommand::Randomize => self.randomize(now),
            EngineCommand::ToggleOrder => {
                self.toggle_order();
            }
            EngineCommand::StopCamera => self.stop_camera(),
            EngineCommand::ReinitializeZoom => {
                self.reinitialize_zoom();
            }
            EngineCommand::CycleStrategy => {
                self.cycle_strategy();
            }
            EngineCommand::ToggleOverlayText => {
                self.toggle_overlay_text();
            }
            EngineCommand::ToggleCharacters => {
                self.toggle_characters();
            }
            EngineCommand::ShowTestOverlay => self.show_test_overlay(),
            EngineCommand::Rescatter => self.rescatter(),
            EngineCommand::CycleGaps => {
                self.cycle_gaps();
            }
            EngineCommand::DebugDump => self.log_debug_state(),
            EngineCommand::Help => tracing::info!("\n{}", crate::keyboard::HELP),
            EngineCommand::StartCamera | EngineCommand::Shutdown => {}
        }
        None
    }

    // ---- rebuild --------------------------------------------------------------

    fn refresh_texture_size(&mut self) {
        let ratio = self.layout.viewport.effective_pixel_ratio();
        let size = (
            (self.layout.tile_width * ratio).ceil().max(1.0) as u32,
            (self.layout.tile_height * ratio).ceil().max(1.0) as u32,
        );
        if size != self.texture_size {
            self.textures.clear();
            self.texture_size = size;
        }
    }

    fn texture(&mut self, key: TextureKey, paint: impl FnOnce(&mut dyn TextPainter, u32, u32) -> RgbaImage) -> Arc<RgbaImage> {
        if let Some(texture) = self.textures.get(&key) {
            return texture.clone();
        }
        let (w, h) = self.texture_size;
        let texture = Arc::new(paint(self.painter.as_mut(), w, h));
        self.textures.insert(key, texture.clone());
        texture
    }

    /// Replaces the whole tile list for the current mode and grid.
    fn rebuild(&mut self) {
        self.hover.hide();
        self.refresh_texture_size();
        let mode = self.machine.mode();
        let key = self.layout.key();
        let (cols, rows) = (self.layout.cols, self.layout.rows);
        let total = self.layout.tile_count();
        self.machine.ensure_settings(total, self.history.capacity(), &mut self.rng);

        let variants = self.strategy.assign(cols, rows, EffectVariant::COUNT);
        let mut tiles: Vec<Tile> = (0..total).map(|i| Tile::new(i, cols, EffectVariant::from_index(variants[i]))).collect();
        let mut claimed: HashSet<usize> = HashSet::new();

        if mode.uses_captions() {
            let count = self.config.pixelation_caption_count;
            let rng = &mut self.rng;
            let positions = self
                .machine
                .captions_or_insert_with(key, || select_single_panels_avoiding_row(total, cols, count, CAPTION_AVOID_ROW, rng));
            for (caption_index, &position) in positions.iter().enumerate() {
                let text = self.catalog.caption_text(caption_index).to_string();
                let texture = self.texture(TextureKey::Caption(caption_index), |p, w, h| caption_texture(p, &text, caption_index, w, h));
                tiles[position].set_panel(
                    TextPanelInfo { kind: PanelKind::Caption, source_index: caption_index },
                    PanelTextures { regular: texture, bold: None },
                );
                claimed.insert(position);
            }
        } else if mode.has_text_panels() {
            let pair_count = self.catalog.articles_for(mode).len();
            let rng = &mut self.rng;
            let pairs = self.machine.text_pairs_or_insert_with(key, || select_text_pairs(total, cols, pair_count, rng));
            for pair in pairs {
                let Some(article) = self.catalog.article(mode, pair.pair_index).cloned() else { continue };
                let index = pair.pair_index;
                let [title, title_bold] = [false, true].map(|bold| {
                    self.texture(TextureKey::Title { mode, index, bold }, |p, w, h| title_texture(p, &article.title, w, h, bold))
                });
                let [author, author_bold] = [false, true].map(|bold| {
                    self.texture(TextureKey::Author { mode, index, bold }, |p, w, h| author_texture(p, &article.author, w, h, bold))
                });

                tiles[pair.title].set_panel(
                    TextPanelInfo { kind: PanelKind::Title, source_index: index },
                    PanelTextures { regular: title, bold: Some(title_bold) },
                );
                tiles[pair.title].partner = Some(pair.author);
                tiles[pair.author].set_panel(
                    TextPanelInfo { kind: PanelKind::Author, source_index: index },
                    PanelTextures { regular: author, bold: Some(author_bold) },
                );
                tiles[pair.author].partner = Some(pair.title);
                claimed.insert(pair.title);
                claimed.insert(pair.author);
            }
        }

        if self.show_characters && !self.headline.trim().is_empty() {
            self.place_characters(&mut tiles, &claimed, mode);
        } else if self.overlay_text_enabled && !self.config.overlay_texts.is_empty() {
            self.place_overlay_text(&mut tiles);
        } else {
            self.scattered.clear();
        }

        tracing::debug!(mode = %mode, cols, rows, text_panels = claimed.len(), characters = self.scattered.len(), "grid rebuilt");
        self.tiles = tiles;
        if self.reveal.tile_count() != total && !self.reveal.is_animating() {
            self.reveal.reset_idle(total);
        }
        self.rewire();
    }

    fn place_characters(&mut self, tiles: &mut [Tile], claimed: &HashSet<usize>, mode: Mode) {
        let mut panels: Vec<usize> = claimed.iter().copied().collect();
        panels.sort_unstable();
        let scatter_key = ScatterKey { headline: self.headline.clone(), grid: self.layout.key(), mode, panels };
        if self.scatter_key.as_ref() != Some(&scatter_key) {
            let characters = split_headline(&self.headline);
            let grid = ScatterGrid { cols: self.layout.cols, rows: self.layout.rows, claimed };
            self.scattered = scatter_characters(&characters, &grid, self.gap_probability, &mut self.rng);
            self.scatter_key = Some(scatter_key);
        }
        let scattered = self.scattered.clone();
        for placed in scattered {
            if claimed.contains(&placed.tile_index) || placed.tile_index >= tiles.len() {
                tracing::warn!(character = %placed.character, tile = placed.tile_index, "scattered character lost its tile, skipping");
                continue;
            }
            let character = placed.character;
            let texture = self.texture(TextureKey::Character(character), |p, w, h| character_texture(p, character, w, h));
            let tile = &mut tiles[placed.tile_index];
            tile.text_panel = Some(TextPanelInfo { kind: PanelKind::Character, source_index: placed.char_index });
            tile.overlay = Some(TileOverlay::Character { character, char_index: placed.char_index, texture });
        }
    }

    fn place_overlay_text(&mut self, tiles: &mut [Tile]) {
        self.scattered.clear();
        let texts = self.config.overlay_texts.clone();
        for tile in tiles.iter_mut().filter(|t| !t.is_text_panel()) {
            let i = tile.index;
            if i.wrapping_mul(1327) % 1000 >= OVERLAY_THRESHOLD {
                continue;
            }
            let text = texts[i.wrapping_mul(1549) % texts.len()].clone();
            let style = OverlayStyle::for_text(&text);
            let texture = self.texture(TextureKey::Overlay(text.clone()), |p, w, h| overlay_text_texture(p, &text, style, w, h));
            tile.overlay = Some(TileOverlay::Text { text, style, texture });
        }
    }

    /// Refreshes every tile's material and source for the current mode and
    /// camera state.
    fn rewire(&mut self) {
        let mirror = self.is_live();
        let mode = self.machine.mode();
        let wiring = Wiring {
            mode,
            mirror,
            zoom: self.machine.zoom_settings(),
            delay: self.machine.delay_order(),
            stills: self.stream.is_none().then_some(&self.fallback),
        };
        for tile in &mut self.tiles {
            tile.wire(&wiring);
            tile.markers = match mode {
                Mode::Primitive if !tile.is_text_panel() => primitive_markers(tile.index, &self.detections),
                _ => None,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::camera::{NoCamera, PatternCamera};
    use crate::core_modules::materials::MaterialKind;
    use crate::core_modules::text_render::BoxPainter;
    use crate::core_modules::tile::TileSource;

    fn config() -> EngineConfig {
        EngineConfig { seed: Some(11), fallback_images: HashMap::new(), ..EngineConfig::default() }
    }

    fn engine(width: u32, height: u32) -> (FaceGridEngine, Instant) {
        let now = Instant::now();
        let engine = FaceGridEngine::new(config(), Viewport::new(width, height), Box::new(BoxPainter), now).expect("engine");
        (engine, now)
    }

    #[test]
    fn idle_until_the_camera_answers() {
        let (mut engine, now) = engine(800, 600);
        assert!(!engine.tick(now));
        assert_eq!(engine.camera_state(), CameraState::Stopped);
        engine.on_camera_result(Err(CameraError::Unavailable("denied".into())), now);
        assert!(engine.is_running());
        assert_eq!(engine.camera_state(), CameraState::Fallback);
        assert!(engine.is_reveal_pending());
        assert!(engine.tick(now));
        assert_eq!(engine.history().captured_count(), 1);
    }

    #[tokio::test]
    async fn pattern_camera_runs_unmirrored() {
        let (mut engine, now) = engine(800, 600);
        engine.start_camera(&PatternCamera { width: 64, height: 48 }, now).await;
        assert_eq!(engine.camera_state(), CameraState::Synthetic);
        assert!(engine.tiles().iter().all(|t| !t.material.is_mirrored()));
        engine.stop_camera();
        assert_eq!(engine.camera_state(), CameraState::Stopped);

        engine.start_camera(&NoCamera, now).await;
        assert_eq!(engine.camera_state(), CameraState::Fallback);
    }

    #[test]
    fn pixelation_places_captions() {
        let (engine, _) = engine(1920, 1050);
        assert_eq!(engine.mode(), Mode::Pixelation);
        let captions: Vec<&Tile> = engine
            .tiles()
            .iter()
            .filter(|t| matches!(t.text_panel, Some(TextPanelInfo { kind: PanelKind::Caption, .. })))
            .collect();
        assert_eq!(captions.len(), 9);
        assert!(captions.iter().all(|t| t.row != 1 && t.index != engine.layout().bottom_left_index()));
        assert!(captions.iter().all(|t| t.material.kind() == MaterialKind::Text));
    }

    #[test]
    fn mode_switch_schedules_a_fast_reveal() {
        let (mut engine, now) = engine(1200, 800);
        engine.on_camera_result(Err(CameraError::Unavailable("none".into())), now);
        let later = now + Duration::from_secs(5);
        engine.tick(later);
        engine.set_mode(Mode::Delay, later);
        assert!(engine.is_reveal_pending());
        assert!(engine.reveal_values(later).iter().all(|r| *r == 0.0));
        engine.tick(later + Duration::from_millis(100));
        assert!(engine.reveal().is_animating());
        assert_eq!(engine.reveal().speed(), RevealSpeed::FAST);
    }

    #[test]
    fn delay_tiles_read_history_and_text_stays_unmirrored() {
        let (mut engine, now) = engine(1200, 800);
        engine.on_camera_result(Err(CameraError::Unavailable("none".into())), now);
        engine.set_mode(Mode::Delay, now);
        for tile in engine.tiles() {
            if tile.is_text_panel() {
                assert!(matches!(tile.source, TileSource::Panel));
                assert!(!tile.material.is_mirrored());
            } else {
                assert!(matches!(tile.source, TileSource::History(_)));
            }
        }
        assert!(engine.toggle_order().is_some());
        assert_eq!(engine.machine().delay_ordering(), DelayOrdering::Sequential);
    }

    #[test]
    fn zoom_freezes_once_and_survives_reentry() {
        let (mut engine, now) = engine(1200, 800);
        engine.on_camera_result(Err(CameraError::Unavailable("none".into())), now);
        engine.set_mode(Mode::Zoom, now);
        assert!(engine.wants_detection());
        engine.apply_detections(crate::core_modules::detection::heuristic_detections());
        assert!(engine.machine().zoom_initialized());
        let frozen = engine.machine().zoom_settings().cloned();
        assert!(!engine.wants_detection());

        engine.set_mode(Mode::Zoom, now);
        assert_eq!(engine.machine().zoom_settings().cloned(), frozen);

        assert!(engine.reinitialize_zoom());
        assert!(engine.wants_detection());
    }

    #[test]
    fn strategy_cycles_only_in_effects_mode() {
        let (mut engine, now) = engine(1200, 800);
        assert_eq!(engine.cycle_strategy(), None);
        engine.set_mode(Mode::Effects, now);
        assert_eq!(engine.cycle_strategy(), Some(EffectStrategy::Gradient));
    }

    #[test]
    fn headline_characters_avoid_text_panels() {
        let (mut engine, now) = engine(1200, 800);
        engine.set_mode_with_headline(Mode::Effects, "סדרות", now);
        assert_eq!(engine.headline(), "סדרות");
        assert_eq!(engine.scattered().len(), 5);
        for placed in engine.scattered() {
            let tile = &engine.tiles()[placed.tile_index];
            assert!(!tile.is_text_panel());
            assert!(matches!(tile.overlay, Some(TileOverlay::Character { .. })));
        }

        engine.set_mode_with_headline(Mode::Effects, "   ", now);
        assert_eq!(engine.headline(), "סדרות");
        engine.set_mode_with_headline(Mode::Effects, "עמוד בית", now);
        assert_eq!(engine.headline(), "גחלילות");
    }

    #[test]
    fn reselecting_the_active_mode_keeps_every_headline_character() {
        for seed in 0..40 {
            let now = Instant::now();
            let config = EngineConfig { seed: Some(seed), ..config() };
            let mut engine = FaceGridEngine::new(config, Viewport::new(1200, 800), Box::new(BoxPainter), now).expect("engine");
            let expected = split_headline(engine.headline()).len();
            for mode in [Mode::Pixelation, Mode::Pixelation, Mode::Effects, Mode::Effects, Mode::Primitive, Mode::Primitive] {
                for _ in 0..3 {
                    engine.set_mode(mode, now);
                    let characters: Vec<&Tile> = engine
                        .tiles()
                        .iter()
                        .filter(|t| matches!(t.overlay, Some(TileOverlay::Character { .. })))
                        .collect();
                    assert_eq!(characters.len(), expected, "seed {seed}, mode {mode}");
                    assert!(characters.iter().all(|t| !t.is_text_panel()), "seed {seed}, mode {mode}");
                }
            }
        }
    }

    #[test]
    fn overlay_badges_replace_characters_when_hidden() {
        let (mut engine, _) = engine(1200, 800);
        assert!(!engine.toggle_characters());
        assert!(engine.scattered().is_empty());
        let badges = engine.tiles().iter().filter(|t| matches!(t.overlay, Some(TileOverlay::Text { .. }))).count();
        assert!(badges > 0);
        assert!(!engine.toggle_overlay_text());
        assert!(engine.tiles().iter().all(|t| t.overlay.is_none()));
    }

    #[test]
    fn hovering_a_caption_shows_and_grid_open_hides() {
        let (mut engine, now) = engine(1200, 800);
        engine.on_camera_result(Err(CameraError::Unavailable("none".into())), now);
        let caption = engine.tiles().iter().find(|t| t.is_text_panel()).expect("a caption").index;
        let rect = engine.layout().tile_rect(caption);
        let (x, y) = ((rect.x0 + rect.x1) as f32 / 2.0, (rect.y0 + rect.y1) as f32 / 2.0);

        assert_eq!(engine.pointer_moved(x, y), HoverChange::Shown);
        assert!(engine.hover().active().unwrap().neighborhood.contains(caption));
        assert_eq!(engine.pointer_moved(x + 1.0, y), HoverChange::Unchanged);

        engine.set_grid_open(true);
        assert!(!engine.hover().is_visible());
        assert_eq!(engine.pointer_moved(x, y), HoverChange::Unchanged);
        assert!(!engine.hover().is_visible());
    }

    #[test]
    fn resize_rebuilds_and_reveals() {
        let (mut engine, now) = engine(1200, 800);
        engine.on_camera_result(Err(CameraError::Unavailable("none".into())), now);
        engine.resize(Viewport::new(600, 400), now);
        assert_eq!(engine.tiles().len(), engine.layout().tile_count());
        assert!(engine.is_reveal_pending());
        let frame = engine.render_frame(now);
        assert_eq!(frame.dimensions(), (600, 400));
    }
}
