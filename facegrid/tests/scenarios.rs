use facegrid::core_modules::character_scatter::{ScatterGrid, scatter_characters, split_headline};
use facegrid::core_modules::detection::heuristic_detections;
use facegrid::core_modules::frame_history::FrameHistory;
use facegrid::core_modules::grid_partitioner::GridLayout;
use facegrid::core_modules::reveal::{EntranceReveal, RevealSpeed};
use facegrid::core_modules::text_render::BoxPainter;
use facegrid::core_modules::tile::{PanelKind, TextPanelInfo};
use facegrid::error::CameraError;
use facegrid::{EngineConfig, FaceGridEngine, Mode, Viewport};
use image::{Rgba, RgbaImage};
use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

fn engine(width: u32, height: u32, seed: u64) -> (FaceGridEngine, Instant) {
    let config = EngineConfig { seed: Some(seed), fallback_images: HashMap::new(), ..EngineConfig::default() };
    let now = Instant::now();
    let engine = FaceGridEngine::new(config, Viewport::new(width, height), Box::new(BoxPainter), now).expect("engine");
    (engine, now)
}

#[test]
fn full_hd_grids_round_rows_up() {
    let layout = GridLayout::partition(Viewport::new(1920, 1080));
    assert_eq!((layout.cols, layout.rows), (13, 8));
    let layout = GridLayout::partition(Viewport::new(1920, 1050));
    assert_eq!((layout.cols, layout.rows), (13, 7));
}

#[test]
fn pixelation_allocates_nine_captions_on_a_13_by_7_grid() {
    for seed in 0..8 {
        let (engine, _) = engine(1920, 1050, seed);
        assert_eq!((engine.layout().cols, engine.layout().rows), (13, 7));
        assert_eq!(engine.mode(), Mode::Pixelation);

        let bottom_left = engine.layout().bottom_left_index();
        let captions: Vec<_> = engine
            .tiles()
            .iter()
            .filter(|t| matches!(t.text_panel, Some(TextPanelInfo { kind: PanelKind::Caption, .. })))
            .collect();
        assert_eq!(captions.len(), 9, "seed {seed}");
        for caption in &captions {
            assert_ne!(caption.row, 1);
            assert_ne!(caption.index, bottom_left);
        }
        let video = engine.tiles().iter().filter(|t| !t.is_text_panel()).count();
        assert_eq!(video, 13 * 7 - 9);
    }
}

#[test]
fn three_letter_headline_scatters_around_claimed_tiles() {
    let claimed: HashSet<usize> = [10, 20].into_iter().collect();
    let grid = ScatterGrid { cols: 8, rows: 5, claimed: &claimed };
    let characters = split_headline("אבג");
    for seed in 0..32 {
        let mut rng = StdRng::seed_from_u64(seed);
        let placed = scatter_characters(&characters, &grid, 0.3, &mut rng);
        assert_eq!(placed.len(), 3);
        let columns: HashSet<u32> = placed.iter().map(|p| p.col).collect();
        assert_eq!(columns.len(), 3);
        assert!(placed.iter().all(|p| !claimed.contains(&p.tile_index)));
        assert_eq!(placed.iter().map(|p| p.character).collect::<String>(), "אבג");
    }
}

#[test]
fn history_slots_count_back_from_the_newest_capture() {
    let mut history = FrameHistory::new(5, 2, 2, 60);
    let start = Instant::now();
    let captures = 7u64;
    for n in 1..=captures {
        let now = start + history.interval() * n as u32;
        let value = n as u8;
        assert!(history.capture_tick(now, |slot| *slot = RgbaImage::from_pixel(2, 2, Rgba([value, 0, 0, 255]))));
    }
    assert_eq!(history.captured_count(), captures);
    for k in 0..5 {
        let slot = history.slot(k).expect("filled slot");
        assert_eq!(slot.sequence, captures - k as u64);
        assert_eq!(slot.image.get_pixel(0, 0)[0], (captures - k as u64) as u8);
    }
    assert!(history.slot(5).is_none());
}

#[test]
fn entrance_reveal_ends_fully_revealed() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut reveal = EntranceReveal::idle(24);
    let start = Instant::now();
    reveal.start(24, RevealSpeed::FAST, start);
    let mut now = start;
    while reveal.step(now, &mut rng) {
        now += Duration::from_millis(5);
        assert!(now < start + Duration::from_secs(5), "reveal never finished");
    }
    assert!(!reveal.is_animating());
    assert_eq!(reveal.started_count(), 24);
    assert!((0..24).all(|tile| reveal.reveal(tile, now) == 1.0));
}

#[test]
fn exactly_one_mode_is_active_at_every_step() {
    let (mut engine, now) = engine(1280, 720, 9);
    engine.on_camera_result(Err(CameraError::Unavailable("test".into())), now);
    let script = [Mode::Zoom, Mode::Zoom, Mode::Delay, Mode::Primitive, Mode::Effects, Mode::Pixelation, Mode::Delay];
    for (step, mode) in script.into_iter().enumerate() {
        engine.set_mode(mode, now + Duration::from_millis(step as u64 * 200));
        let flags = engine.machine().flags();
        assert_eq!(flags.iter().filter(|f| **f).count(), 1);
        assert_eq!(engine.mode(), mode);
    }
}

#[test]
fn zoom_settings_survive_a_repeated_switch() {
    let (mut engine, now) = engine(1280, 720, 4);
    engine.on_camera_result(Err(CameraError::Unavailable("test".into())), now);
    engine.set_mode(Mode::Zoom, now);
    engine.apply_detections(heuristic_detections());
    let frozen = engine.machine().zoom_settings().cloned().expect("zoom settings");

    engine.set_mode(Mode::Zoom, now + Duration::from_millis(300));
    assert_eq!(engine.machine().zoom_settings(), Some(&frozen));

    engine.set_mode(Mode::Effects, now + Duration::from_millis(600));
    engine.set_mode(Mode::Zoom, now + Duration::from_millis(900));
    assert!(!engine.machine().zoom_initialized());
}

#[test]
fn capture_keeps_its_cadence_in_every_mode() {
    let (mut engine, start) = engine(640, 480, 1);
    engine.on_camera_result(Err(CameraError::Unavailable("test".into())), start);
    let interval = engine.history().interval();
    let mut now = start;
    let mut expected = 0;
    for mode in Mode::ALL {
        engine.set_mode(mode, now);
        for _ in 0..3 {
            engine.tick(now);
            expected += 1;
            now += interval;
        }
    }
    assert_eq!(engine.history().captured_count(), expected);
    let frame = engine.render_frame(now);
    assert_eq!(frame.dimensions(), (640, 480));
}
