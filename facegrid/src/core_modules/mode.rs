// THEORY:
// The `ModeMachine` holds the single source of truth for which display mode is
// live, together with the mode-scoped state that must survive or be discarded
// across transitions: delay offsets, frozen zoom settings, and the cached text
// layouts.
//
// Key architectural principles:
// 1.  **One Discriminant**: the mode is an enum, never a set of flags. "Exactly
//     one mode active" is a property of the type, and `flags()` only exists to
//     report it.
// 2.  **Fresh vs. Re-entry**: entering delay or zoom from another mode discards
//     their settings so they regenerate. Re-selecting the mode that is already
//     active keeps them, so a frozen zoom survives a repeated `set_mode(Zoom)`.
// 3.  **Scoped Caches**: text pair and caption positions are cached per
//     `(mode, grid)` and are dropped by the transitions that should reshuffle
//     them. A grid change invalidates them through the key alone.

use super::delay::{DelayOrder, DelayOrdering};
use super::detection::Detection;
use super::grid_partitioner::GridKey;
use super::text_panels::TextPair;
use super::zoom::{ZoomOrigin, ZoomSettings};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Effects,
    Delay,
    Zoom,
    Primitive,
    #[default]
    Pixelation,
}

impl Mode {
    /// Keyboard order: `1` is effects, `5` is pixelation.
    pub const ALL: [Mode; 5] = [Mode::Effects, Mode::Delay, Mode::Zoom, Mode::Primitive, Mode::Pixelation];

    pub fn key(self) -> &'static str {
        match self {
            Mode::Effects => "effects",
            Mode::Delay => "delay",
            Mode::Zoom => "zoom",
            Mode::Primitive => "primitive",
            Mode::Pixelation => "pixelation",
        }
    }

    pub fn from_digit(digit: char) -> Option<Mode> {
        let n = digit.to_digit(10)? as usize;
        n.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }

    /// Title/author pairs or captions appear in every mode but primitive.
    pub fn has_text_panels(self) -> bool {
        self != Mode::Primitive
    }

    /// Pixelation shows single captions instead of title/author pairs.
    pub fn uses_captions(self) -> bool {
        self == Mode::Pixelation
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown mode {:?}", self.0)
    }
}

impl std::error::Error for UnknownMode {}

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

/// What a call to [`ModeMachine::set_mode`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Mode,
    pub to: Mode,
    /// The target differs from the mode that was active.
    pub fresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PairCacheKey {
    mode: Mode,
    grid: GridKey,
}

pub struct ModeMachine {
    mode: Mode,
    delay_ordering: DelayOrdering,
    delay_order: Option<DelayOrder>,
    zoom: Option<ZoomSettings>,
    zoom_initialized: bool,
    pair_cache: Option<(PairCacheKey, Vec<TextPair>)>,
    caption_cache: Option<(GridKey, Vec<usize>)>,
}

impl ModeMachine {
    pub fn new(initial: Mode) -> Self {
        Self {
            mode: initial,
            delay_ordering: DelayOrdering::default(),
            delay_order: None,
            zoom: None,
            zoom_initialized: false,
            pair_cache: None,
            caption_cache: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is(&self, mode: Mode) -> bool {
        self.mode == mode
    }

    /// Activity of each mode in [`Mode::ALL`] order.
    pub fn flags(&self) -> [bool; 5] {
        Mode::ALL.map(|m| m == self.mode)
    }

    pub fn set_mode(&mut self, target: Mode) -> Transition {
        let from = self.mode;
        let fresh = from != target;
        self.mode = target;

        match target {
            Mode::Delay if fresh => {
                self.delay_order = None;
                self.pair_cache = None;
            }
            Mode::Zoom if fresh => {
                self.zoom = None;
                self.zoom_initialized = false;
                self.pair_cache = None;
            }
            Mode::Primitive | Mode::Effects => self.pair_cache = None,
            Mode::Pixelation => self.caption_cache = None,
            Mode::Delay | Mode::Zoom => {}
        }

        if fresh {
            tracing::info!(from = %from, to = %target, "display mode changed");
        }
        Transition { from, to: target, fresh }
    }

    /// Builds whatever per-tile settings the active mode needs and that are
    /// missing or sized for a different grid.
    pub fn ensure_settings<R: Rng + ?Sized>(&mut self, tile_count: usize, history_capacity: usize, rng: &mut R) {
        match self.mode {
            Mode::Delay => {
                if self.delay_order.as_ref().is_none_or(|o| o.len() != tile_count) {
                    self.delay_order = Some(DelayOrder::build(self.delay_ordering, tile_count, history_capacity, rng));
                }
            }
            Mode::Zoom => {
                if self.zoom.as_ref().is_none_or(|z| z.len() != tile_count) {
                    self.zoom = Some(ZoomSettings::randomized(tile_count, rng));
                    self.zoom_initialized = false;
                }
            }
            _ => {}
        }
    }

    /// Detection only matters until zoom settings freeze, and continuously in
    /// primitive mode.
    pub fn wants_detection(&self) -> bool {
        match self.mode {
            Mode::Zoom => !self.zoom_initialized,
            Mode::Primitive => true,
            _ => false,
        }
    }

    /// Freezes face-aware zoom settings from the first detection result.
    /// Returns `true` when settings changed.
    pub fn apply_detections<R: Rng + ?Sized>(&mut self, detections: &[Detection], tile_count: usize, rng: &mut R) -> bool {
        if self.mode != Mode::Zoom || self.zoom_initialized {
            return false;
        }
        self.zoom = Some(ZoomSettings::face_aware(tile_count, detections, rng));
        self.zoom_initialized = true;
        tracing::info!(tiles = tile_count, "zoom settings frozen from face detection");
        true
    }

    /// Discards frozen zoom settings so they are rebuilt. Zoom mode only.
    pub fn reinitialize_zoom(&mut self) -> bool {
        if self.mode != Mode::Zoom {
            return false;
        }
        self.zoom = None;
        self.zoom_initialized = false;
        true
    }

    /// Flips random/sequential delay ordering and discards the old order.
    /// Delay mode only.
    pub fn toggle_delay_ordering(&mut self) -> Option<DelayOrdering> {
        if self.mode != Mode::Delay {
            return None;
        }
        self.delay_ordering = self.delay_ordering.toggled();
        self.delay_order = None;
        Some(self.delay_ordering)
    }

    pub fn delay_ordering(&self) -> DelayOrdering {
        self.delay_ordering
    }

    pub fn delay_order(&self) -> Option<&DelayOrder> {
        self.delay_order.as_ref()
    }

    pub fn zoom_settings(&self) -> Option<&ZoomSettings> {
        self.zoom.as_ref()
    }

    pub fn zoom_initialized(&self) -> bool {
        self.zoom_initialized
    }

    pub fn zoom_origin(&self) -> Option<ZoomOrigin> {
        self.zoom.as_ref().map(|z| z.origin)
    }

    /// Cached title/author pairs for the active mode and grid, computed on miss.
    pub fn text_pairs_or_insert_with(&mut self, grid: GridKey, compute: impl FnOnce() -> Vec<TextPair>) -> Vec<TextPair> {
        let key = PairCacheKey { mode: self.mode, grid };
        match &self.pair_cache {
            Some((cached, pairs)) if *cached == key => pairs.clone(),
            _ => {
                let pairs = compute();
                self.pair_cache = Some((key, pairs.clone()));
                pairs
            }
        }
    }

    /// Cached caption positions for the grid, computed on miss.
    pub fn captions_or_insert_with(&mut self, grid: GridKey, compute: impl FnOnce() -> Vec<usize>) -> Vec<usize> {
        match &self.caption_cache {
            Some((cached, positions)) if *cached == grid => positions.clone(),
            _ => {
                let positions = compute();
                self.caption_cache = Some((grid, positions.clone()));
                positions
            }
        }
    }

    /// Drops every cached layout, e.g. for an explicit randomize.
    pub fn clear_layout_caches(&mut self) {
        self.pair_cache = None;
        self.caption_cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::heuristic_detections;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const GRID: GridKey = GridKey { cols: 13, rows: 8 };

    fn pair(title: usize) -> TextPair {
        TextPair { title, author: title + 1, pair_index: 0 }
    }

    #[test]
    fn exactly_one_flag_through_any_sequence() {
        let mut machine = ModeMachine::new(Mode::default());
        assert_eq!(machine.flags().iter().filter(|f| **f).count(), 1);
        for target in [Mode::Zoom, Mode::Zoom, Mode::Delay, Mode::Effects, Mode::Primitive, Mode::Pixelation] {
            machine.set_mode(target);
            assert_eq!(machine.flags().iter().filter(|f| **f).count(), 1);
            assert!(machine.is(target));
        }
    }

    #[test]
    fn re_entering_zoom_keeps_frozen_settings() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut machine = ModeMachine::new(Mode::Pixelation);
        machine.set_mode(Mode::Zoom);
        machine.ensure_settings(104, 50, &mut rng);
        assert!(machine.wants_detection());
        assert!(machine.apply_detections(&heuristic_detections(), 104, &mut rng));
        let frozen = machine.zoom_settings().cloned();

        let transition = machine.set_mode(Mode::Zoom);
        assert!(!transition.fresh);
        machine.ensure_settings(104, 50, &mut rng);
        assert_eq!(machine.zoom_settings().cloned(), frozen);
        assert!(!machine.wants_detection());
        assert!(!machine.apply_detections(&heuristic_detections(), 104, &mut rng));
    }

    #[test]
    fn leaving_and_returning_to_zoom_regenerates() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut machine = ModeMachine::new(Mode::Zoom);
        machine.ensure_settings(10, 50, &mut rng);
        machine.apply_detections(&heuristic_detections(), 10, &mut rng);
        machine.set_mode(Mode::Effects);
        machine.set_mode(Mode::Zoom);
        assert!(machine.zoom_settings().is_none());
        assert!(!machine.zoom_initialized());
    }

    #[test]
    fn grid_resize_rebuilds_settings() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut machine = ModeMachine::new(Mode::Effects);
        machine.set_mode(Mode::Delay);
        machine.ensure_settings(20, 50, &mut rng);
        assert_eq!(machine.delay_order().map(|o| o.len()), Some(20));
        machine.ensure_settings(30, 50, &mut rng);
        assert_eq!(machine.delay_order().map(|o| o.len()), Some(30));
    }

    #[test]
    fn mode_only_commands_are_ignored_elsewhere() {
        let mut machine = ModeMachine::new(Mode::Effects);
        assert!(!machine.reinitialize_zoom());
        assert_eq!(machine.toggle_delay_ordering(), None);
        machine.set_mode(Mode::Delay);
        assert_eq!(machine.toggle_delay_ordering(), Some(DelayOrdering::Sequential));
        assert!(machine.delay_order().is_none());
    }

    #[test]
    fn pair_cache_is_scoped_to_mode_and_grid() {
        let mut machine = ModeMachine::new(Mode::Delay);
        let first = machine.text_pairs_or_insert_with(GRID, || vec![pair(30)]);
        let again = machine.text_pairs_or_insert_with(GRID, || vec![pair(40)]);
        assert_eq!(first, again);

        let resized = machine.text_pairs_or_insert_with(GridKey { cols: 12, rows: 8 }, || vec![pair(40)]);
        assert_eq!(resized[0].title, 40);

        machine.set_mode(Mode::Effects);
        let effects = machine.text_pairs_or_insert_with(GRID, || vec![pair(50)]);
        assert_eq!(effects[0].title, 50);
    }

    #[test]
    fn pixelation_entry_clears_caption_cache() {
        let mut machine = ModeMachine::new(Mode::Pixelation);
        machine.captions_or_insert_with(GRID, || vec![1, 2, 3]);
        assert_eq!(machine.captions_or_insert_with(GRID, Vec::new), vec![1, 2, 3]);
        machine.set_mode(Mode::Pixelation);
        assert!(machine.captions_or_insert_with(GRID, Vec::new).is_empty());
    }

    #[test]
    fn parses_keys_and_digits() {
        assert_eq!("Zoom".parse::<Mode>(), Ok(Mode::Zoom));
        assert!("blur".parse::<Mode>().is_err());
        assert_eq!(Mode::from_digit('1'), Some(Mode::Effects));
        assert_eq!(Mode::from_digit('5'), Some(Mode::Pixelation));
        assert_eq!(Mode::from_digit('0'), None);
        assert_eq!(Mode::from_digit('6'), None);
    }
}
