// THEORY:
// The entrance reveal is the "fade from black" that plays whenever the grid
// appears: every tile starts dark, and a scheduler lights tiles up one at a
// time in random order, each with its own eased transition.
//
// Key architectural principles:
// 1.  **Clock Injection**: the animator never reads the clock itself. Every call
//     takes `now`, so the render loop drives it and tests can fast-forward.
// 2.  **Catch-Up Scheduling**: picks are due every `interval` from the start.
//     A late tick performs all overdue picks at once, so the overall duration
//     does not depend on the display refresh rate.
// 3.  **No Double Reveal**: a tile is picked at most once. Random picks retry on
//     collision a bounded number of times, then fall back to a linear scan.

use rand::Rng;
use std::time::{Duration, Instant};

const MAX_PICK_ATTEMPTS: usize = 100;

/// Scheduler cadence and per-tile transition length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealSpeed {
    pub interval: Duration,
    pub duration: Duration,
}

impl RevealSpeed {
    pub const FAST: RevealSpeed = RevealSpeed {
        interval: Duration::from_millis(15),
        duration: Duration::from_millis(300),
    };
    pub const SLOW: RevealSpeed = RevealSpeed {
        interval: Duration::from_millis(80),
        duration: Duration::from_millis(800),
    };
}

/// Cubic ease-in-out over `0..=1`.
pub fn ease_in_out_cubic(p: f32) -> f32 {
    let p = p.clamp(0.0, 1.0);
    if p < 0.5 { 4.0 * p * p * p } else { 1.0 - (-2.0 * p + 2.0).powi(3) / 2.0 }
}

#[derive(Debug, Clone)]
pub struct EntranceReveal {
    speed: RevealSpeed,
    started_at: Option<Instant>,
    tile_starts: Vec<Option<Instant>>,
    picked: usize,
    animating: bool,
}

impl EntranceReveal {
    /// An animator with every tile fully revealed.
    pub fn idle(tile_count: usize) -> Self {
        Self {
            speed: RevealSpeed::FAST,
            started_at: None,
            tile_starts: vec![None; tile_count],
            picked: 0,
            animating: false,
        }
    }

    /// Darkens every tile and starts the scheduler.
    pub fn start(&mut self, tile_count: usize, speed: RevealSpeed, now: Instant) {
        self.speed = speed;
        self.started_at = Some(now);
        self.tile_starts = vec![None; tile_count];
        self.picked = 0;
        self.animating = tile_count > 0;
        tracing::debug!(tiles = tile_count, ?speed, "entrance reveal started");
    }

    /// Resizes the tile set without animating, e.g. after a rebuild that should
    /// simply appear.
    pub fn reset_idle(&mut self, tile_count: usize) {
        *self = Self::idle(tile_count);
    }

    pub fn is_animating(&self) -> bool {
        self.animating
    }

    pub fn speed(&self) -> RevealSpeed {
        self.speed
    }

    /// Tiles whose transition has started.
    pub fn started_count(&self) -> usize {
        self.picked
    }

    pub fn tile_count(&self) -> usize {
        self.tile_starts.len()
    }

    /// Advances the scheduler. Returns `true` while the animation is running.
    pub fn step<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) -> bool {
        if !self.animating {
            return false;
        }
        let Some(started_at) = self.started_at else {
            self.animating = false;
            return false;
        };

        let total = self.tile_starts.len();
        let elapsed = now.saturating_duration_since(started_at);
        let due = (elapsed.as_micros() / self.speed.interval.as_micros().max(1)) as usize + 1;
        while self.picked < due.min(total) {
            let pick_time = started_at + self.speed.interval * self.picked as u32;
            match self.pick_unrevealed(rng) {
                Some(tile) => {
                    self.tile_starts[tile] = Some(pick_time);
                    self.picked += 1;
                }
                None => break,
            }
        }

        if self.picked == total {
            let last_start = self.tile_starts.iter().flatten().max().copied().unwrap_or(started_at);
            if now.saturating_duration_since(last_start) >= self.speed.duration {
                self.finish();
            }
        }
        self.animating
    }

    fn pick_unrevealed<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        let total = self.tile_starts.len();
        if total == 0 {
            return None;
        }
        (0..MAX_PICK_ATTEMPTS)
            .map(|_| rng.gen_range(0..total))
            .find(|&tile| self.tile_starts[tile].is_none())
            .or_else(|| self.tile_starts.iter().position(Option::is_none))
    }

    fn finish(&mut self) {
        self.animating = false;
        self.started_at = None;
        tracing::debug!(tiles = self.tile_starts.len(), "entrance reveal complete");
    }

    /// Current reveal value of a tile.
    pub fn reveal(&self, tile: usize, now: Instant) -> f32 {
        if !self.animating {
            return 1.0;
        }
        match self.tile_starts.get(tile).copied().flatten() {
            Some(start) => {
                let progress = now.saturating_duration_since(start).as_secs_f32() / self.speed.duration.as_secs_f32();
                ease_in_out_cubic(progress)
            }
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn easing_hits_endpoints_and_midpoint() {
        assert_eq!(ease_in_out_cubic(0.0), 0.0);
        assert_eq!(ease_in_out_cubic(1.0), 1.0);
        assert!((ease_in_out_cubic(0.5) - 0.5).abs() < 1e-6);
        assert!(ease_in_out_cubic(0.25) < 0.25);
        assert!(ease_in_out_cubic(0.75) > 0.75);
    }

    #[test]
    fn everything_is_dark_at_start() {
        let now = Instant::now();
        let mut reveal = EntranceReveal::idle(10);
        reveal.start(10, RevealSpeed::FAST, now);
        let mut rng = StdRng::seed_from_u64(0);
        reveal.step(now, &mut rng);
        assert_eq!(reveal.started_count(), 1);
        assert!((0..10).all(|t| reveal.reveal(t, now) == 0.0));
    }

    #[test]
    fn completes_with_every_tile_revealed_once() {
        let start = Instant::now();
        let mut reveal = EntranceReveal::idle(0);
        reveal.start(91, RevealSpeed::FAST, start);
        let mut rng = StdRng::seed_from_u64(42);

        let mut now = start;
        let mut ticks = 0;
        while reveal.step(now, &mut rng) {
            now += Duration::from_millis(16);
            ticks += 1;
            assert!(ticks < 1000, "reveal never completed");
        }
        assert!(!reveal.is_animating());
        assert_eq!(reveal.started_count(), 91);
        assert!((0..91).all(|t| reveal.reveal(t, now) == 1.0));
        // 91 picks at 15ms plus a 300ms transition.
        assert!(now.duration_since(start) >= Duration::from_millis(90 * 15 + 300));
    }

    #[test]
    fn late_tick_catches_up_on_picks() {
        let start = Instant::now();
        let mut reveal = EntranceReveal::idle(0);
        reveal.start(20, RevealSpeed::SLOW, start);
        let mut rng = StdRng::seed_from_u64(1);
        reveal.step(start + Duration::from_millis(400), &mut rng);
        assert_eq!(reveal.started_count(), 6);
    }

    #[test]
    fn slow_reveal_takes_longer_than_fast() {
        let run = |speed: RevealSpeed| {
            let start = Instant::now();
            let mut reveal = EntranceReveal::idle(0);
            reveal.start(12, speed, start);
            let mut rng = StdRng::seed_from_u64(9);
            let mut now = start;
            while reveal.step(now, &mut rng) {
                now += Duration::from_millis(5);
            }
            now.duration_since(start)
        };
        assert!(run(RevealSpeed::SLOW) > run(RevealSpeed::FAST));
    }

    #[test]
    fn empty_grid_never_animates() {
        let mut reveal = EntranceReveal::idle(0);
        reveal.start(0, RevealSpeed::FAST, Instant::now());
        assert!(!reveal.is_animating());
    }
}
