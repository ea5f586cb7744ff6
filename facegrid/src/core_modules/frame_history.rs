// THEORY:
// The `FrameHistory` is the delay ring: a fixed set of capture-resolution
// buffers holding the most recent frames, newest first. It is the only memory
// the system has of the past, and delay mode reads from it.
//
// Key architectural principles:
// 1.  **Capture Never Stops**: `capture_tick` is called on every render tick in
//     every mode. It is rate limited to its own virtual cadence (60 Hz by
//     default), independent of the display refresh rate.
// 2.  **Newest At Slot 0**: slot `i` holds the frame captured `i` capture
//     intervals ago. Rotation is O(1): the oldest buffer is popped from the back,
//     overwritten, and pushed to the front. No pixel data is copied between slots.
// 3.  **No Skipped Captures**: the caller always fills the slot, from the camera
//     when ready and from fallback imagery otherwise, so ring timing stays
//     consistent whether or not a camera is present.

use image::{RgbaImage, imageops};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const FRAME_HISTORY_CAPACITY: usize = 50;
pub const CAPTURE_WIDTH: u32 = 640;
pub const CAPTURE_HEIGHT: u32 = 480;
pub const CAPTURE_RATE_HZ: u32 = 60;

#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub image: RgbaImage,
    /// 1-based capture sequence number, 0 for a never-filled slot.
    pub sequence: u64,
    pub captured_at: Option<Instant>,
}

#[derive(Debug)]
pub struct FrameHistory {
    slots: VecDeque<CapturedFrame>,
    interval: Duration,
    last_capture: Option<Instant>,
    captured: u64,
}

impl FrameHistory {
    pub fn new(capacity: usize, width: u32, height: u32, rate_hz: u32) -> Self {
        let capacity = capacity.max(1);
        let slots = (0..capacity)
            .map(|_| CapturedFrame { image: RgbaImage::new(width, height), sequence: 0, captured_at: None })
            .collect();
        Self {
            slots,
            interval: Duration::from_secs_f64(1.0 / f64::from(rate_hz.max(1))),
            last_capture: None,
            captured: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total captures since construction.
    pub fn captured_count(&self) -> u64 {
        self.captured
    }

    /// Slots holding a captured frame.
    pub fn filled(&self) -> usize {
        (self.captured.min(self.slots.len() as u64)) as usize
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.slots.front().map_or((0, 0), |s| s.image.dimensions())
    }

    pub fn capture_due(&self, now: Instant) -> bool {
        self.last_capture
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }

    /// Captures a frame if the capture interval has elapsed. `fill` writes the
    /// new frame into the recycled buffer. Returns `true` when a capture happened.
    pub fn capture_tick(&mut self, now: Instant, fill: impl FnOnce(&mut RgbaImage)) -> bool {
        if !self.capture_due(now) {
            return false;
        }
        let Some(mut slot) = self.slots.pop_back() else {
            return false;
        };
        fill(&mut slot.image);
        self.captured += 1;
        slot.sequence = self.captured;
        slot.captured_at = Some(now);
        self.slots.push_front(slot);
        self.last_capture = Some(now);
        true
    }

    /// The frame captured `index` intervals ago, if that many have been captured.
    pub fn slot(&self, index: usize) -> Option<&CapturedFrame> {
        if index < self.filled() { self.slots.get(index) } else { None }
    }

    pub fn newest(&self) -> Option<&RgbaImage> {
        self.slot(0).map(|s| &s.image)
    }

    /// Ring slot shown for a tile whose delay offset is `offset`. Offsets count
    /// from the oldest captured frame; anything out of range reads the oldest.
    pub fn delay_slot(&self, offset: usize) -> usize {
        let filled = self.filled();
        if filled == 0 {
            return 0;
        }
        (filled - 1).checked_sub(offset).unwrap_or(filled - 1)
    }

    pub fn delayed_frame(&self, offset: usize) -> Option<&RgbaImage> {
        self.slot(self.delay_slot(offset)).map(|s| &s.image)
    }
}

/// Writes `src` into `dst`, resampling when the sizes differ.
pub fn blit_scaled(src: &RgbaImage, dst: &mut RgbaImage) {
    if src.dimensions() == dst.dimensions() {
        dst.copy_from_slice(src.as_raw());
        return;
    }
    let (w, h) = dst.dimensions();
    let resized = imageops::resize(src, w, h, imageops::FilterType::Triangle);
    dst.copy_from_slice(resized.as_raw());
}
