// THEORY:
// `EngineConfig` is the one place every tunable of the engine lives. It is a
// plain struct with public fields, like the pipeline configs it descends from,
// plus serde so deployments can ship a JSON file, plus a thin environment
// overlay for the handful of values people change per run.
//
// Key architectural principles:
// 1.  **Defaults Are The Product**: `EngineConfig::default()` is the installed
//     experience. A config file only lists what it changes.
// 2.  **Layered Sources**: defaults, then an optional JSON file, then
//     `FACEGRID_*` environment variables, then CLI flags in the binaries.
// 3.  **Durations As Milliseconds**: the file format stores integers; the
//     accessors hand out `Duration`s.

use crate::core_modules::detection::DetectionPolicy;
use crate::core_modules::frame_history::{CAPTURE_HEIGHT, CAPTURE_RATE_HZ, CAPTURE_WIDTH, FRAME_HISTORY_CAPACITY};
use crate::core_modules::mode::Mode;
use crate::core_modules::reveal::RevealSpeed;
use crate::core_modules::text_panels::PIXELATION_CAPTION_COUNT;
use crate::core_modules::text_render::FontFamilies;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_MODE: &str = "FACEGRID_MODE";
pub const ENV_SEED: &str = "FACEGRID_SEED";
pub const ENV_HEADLINE: &str = "FACEGRID_HEADLINE";
pub const ENV_FONT_DIR: &str = "FACEGRID_FONT_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub history_capacity: usize,
    pub capture_width: u32,
    pub capture_height: u32,
    pub capture_rate_hz: u32,
    pub detection_interval_ms: u64,
    pub detection_timeout_ms: u64,
    /// Consecutive detector failures tolerated before it is disabled.
    pub detection_failure_limit: u32,
    pub resize_debounce_ms: u64,
    /// Delay between a mode switch and its fast reveal.
    pub mode_switch_reveal_delay_ms: u64,
    /// Delay between startup and the slow initial reveal.
    pub initial_reveal_delay_ms: u64,
    pub fast_reveal_interval_ms: u64,
    pub fast_reveal_duration_ms: u64,
    pub slow_reveal_interval_ms: u64,
    pub slow_reveal_duration_ms: u64,
    pub pixelation_caption_count: usize,
    pub gap_probability: f32,
    pub overlay_texts: Vec<String>,
    pub overlay_text_enabled: bool,
    pub show_characters: bool,
    pub initial_mode: Mode,
    pub headline: String,
    pub fonts: FontFamilies,
    pub font_dir: Option<PathBuf>,
    /// Replacement article catalog. The embedded catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
    pub fallback_images: HashMap<Mode, Vec<PathBuf>>,
    /// Seed for every random choice. Unset means seeded from the OS.
    pub seed: Option<u64>,
    /// Target rate of the display loop.
    pub display_fps: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let no_camera = |n: u32| (0..n).map(|i| PathBuf::from(format!("images/NoCamera/{i}.webp"))).collect::<Vec<_>>();
        Self {
            history_capacity: FRAME_HISTORY_CAPACITY,
            capture_width: CAPTURE_WIDTH,
            capture_height: CAPTURE_HEIGHT,
            capture_rate_hz: CAPTURE_RATE_HZ,
            detection_interval_ms: 150,
            detection_timeout_ms: 1000,
            detection_failure_limit: 5,
            resize_debounce_ms: 150,
            mode_switch_reveal_delay_ms: 100,
            initial_reveal_delay_ms: 500,
            fast_reveal_interval_ms: 15,
            fast_reveal_duration_ms: 300,
            slow_reveal_interval_ms: 80,
            slow_reveal_duration_ms: 800,
            pixelation_caption_count: PIXELATION_CAPTION_COUNT,
            gap_probability: 0.3,
            overlay_texts: ["LIVE", "REC", "ON AIR", "חי", "שידור", "עכשיו"].map(String::from).to_vec(),
            overlay_text_enabled: true,
            show_characters: true,
            initial_mode: Mode::Pixelation,
            headline: "גחלילות".into(),
            fonts: FontFamilies::default(),
            font_dir: None,
            catalog_path: None,
            fallback_images: Mode::ALL.into_iter().map(|m| (m, no_camera(2))).collect(),
            seed: None,
            display_fps: 60,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Overlays `FACEGRID_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overlays variables from any lookup, so tests do not touch the process
    /// environment.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_MODE) {
            self.initial_mode = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key: ENV_MODE, value: value.clone() })?;
        }
        if let Some(value) = lookup(ENV_SEED) {
            let seed = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key: ENV_SEED, value: value.clone() })?;
            self.seed = Some(seed);
        }
        if let Some(value) = lookup(ENV_HEADLINE) {
            if !value.trim().is_empty() {
                self.headline = value.trim().to_string();
            }
        }
        if let Some(value) = lookup(ENV_FONT_DIR) {
            self.font_dir = Some(PathBuf::from(value));
        }
        Ok(())
    }

    /// Defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn detection_policy(&self) -> DetectionPolicy {
        DetectionPolicy {
            interval: Duration::from_millis(self.detection_interval_ms),
            timeout: Duration::from_millis(self.detection_timeout_ms),
            failure_limit: self.detection_failure_limit,
        }
    }

    pub fn fast_reveal(&self) -> RevealSpeed {
        RevealSpeed {
            interval: Duration::from_millis(self.fast_reveal_interval_ms),
            duration: Duration::from_millis(self.fast_reveal_duration_ms),
        }
    }

    pub fn slow_reveal(&self) -> RevealSpeed {
        RevealSpeed {
            interval: Duration::from_millis(self.slow_reveal_interval_ms),
            duration: Duration::from_millis(self.slow_reveal_duration_ms),
        }
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }

    pub fn mode_switch_reveal_delay(&self) -> Duration {
        Duration::from_millis(self.mode_switch_reveal_delay_ms)
    }

    pub fn initial_reveal_delay(&self) -> Duration {
        Duration::from_millis(self.initial_reveal_delay_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.display_fps.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_installed_experience() {
        let config = EngineConfig::default();
        assert_eq!(config.history_capacity, 50);
        assert_eq!((config.capture_width, config.capture_height, config.capture_rate_hz), (640, 480, 60));
        assert_eq!(config.initial_mode, Mode::Pixelation);
        assert_eq!(config.fast_reveal(), RevealSpeed::FAST);
        assert_eq!(config.slow_reveal(), RevealSpeed::SLOW);
        assert_eq!(config.detection_policy(), DetectionPolicy::default());
        assert_eq!(config.fallback_images[&Mode::Zoom][1], PathBuf::from("images/NoCamera/1.webp"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{ "initial_mode": "zoom", "seed": 7 }"#).unwrap();
        assert_eq!(config.initial_mode, Mode::Zoom);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.pixelation_caption_count, 9);
    }

    #[test]
    fn environment_overlays_values() {
        let mut config = EngineConfig::default();
        let vars = |key: &str| match key {
            ENV_MODE => Some("Delay".to_string()),
            ENV_SEED => Some(" 42 ".to_string()),
            ENV_HEADLINE => Some("   ".to_string()),
            _ => None,
        };
        config.apply_vars(vars).unwrap();
        assert_eq!(config.initial_mode, Mode::Delay);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.headline, "גחלילות");
    }

    #[test]
    fn bad_environment_values_are_reported() {
        let mut config = EngineConfig::default();
        let err = config.apply_vars(|key| (key == ENV_SEED).then(|| "soon".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_SEED, .. }));
    }
}
