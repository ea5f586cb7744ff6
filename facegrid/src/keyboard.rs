//! Single-key developer shortcuts. Not a stable interface.

use crate::core_modules::mode::Mode;
use crate::engine::EngineCommand;

pub const HELP: &str = "\
facegrid keyboard shortcuts
  1  effects mode          2  delay mode
  3  zoom mode             4  primitive mode (eye tracking + face)
  5  pixelation mode
  r  randomize the grid    s  toggle random/sequential delay order (delay mode)
  c  start camera          x  stop camera
  z  re-detect zoom focus points (zoom mode)
  v  cycle effect strategy (effects mode)
  o  toggle overlay text   h  toggle headline characters
  t  show the test hover overlay
  g  rescatter headline characters
  p  cycle character gap probability (0 -> 0.3 -> 0.6)
  d  dump engine state to the log
  ?  this help";

/// Maps a key to the command it triggers.
pub fn command_for_key(key: char) -> Option<EngineCommand> {
    if let Some(mode) = Mode::from_digit(key) {
        return Some(EngineCommand::SetMode(mode));
    }
    let command = match key.to_ascii_lowercase() {
        'r' => EngineCommand::Randomize,
        's' => EngineCommand::ToggleOrder,
        'c' => EngineCommand::StartCamera,
        'x' => EngineCommand::StopCamera,
        'z' => EngineCommand::ReinitializeZoom,
        'v' => EngineCommand::CycleStrategy,
        'o' => EngineCommand::ToggleOverlayText,
        'h' => EngineCommand::ToggleCharacters,
        't' => EngineCommand::ShowTestOverlay,
        'g' => EngineCommand::Rescatter,
        'p' => EngineCommand::CycleGaps,
        'd' => EngineCommand::DebugDump,
        '?' => EngineCommand::Help,
        _ => return None,
    };
    Some(command)
}
