// THEORY:
// The building blocks of the face grid, leaves first. Nothing in here knows
// about the event loop: every module is a plain data structure or a pure
// function that takes time and randomness as arguments.

pub mod grid_partitioner;
pub mod frame_history;
pub mod effect_strategy;
pub mod text_panels;
pub mod character_scatter;
pub mod delay;
pub mod detection;
pub mod zoom;
pub mod mode;
pub mod materials;
pub mod reveal;
pub mod fallback;
pub mod camera;
pub mod articles;
pub mod text_render;
pub mod textures;
pub mod primitive;
pub mod hover;
pub mod tile;
pub mod renderer;
