// src/nif_animation/mod.rs

pub mod chain;
pub mod merge;
pub mod text_keys;

pub use chain::{ChainBuilder, detect_fps, import_chain};
pub use merge::{Channel, Extrapolation, Interpolation, KeyframeTrack, Rotation, Sample};
pub use text_keys::{TextMarker, export_text_keys, import_text_keys};
