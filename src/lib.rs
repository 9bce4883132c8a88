//! Real-time spectrogram pipeline: Kaiser-windowed FFT of a sliding
//! two-frame history, decibel mapping, row resampling and a circular
//! column canvas, driven from a microphone, file playback or a silent
//! file reader.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod encode;
pub mod error;
pub mod render;
pub mod score;

pub use analysis::{LevelSettings, Pipeline, PipelineParams};
pub use audio::{AudioClip, CaptureEngine, FrameSource, StreamState};
pub use error::{Error, Result};
pub use render::{CanvasReader, CanvasSnapshot};
pub use score::{compare, Similarity};
