//! Per-frame spectral analysis: Kaiser window, real FFT over the last two
//! frames, decibel level mapping and row resampling.

pub mod levels;
pub mod params;
pub mod pipeline;
pub mod resample;
pub mod transform;
pub mod window;

pub use levels::MagnitudeMapper;
pub use params::{LevelSettings, PipelineParams};
pub use pipeline::Pipeline;
pub use resample::SpectralResampler;
pub use transform::{SpectralHistory, SpectralTransform};
pub use window::KaiserWindow;
