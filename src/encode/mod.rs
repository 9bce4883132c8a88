pub mod export;

pub use export::save_spectrogram;
