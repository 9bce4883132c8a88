pub mod canvas;

pub use canvas::{CanvasReader, CanvasSnapshot, SpectrogramCanvas};
