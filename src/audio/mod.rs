pub mod capture;
pub mod decode;
pub mod source;

pub use capture::{CaptureEngine, StreamState};
pub use decode::{decode_audio, AudioClip};
pub use source::{downmix, DeviceSource, FileSource, FrameAssembler, FrameSource};
