//! Error taxonomy for the spectrogram pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid parameter combination, rejected before anything runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A buffer handed across a module boundary has the wrong length.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),

    /// Non-finite intermediate value that would corrupt every frame.
    #[error("numerical error: {0}")]
    Numerical(String),

    #[error("source error: {0}")]
    Source(String),

    #[error("decode error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("stream state error: {0}")]
    StreamState(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Allocates a vector of `len` copies of `value`, reporting allocation
/// failure instead of aborting.
pub(crate) fn try_filled<T: Clone>(len: usize, value: T, what: &str) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| {
        Error::ResourceExhaustion(format!("cannot allocate {} ({} elements): {}", what, len, e))
    })?;
    buf.resize(len, value);
    Ok(buf)
}

/// Fails with [`Error::Precondition`] unless `actual == expected`.
pub(crate) fn check_len(what: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(Error::Precondition(format!(
            "{} has length {}, expected {}",
            what, actual, expected
        )));
    }
    Ok(())
}
