use std::sync::Arc;

use realfft::num_complex::Complex32;
use realfft::{RealFftPlanner, RealToComplex};

use super::window::KaiserWindow;
use crate::error::{check_len, try_filled, Error, Result};

/// The two most recent frames, oldest first. Each push shifts the newer
/// half down and appends the incoming frame.
#[derive(Debug, Clone)]
pub struct SpectralHistory {
    frame_length: usize,
    samples: Vec<f32>,
}

impl SpectralHistory {
    pub fn new(frame_length: usize) -> Result<Self> {
        Ok(Self {
            frame_length,
            samples: try_filled(2 * frame_length, 0.0, "spectral history")?,
        })
    }

    pub fn push(&mut self, frame: &[f32]) -> Result<()> {
        let n = self.frame_length;
        check_len("capture frame", frame.len(), n)?;
        self.samples.copy_within(n.., 0);
        self.samples[n..].copy_from_slice(frame);
        Ok(())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }
}

/// Real-input FFT of size 2N over the history, producing N bins.
///
/// All buffers and the FFT plan are allocated here, so [`transform`]
/// never allocates.
///
/// [`transform`]: SpectralTransform::transform
pub struct SpectralTransform {
    frame_length: usize,
    window: KaiserWindow,
    plan: Arc<dyn RealToComplex<f32>>,
    windowed: Vec<f32>,
    output: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl SpectralTransform {
    pub fn new(frame_length: usize) -> Result<Self> {
        if frame_length < 2 {
            return Err(Error::Configuration(format!(
                "frame length must be at least 2, got {}",
                frame_length
            )));
        }
        let fft_len = 2 * frame_length;

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(fft_len);

        let zero = Complex32::new(0.0, 0.0);
        let windowed = try_filled(fft_len, 0.0, "windowed history")?;
        let output = try_filled(plan.complex_len(), zero, "spectrum")?;
        let scratch = try_filled(plan.get_scratch_len(), zero, "fft scratch")?;

        let mut window = KaiserWindow::default();
        window.coefficients(fft_len)?;

        log::debug!(
            "Spectral transform ready: {}-point real FFT, {} bins kept",
            fft_len,
            frame_length
        );

        Ok(Self {
            frame_length,
            window,
            plan,
            windowed,
            output,
            scratch,
        })
    }

    /// Windows `history` (length 2N) and returns N complex bins with the
    /// DC bin forced to zero. The Nyquist bin is dropped.
    pub fn transform(&mut self, history: &[f32]) -> Result<&[Complex32]> {
        check_len("spectral history", history.len(), 2 * self.frame_length)?;
        self.window.apply(history, &mut self.windowed)?;
        self.plan
            .process_with_scratch(&mut self.windowed, &mut self.output, &mut self.scratch)
            .map_err(|e| Error::Precondition(format!("real FFT rejected buffers: {}", e)))?;

        let bins = &mut self.output[..self.frame_length];
        bins[0] = Complex32::new(0.0, 0.0);
        Ok(bins)
    }
}
