use super::levels::MagnitudeMapper;
use super::params::{LevelSettings, PipelineParams};
use super::resample::SpectralResampler;
use super::transform::{SpectralHistory, SpectralTransform};
use crate::error::{check_len, try_filled, Result};
use crate::render::canvas::{CanvasReader, SpectrogramCanvas};

/// One input source's worth of spectral state: history, transform,
/// level mapping, resampling and the canvas they paint.
///
/// Every buffer is sized at construction; [`process_frame`] does not
/// allocate, lock or block, so it can run inside an audio callback.
///
/// [`process_frame`]: Pipeline::process_frame
pub struct Pipeline {
    params: PipelineParams,
    history: SpectralHistory,
    transform: SpectralTransform,
    mapper: MagnitudeMapper,
    resampler: SpectralResampler,
    canvas: SpectrogramCanvas,
    scaled: Vec<f32>,
    intensities: Vec<f32>,
    rows: Vec<f32>,
}

impl Pipeline {
    pub fn new(params: PipelineParams) -> Result<(Self, CanvasReader)> {
        params.validate()?;
        let n = params.frame_length;

        let history = SpectralHistory::new(n)?;
        let transform = SpectralTransform::new(n)?;
        let mapper = MagnitudeMapper::new(params.levels);
        let resampler = SpectralResampler::new(params.canvas_height, params.top_bin, n)?;
        let (canvas, reader) = SpectrogramCanvas::new(params.canvas_width, params.canvas_height)?;

        let pipeline = Self {
            scaled: try_filled(n, 0.0, "scaled frame")?,
            intensities: try_filled(n, 0.0, "bin intensities")?,
            rows: try_filled(params.canvas_height, 0.0, "canvas rows")?,
            params,
            history,
            transform,
            mapper,
            resampler,
            canvas,
        };
        Ok((pipeline, reader))
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    pub fn levels(&self) -> LevelSettings {
        self.params.levels
    }

    pub fn set_levels(&mut self, levels: LevelSettings) {
        self.params.levels = levels;
        self.mapper.set_levels(levels);
    }

    pub fn canvas(&self) -> &SpectrogramCanvas {
        &self.canvas
    }

    /// Per-bin intensity (`0..=255`) of the most recent frame.
    pub fn intensities(&self) -> &[f32] {
        &self.intensities
    }

    /// Resampled rows painted for the most recent frame.
    pub fn rows(&self) -> &[f32] {
        &self.rows
    }

    /// Runs one frame of `N` mono samples through the chain and paints
    /// one canvas column.
    pub fn process_frame(&mut self, frame: &[f32]) -> Result<()> {
        check_len("capture frame", frame.len(), self.params.frame_length)?;

        let volume = self.params.levels.volume();
        for (dst, &src) in self.scaled.iter_mut().zip(frame) {
            *dst = src * volume;
        }
        self.history.push(&self.scaled)?;

        let spectrum = self.transform.transform(self.history.as_slice())?;
        self.mapper.map(spectrum, &mut self.intensities)?;
        self.resampler.resample(&self.intensities, &mut self.rows)?;
        self.canvas.paint_column(&self.rows)
    }

    /// Processes every complete frame of `mono` once, in order. A trailing
    /// partial frame marks the end of the stream and is not painted.
    /// `on_frame` receives the running frame count.
    pub fn render<F: FnMut(usize)>(&mut self, mono: &[f32], mut on_frame: F) -> Result<usize> {
        let mut painted = 0;
        for frame in mono.chunks_exact(self.params.frame_length) {
            self.process_frame(frame)?;
            painted += 1;
            on_frame(painted);
        }
        Ok(painted)
    }
}
