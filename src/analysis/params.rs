use crate::error::{Error, Result};

/// Default capture frame length N (samples per callback).
pub const DEFAULT_FRAME_LENGTH: usize = 512;
pub const DEFAULT_CANVAS_WIDTH: usize = 512;
pub const DEFAULT_CANVAS_HEIGHT: usize = 200;
/// Highest bin shown on the canvas; rows are spread over bins `0..200`.
pub const DEFAULT_TOP_BIN: usize = 200;
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

pub const DEFAULT_VOLUME: f32 = 1.0;
pub const DEFAULT_FLOOR_DB: f32 = -180.0;
pub const DEFAULT_CEILING_DB: f32 = 80.0;

/// Gain and the decibel window mapped onto pixel intensity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSettings {
    volume: f32,
    floor_db: f32,
    ceiling_db: f32,
}

impl LevelSettings {
    pub fn new(volume: f32, floor_db: f32, ceiling_db: f32) -> Result<Self> {
        if !volume.is_finite() || volume < 0.0 {
            return Err(Error::Configuration(format!(
                "volume must be a finite, non-negative gain, got {}",
                volume
            )));
        }
        if !floor_db.is_finite() || !ceiling_db.is_finite() {
            return Err(Error::Configuration(format!(
                "dB levels must be finite, got floor={} ceiling={}",
                floor_db, ceiling_db
            )));
        }
        if ceiling_db <= floor_db {
            return Err(Error::Configuration(format!(
                "ceiling ({} dB) must be above floor ({} dB)",
                ceiling_db, floor_db
            )));
        }
        Ok(Self {
            volume,
            floor_db,
            ceiling_db,
        })
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn floor_db(&self) -> f32 {
        self.floor_db
    }

    pub fn ceiling_db(&self) -> f32 {
        self.ceiling_db
    }
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            floor_db: DEFAULT_FLOOR_DB,
            ceiling_db: DEFAULT_CEILING_DB,
        }
    }
}

/// Everything one pipeline instance needs, fixed for its lifetime
/// (levels excepted, see [`crate::Pipeline::set_levels`]).
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineParams {
    /// Samples per frame (N). The transform runs over 2N.
    pub frame_length: usize,
    pub canvas_width: usize,
    /// Also the number of resampled rows.
    pub canvas_height: usize,
    /// Bins `0..top_bin` are stretched over the canvas height.
    pub top_bin: usize,
    pub levels: LevelSettings,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            frame_length: DEFAULT_FRAME_LENGTH,
            canvas_width: DEFAULT_CANVAS_WIDTH,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
            top_bin: DEFAULT_TOP_BIN,
            levels: LevelSettings::default(),
        }
    }
}

impl PipelineParams {
    pub fn validate(&self) -> Result<()> {
        if self.frame_length < 2 {
            return Err(Error::Configuration(format!(
                "frame length must be at least 2, got {}",
                self.frame_length
            )));
        }
        if self.canvas_width == 0 {
            return Err(Error::Configuration("canvas width must be > 0".into()));
        }
        if self.canvas_height <= 1 {
            return Err(Error::Configuration(format!(
                "canvas height (row count) must be > 1, got {}",
                self.canvas_height
            )));
        }
        if self.top_bin == 0 || self.top_bin > self.frame_length {
            return Err(Error::Configuration(format!(
                "top bin must be within [1, {}], got {}",
                self.frame_length, self.top_bin
            )));
        }
        Ok(())
    }

    /// Seconds of audio visible on the canvas at `sample_rate`.
    pub fn visible_seconds(&self, sample_rate: u32) -> f32 {
        (self.canvas_width * self.frame_length) as f32 / sample_rate as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PipelineParams::default().validate().is_ok());
        let levels = LevelSettings::default();
        assert_eq!(levels.floor_db(), -180.0);
        assert_eq!(levels.ceiling_db(), 80.0);
    }

    #[test]
    fn rejects_inverted_levels() {
        assert!(matches!(
            LevelSettings::new(1.0, 10.0, 10.0),
            Err(Error::Configuration(_))
        ));
        assert!(LevelSettings::new(1.0, 20.0, -20.0).is_err());
        assert!(LevelSettings::new(-1.0, -100.0, 0.0).is_err());
        assert!(LevelSettings::new(f32::NAN, -100.0, 0.0).is_err());
    }

    #[test]
    fn rejects_bad_geometry() {
        let mut params = PipelineParams::default();
        params.canvas_height = 1;
        assert!(params.validate().is_err());

        let mut params = PipelineParams::default();
        params.top_bin = 0;
        assert!(params.validate().is_err());

        let mut params = PipelineParams::default();
        params.top_bin = params.frame_length + 1;
        assert!(params.validate().is_err());

        let mut params = PipelineParams::default();
        params.top_bin = params.frame_length;
        assert!(params.validate().is_ok());
    }

    #[test]
    fn visible_history_at_defaults() {
        let seconds = PipelineParams::default().visible_seconds(44100);
        assert!((seconds - 5.94).abs() < 0.01);
    }
}
