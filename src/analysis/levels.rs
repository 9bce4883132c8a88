//! Complex bins to pixel intensity: magnitude, decibels, then a clamped
//! linear step between the configured floor and ceiling.

use realfft::num_complex::Complex32;

use super::params::LevelSettings;
use crate::error::{check_len, Result};

/// Pixel intensity of a level at or above the ceiling.
pub const FULL_SCALE: f32 = 255.0;

/// `0` below `min`, `1` above `max`, linear in between.
pub fn linestep(x: f32, min: f32, max: f32) -> f32 {
    if x < min {
        0.0
    } else if x > max {
        1.0
    } else {
        (x - min) / (max - min)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MagnitudeMapper {
    levels: LevelSettings,
}

impl MagnitudeMapper {
    pub fn new(levels: LevelSettings) -> Self {
        Self { levels }
    }

    pub fn levels(&self) -> &LevelSettings {
        &self.levels
    }

    pub fn set_levels(&mut self, levels: LevelSettings) {
        self.levels = levels;
    }

    /// Maps one decibel value to `[0, 255]`. `-inf` and NaN (silent bins)
    /// are treated as the floor.
    pub fn intensity(&self, db: f32) -> f32 {
        let db = if db.is_finite() {
            db
        } else if db == f32::INFINITY {
            self.levels.ceiling_db()
        } else {
            self.levels.floor_db()
        };
        linestep(db, self.levels.floor_db(), self.levels.ceiling_db()) * FULL_SCALE
    }

    /// Fills `out` with one intensity per bin. Bin 0 is always 0.
    pub fn map(&self, spectrum: &[Complex32], out: &mut [f32]) -> Result<()> {
        check_len("magnitude output", out.len(), spectrum.len())?;
        if out.is_empty() {
            return Ok(());
        }
        out[0] = 0.0;
        for (px, bin) in out.iter_mut().zip(spectrum).skip(1) {
            let magnitude = (bin.re * bin.re + bin.im * bin.im).sqrt();
            *px = self.intensity(20.0 * magnitude.log10());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn mapper() -> MagnitudeMapper {
        MagnitudeMapper::new(LevelSettings::default())
    }

    #[test]
    fn floor_and_ceiling_hit_the_extremes() {
        let m = mapper();
        assert_eq!(m.intensity(-180.0), 0.0);
        assert_eq!(m.intensity(80.0), 255.0);
        assert!((m.intensity(-50.0) - 127.5).abs() < 1e-3);
    }

    #[test]
    fn clamps_outside_the_window() {
        let m = mapper();
        assert_eq!(m.intensity(-500.0), 0.0);
        assert_eq!(m.intensity(500.0), 255.0);
    }

    #[test]
    fn non_finite_decibels_become_floor() {
        let m = mapper();
        assert_eq!(m.intensity(f32::NEG_INFINITY), 0.0);
        assert_eq!(m.intensity(f32::NAN), 0.0);
    }

    #[test]
    fn silent_bins_map_to_zero() {
        let m = mapper();
        let spectrum = vec![Complex32::new(0.0, 0.0); 8];
        let mut out = vec![99.0; 8];
        m.map(&spectrum, &mut out).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn dc_bin_is_suppressed() {
        let m = mapper();
        let spectrum = vec![Complex32::new(1e6, 0.0); 4];
        let mut out = vec![0.0; 4];
        m.map(&spectrum, &mut out).unwrap();
        assert_eq!(out[0], 0.0);
        // 120 dB is above the 80 dB ceiling.
        assert_eq!(out[1], 255.0);
    }

    #[test]
    fn magnitude_is_euclidean() {
        let levels = LevelSettings::new(1.0, 0.0, 40.0).unwrap();
        let m = MagnitudeMapper::new(levels);
        // |3 + 4i| = 5 -> 13.98 dB -> 89.1
        let spectrum = vec![Complex32::new(0.0, 0.0), Complex32::new(3.0, 4.0)];
        let mut out = vec![0.0; 2];
        m.map(&spectrum, &mut out).unwrap();
        let expected = 20.0 * 5.0f32.log10() / 40.0 * 255.0;
        assert!((out[1] - expected).abs() < 1e-3);
    }

    #[test]
    fn rejects_mismatched_output() {
        let m = mapper();
        let spectrum = vec![Complex32::new(0.0, 0.0); 4];
        let mut out = vec![0.0; 3];
        assert!(matches!(m.map(&spectrum, &mut out), Err(Error::Precondition(_))));
    }
}
