use crate::error::{check_len, Error, Result};

/// Linear interpolation of the low `top_bin` bins onto a fixed number of
/// canvas rows. Row 0 is bin 0, the last row is bin `top_bin - 1`.
#[derive(Debug, Clone, Copy)]
pub struct SpectralResampler {
    rows: usize,
    top_bin: usize,
    bins: usize,
}

impl SpectralResampler {
    pub fn new(rows: usize, top_bin: usize, bins: usize) -> Result<Self> {
        if rows <= 1 {
            return Err(Error::Configuration(format!(
                "resampler needs more than one row, got {}",
                rows
            )));
        }
        if top_bin == 0 || top_bin > bins {
            return Err(Error::Configuration(format!(
                "top bin {} outside [1, {}]",
                top_bin, bins
            )));
        }
        Ok(Self {
            rows,
            top_bin,
            bins,
        })
    }

    pub fn resample(&self, mag: &[f32], out: &mut [f32]) -> Result<()> {
        check_len("magnitude input", mag.len(), self.bins)?;
        check_len("resampled output", out.len(), self.rows)?;

        let last = self.top_bin - 1;
        let step = last as f64 / (self.rows - 1) as f64;
        for (i, px) in out.iter_mut().enumerate() {
            let s = (i as f64 * step).min(last as f64);
            let lo = s.floor() as usize;
            let hi = s.ceil() as usize;
            let frac = (s - lo as f64) as f32;
            *px = mag[lo] + (mag[hi] - mag[lo]) * frac;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_at_equal_lengths() {
        let mag: Vec<f32> = (0..64).map(|i| (i * i) as f32).collect();
        let resampler = SpectralResampler::new(64, 64, 64).unwrap();
        let mut out = vec![0.0; 64];
        resampler.resample(&mag, &mut out).unwrap();
        for (a, b) in out.iter().zip(&mag) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn boundaries_are_exact() {
        let mag: Vec<f32> = (0..512).map(|i| i as f32 * 0.37).collect();
        let resampler = SpectralResampler::new(200, 200, 512).unwrap();
        let mut out = vec![0.0; 200];
        resampler.resample(&mag, &mut out).unwrap();
        assert_eq!(out[0], mag[0]);
        assert_eq!(out[199], mag[199]);
    }

    #[test]
    fn interpolates_between_bins() {
        let mag = vec![0.0, 10.0, 20.0];
        let resampler = SpectralResampler::new(5, 3, 3).unwrap();
        let mut out = vec![0.0; 5];
        resampler.resample(&mag, &mut out).unwrap();
        assert_eq!(out, vec![0.0, 5.0, 10.0, 15.0, 20.0]);
    }

    #[test]
    fn single_bin_fills_every_row() {
        let mag = vec![42.0, 1.0, 2.0];
        let resampler = SpectralResampler::new(4, 1, 3).unwrap();
        let mut out = vec![0.0; 4];
        resampler.resample(&mag, &mut out).unwrap();
        assert!(out.iter().all(|&v| v == 42.0));
    }

    #[test]
    fn rejects_invalid_geometry() {
        assert!(SpectralResampler::new(1, 10, 10).is_err());
        assert!(SpectralResampler::new(10, 0, 10).is_err());
        assert!(SpectralResampler::new(10, 11, 10).is_err());
    }

    #[test]
    fn rejects_wrong_buffer_lengths() {
        let resampler = SpectralResampler::new(4, 4, 8).unwrap();
        let mut out = vec![0.0; 4];
        assert!(resampler.resample(&[0.0; 7], &mut out).is_err());
        let mut short = vec![0.0; 3];
        assert!(resampler.resample(&[0.0; 8], &mut short).is_err());
    }
}
