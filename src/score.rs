//! Similarity between two spectrogram canvases, measured on their
//! grayscale intensity histograms.

use image::RgbImage;

pub const HISTOGRAM_BINS: usize = 256;

/// Penalty per unit of lost correlation. Histograms of two renderings of
/// similar audio correlate at better than 0.9999, so the useful range of
/// `1 - r` is tiny.
pub const SCORE_SCALE: f64 = 300_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    /// Pearson correlation of the normalised histograms, in `[-1, 1]`.
    pub correlation: f64,
    /// Correlation of the base histogram with itself (1 up to rounding).
    pub baseline: f64,
    /// `100 - (baseline - correlation) * SCORE_SCALE`, floored at 0.
    pub score: f64,
}

/// Luma histogram of an RGB image, 256 bins.
pub fn histogram(image: &RgbImage) -> [f64; HISTOGRAM_BINS] {
    let gray = image::imageops::grayscale(image);
    let mut hist = [0.0; HISTOGRAM_BINS];
    for px in gray.pixels() {
        hist[px.0[0] as usize] += 1.0;
    }
    hist
}

/// Rescales to `[0, 1]`. A flat histogram becomes all zeros.
pub fn normalize(hist: &mut [f64]) {
    let min = hist.iter().copied().fold(f64::INFINITY, f64::min);
    let max = hist.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= f64::EPSILON {
        hist.fill(0.0);
        return;
    }
    for v in hist.iter_mut() {
        *v = (*v - min) / range;
    }
}

/// Pearson correlation. When either side has no variance the result is 1
/// for identical inputs and 0 otherwise.
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let mut num = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        num += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom > f64::EPSILON {
        num / denom
    } else if a == b {
        1.0
    } else {
        0.0
    }
}

pub fn compare(base: &RgbImage, input: &RgbImage) -> Similarity {
    let mut h_base = histogram(base);
    let mut h_input = histogram(input);
    normalize(&mut h_base);
    normalize(&mut h_input);

    let correlation = correlation(&h_base, &h_input);
    let baseline = self::correlation(&h_base, &h_base);
    let score = (100.0 - (baseline - correlation) * SCORE_SCALE).max(0.0);
    log::debug!("Histogram correlation r={:.8} (baseline {:.8})", correlation, baseline);

    Similarity {
        correlation,
        baseline,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32, offset: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let v = ((x * 7 + y * 3 + offset) % 256) as u8;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn histogram_counts_every_pixel() {
        let img = gradient(32, 16, 0);
        let hist = histogram(&img);
        assert_eq!(hist.iter().sum::<f64>(), (32 * 16) as f64);
    }

    #[test]
    fn gray_pixels_land_in_their_own_bin() {
        let img = RgbImage::from_pixel(3, 3, Rgb([40, 40, 40]));
        let hist = histogram(&img);
        assert_eq!(hist[40], 9.0);
    }

    #[test]
    fn normalize_spans_unit_range() {
        let mut hist = [2.0, 4.0, 6.0];
        normalize(&mut hist);
        assert_eq!(hist, [0.0, 0.5, 1.0]);

        let mut flat = [3.0; 4];
        normalize(&mut flat);
        assert_eq!(flat, [0.0; 4]);
    }

    #[test]
    fn correlation_extremes() {
        let a = [0.0, 1.0, 2.0, 3.0];
        let b = [3.0, 2.0, 1.0, 0.0];
        assert!((correlation(&a, &a) - 1.0).abs() < 1e-12);
        assert!((correlation(&a, &b) + 1.0).abs() < 1e-12);
        assert_eq!(correlation(&[0.0; 4], &[0.0; 4]), 1.0);
        assert_eq!(correlation(&[0.0; 4], &a), 0.0);
    }

    #[test]
    fn identical_canvases_score_100() {
        let img = gradient(64, 32, 5);
        let sim = compare(&img, &img);
        assert!((sim.score - 100.0).abs() < 1e-6);
        assert!((sim.correlation - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unrelated_canvases_score_zero() {
        let dark = RgbImage::from_fn(16, 16, |x, _| Rgb([(x % 4) as u8, 0, 0]));
        let bright = gradient(16, 16, 0);
        let sim = compare(&dark, &bright);
        assert_eq!(sim.score, 0.0);
        assert!(sim.correlation < 0.9);
    }
}
