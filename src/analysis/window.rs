//! Kaiser window, cached per frame length.
//!
//! The window is evaluated through a truncated power series for the
//! modified Bessel function of the first kind, `I0`. Both the factorial
//! table and the coefficients live on the instance so independent
//! pipelines never share mutable state.

use crate::error::{check_len, try_filled, Error, Result};

/// Shape parameter. High sidelobe suppression for wide dynamic range.
pub const KAISER_BETA: f64 = 20.0;

/// Number of series terms used for `I0`.
const BESSEL_TERMS: usize = 24;

/// Factorials computed on demand; the table only ever grows.
#[derive(Debug, Clone)]
struct FactorialTable {
    values: Vec<f64>,
}

impl FactorialTable {
    fn new() -> Self {
        let mut values = Vec::with_capacity(BESSEL_TERMS + 1);
        values.push(1.0);
        Self { values }
    }

    fn get(&mut self, n: usize) -> f64 {
        while self.values.len() <= n {
            let k = self.values.len();
            let next = self.values[k - 1] * k as f64;
            self.values.push(next);
        }
        self.values[n]
    }
}

#[derive(Debug, Clone)]
pub struct KaiserWindow {
    beta: f64,
    factorials: FactorialTable,
    coeffs: Vec<f32>,
}

impl KaiserWindow {
    pub fn new(beta: f64) -> Self {
        Self {
            beta,
            factorials: FactorialTable::new(),
            coeffs: Vec::new(),
        }
    }

    /// `I0(x) ≈ 1 + Σ_{k=1..24} ((x/2)^k / k!)²`
    fn bessel_i0(&mut self, x: f64) -> f64 {
        let half = 0.5 * x;
        let mut sum = 0.0;
        for k in 1..=BESSEL_TERMS {
            let term = half.powi(k as i32) / self.factorials.get(k);
            sum += term * term;
        }
        1.0 + sum
    }

    /// Returns the coefficients for `len`, recomputing only when `len`
    /// differs from the cached length.
    pub fn coefficients(&mut self, len: usize) -> Result<&[f32]> {
        if len == 0 {
            return Err(Error::Precondition("window length must be > 0".into()));
        }
        if self.coeffs.len() != len {
            if !self.coeffs.is_empty() {
                log::debug!(
                    "Kaiser window length changed {} -> {}, recomputing",
                    self.coeffs.len(),
                    len
                );
            }
            self.recompute(len)?;
        }
        Ok(&self.coeffs)
    }

    fn recompute(&mut self, len: usize) -> Result<()> {
        let denom = self.bessel_i0(self.beta);
        if !denom.is_finite() {
            return Err(Error::Numerical(format!(
                "I0({}) evaluated to {}",
                self.beta, denom
            )));
        }

        let mut coeffs = try_filled(len, 0.0f32, "window coefficients")?;
        let n_total = len as f64;
        for (k, c) in coeffs.iter_mut().enumerate() {
            let n = k as f64 + 0.5 - 0.5 * n_total;
            let two_n_on_len = 2.0 * n / n_total;
            let arg = self.beta * (1.0 - two_n_on_len * two_n_on_len).sqrt();
            *c = (self.bessel_i0(arg) / denom) as f32;
        }
        self.coeffs = coeffs;
        Ok(())
    }

    /// Multiplies `input` by the window into `output`. Both slices must
    /// have the same length.
    pub fn apply(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        check_len("window output", output.len(), input.len())?;
        let coeffs = self.coefficients(input.len())?;
        for ((out, &sample), &w) in output.iter_mut().zip(input).zip(coeffs) {
            *out = sample * w;
        }
        Ok(())
    }
}

impl Default for KaiserWindow {
    fn default() -> Self {
        Self::new(KAISER_BETA)
    }
}
