//! Gaussian fit of the dominant peak, for a line-width (FWHM) readout.
//!
//! The fit is a small box-constrained Levenberg–Marquardt over the three
//! parameters of `a * exp(-(x - mu)^2 / (2 sigma^2))`. Steps that leave the
//! box are projected back onto it. Absence of a usable peak is reported as
//! `None`, never as an error.

use std::cmp::Ordering;
use std::ops::Range;

use log::{debug, trace};

use crate::data::model::PeakFit;

/// `2 * sqrt(2 * ln 2)`, FWHM of a Gaussian in units of sigma.
pub const FWHM_PER_SIGMA: f64 = 2.3548;

/// Fits narrower than this (in x units) are treated as noise spikes.
const MIN_FWHM: f64 = 2.0;
const MIN_SIGMA: f64 = 2.0;
const MIN_INITIAL_SIGMA: f64 = 8.0;

const FTOL: f64 = 1e-10;
const XTOL: f64 = 1e-10;
const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e12;

/// Index of the first maximum, `None` for an empty slice.
pub fn argmax(y: &[f64]) -> Option<usize> {
    y.iter()
        .enumerate()
        .min_by(|a, b| b.1.total_cmp(a.1))
        .map(|(i, _)| i)
}

/// Index range of `half_width` samples either side of the maximum, clipped
/// to the slice.
pub fn peak_window(y: &[f64], half_width: usize) -> Option<Range<usize>> {
    let i = argmax(y)?;
    Some(i.saturating_sub(half_width)..(i + half_width).min(y.len()))
}

/// [`PeakFitter::find_fwhm`] with default settings.
pub fn find_fwhm(x: &[f64], y: &[f64]) -> Option<PeakFit> {
    PeakFitter::default().find_fwhm(x, y)
}

// ---------------------------------------------------------------------------
// PeakFitter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakFitter {
    /// Fits explaining less of the window's variance than this are rejected.
    pub min_r_squared: f64,
    pub max_iterations: usize,
}

impl Default for PeakFitter {
    fn default() -> Self {
        Self {
            min_r_squared: 0.8,
            max_iterations: 200,
        }
    }
}

type Params = [f64; 3];

impl PeakFitter {
    pub fn new(min_r_squared: f64) -> Self {
        Self {
            min_r_squared,
            ..Self::default()
        }
    }

    /// Fit a Gaussian to `(x, y)` and return it if it is a credible peak.
    ///
    /// Callers should pass a window of roughly ±8–10 samples around the
    /// maximum; see [`fit_dominant`](Self::fit_dominant).
    pub fn find_fwhm(&self, x: &[f64], y: &[f64]) -> Option<PeakFit> {
        if x.len() != y.len() || x.len() < 3 {
            return None;
        }
        let i_max = argmax(y)?;
        let a0 = y[i_max];
        let x_min = x.iter().cloned().fold(f64::INFINITY, f64::min);
        let x_max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let span = x_max - x_min;
        if a0.partial_cmp(&0.0) != Some(Ordering::Greater) || !span.is_finite() || span < MIN_SIGMA {
            return None;
        }

        let lower = [0.5 * a0, x_min, MIN_SIGMA];
        let upper = [1.5 * a0, x_max, span];
        let start = [a0, x[i_max], MIN_INITIAL_SIGMA.max(span / 10.0)];

        let (p, sse) = self.levenberg_marquardt(x, y, clamp(start, &lower, &upper), &lower, &upper)?;

        let mean = y.iter().sum::<f64>() / y.len() as f64;
        let sst: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
        if sst <= 0.0 {
            return None;
        }
        let r_squared = 1.0 - sse / sst;
        let fwhm = FWHM_PER_SIGMA * p[2].abs();
        debug!(
            "gaussian fit: a={:.2} mu={:.3} sigma={:.3} fwhm={fwhm:.3} r2={r_squared:.4}",
            p[0], p[1], p[2]
        );
        if r_squared < self.min_r_squared || fwhm <= MIN_FWHM {
            return None;
        }
        Some(PeakFit {
            amplitude: p[0],
            center: p[1],
            sigma: p[2].abs(),
            fwhm,
            r_squared,
        })
    }

    /// Window `±half_width` samples around the maximum of `y`, then fit.
    pub fn fit_dominant(&self, x: &[f64], y: &[f64], half_width: usize) -> Option<PeakFit> {
        if x.len() != y.len() {
            return None;
        }
        let window = peak_window(y, half_width)?;
        self.find_fwhm(&x[window.clone()], &y[window])
    }

    /// Returns the converged parameters and their sum of squared residuals,
    /// or `None` when the iteration budget runs out first.
    fn levenberg_marquardt(
        &self,
        x: &[f64],
        y: &[f64],
        mut p: Params,
        lower: &Params,
        upper: &Params,
    ) -> Option<(Params, f64)> {
        let mut cost = sum_squared_residuals(x, y, &p);
        let mut lambda = LAMBDA_INIT;

        for iteration in 0..self.max_iterations {
            let (jtj, jtr) = normal_equations(x, y, &p);
            let mut stepped = false;
            let mut converged = false;

            while lambda < LAMBDA_MAX {
                let mut damped = jtj;
                for (i, row) in damped.iter_mut().enumerate() {
                    row[i] += lambda * jtj[i][i].max(f64::EPSILON);
                }
                if let Some(delta) = solve3(damped, jtr) {
                    let candidate = clamp(
                        [p[0] + delta[0], p[1] + delta[1], p[2] + delta[2]],
                        lower,
                        upper,
                    );
                    let candidate_cost = sum_squared_residuals(x, y, &candidate);
                    if candidate_cost.is_finite() && candidate_cost < cost {
                        let gain = (cost - candidate_cost) / cost;
                        let moved = (0..3)
                            .map(|i| (candidate[i] - p[i]).abs() / (p[i].abs() + XTOL))
                            .fold(0.0, f64::max);
                        p = candidate;
                        cost = candidate_cost;
                        lambda = (lambda * 0.1).max(f64::EPSILON);
                        stepped = true;
                        converged = gain < FTOL || moved < XTOL;
                        break;
                    }
                }
                lambda *= 10.0;
            }

            // No downhill step at any damping: a (constrained) minimum.
            if !stepped || converged {
                trace!("levenberg-marquardt converged after {iteration} iterations");
                return Some((p, cost));
            }
        }
        debug!("levenberg-marquardt did not converge in {} iterations", self.max_iterations);
        None
    }
}

// ---------------------------------------------------------------------------
// Model and linear algebra
// ---------------------------------------------------------------------------

fn gaussian(x: f64, p: &Params) -> f64 {
    p[0] * (-(x - p[1]).powi(2) / (2.0 * p[2].powi(2))).exp()
}

fn sum_squared_residuals(x: &[f64], y: &[f64], p: &Params) -> f64 {
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| (yi - gaussian(xi, p)).powi(2))
        .sum()
}

/// `JᵀJ` and `Jᵀr` for residuals `r = y - f(x; p)`.
fn normal_equations(x: &[f64], y: &[f64], p: &Params) -> ([[f64; 3]; 3], [f64; 3]) {
    let [a, mu, sigma] = *p;
    let s2 = sigma * sigma;
    let mut jtj = [[0.0; 3]; 3];
    let mut jtr = [0.0; 3];
    for (&xi, &yi) in x.iter().zip(y) {
        let d = xi - mu;
        let e = (-d * d / (2.0 * s2)).exp();
        let j = [e, a * e * d / s2, a * e * d * d / (s2 * sigma)];
        let r = yi - a * e;
        for row in 0..3 {
            jtr[row] += j[row] * r;
            for col in 0..3 {
                jtj[row][col] += j[row] * j[col];
            }
        }
    }
    (jtj, jtr)
}

/// Gaussian elimination with partial pivoting. `None` if singular.
fn solve3(mut m: [[f64; 3]; 3], mut b: [f64; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot = (col..3).max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))?;
        if m[pivot][col].abs().partial_cmp(&f64::MIN_POSITIVE) != Some(Ordering::Greater) {
            return None;
        }
        m.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..3 {
            let f = m[row][col] / m[col][col];
            for k in col..3 {
                m[row][k] -= f * m[col][k];
            }
            b[row] -= f * b[col];
        }
    }
    let mut out = [0.0; 3];
    for row in (0..3).rev() {
        let tail: f64 = (row + 1..3).map(|k| m[row][k] * out[k]).sum();
        out[row] = (b[row] - tail) / m[row][row];
    }
    out.iter().all(|v| v.is_finite()).then_some(out)
}

fn clamp(p: Params, lower: &Params, upper: &Params) -> Params {
    [
        p[0].clamp(lower[0], upper[0]),
        p[1].clamp(lower[1], upper[1]),
        p[2].clamp(lower[2], upper[2]),
    ]
}
