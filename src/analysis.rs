use std::cmp::Ordering;

use log::info;
use serde::Serialize;

use crate::data::model::ProcessedSpectrum;
use crate::error::AnalysisError;

/// Added to the reference before dividing.
const EPSILON: f64 = 1e-10;

fn mean(y: &[f64]) -> f64 {
    if y.is_empty() {
        0.0
    } else {
        y.iter().sum::<f64>() / y.len() as f64
    }
}

/// Element-wise `sample / reference`.
///
/// The reference is the brighter of the two; if the caller got them the
/// wrong way round (sample mean above reference mean) they are swapped.
pub fn transmittance(sample: &[f64], reference: &[f64]) -> Result<Vec<f64>, AnalysisError> {
    if sample.len() != reference.len() {
        return Err(AnalysisError::LengthMismatch {
            sample: sample.len(),
            reference: reference.len(),
        });
    }
    let (sample, reference) = if mean(sample) > mean(reference) {
        info!("sample is brighter than reference on average; swapping them");
        (reference, sample)
    } else {
        (sample, reference)
    };
    Ok(sample
        .iter()
        .zip(reference)
        .map(|(s, r)| s / (r + EPSILON))
        .collect())
}

/// Min-max scale to `[0, 1]`. A flat input maps to all zeros.
pub fn normalize(y: &[f64]) -> Vec<f64> {
    let (lo, hi) = min_max(y.iter().copied()).unwrap_or((0.0, 0.0));
    let span = hi - lo;
    if span.partial_cmp(&0.0) != Some(Ordering::Greater) {
        return vec![0.0; y.len()];
    }
    y.iter().map(|v| (v - lo) / span).collect()
}

fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

// ---------------------------------------------------------------------------
// Summary statistics
// ---------------------------------------------------------------------------

/// Intensity and axis ranges of a spectrum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumStats {
    pub pixels: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub wavelength_range: Option<(f64, f64)>,
    pub wavenumber_range: Option<(f64, f64)>,
}

impl SpectrumStats {
    pub fn compute(spectrum: &ProcessedSpectrum) -> Self {
        let y = spectrum.intensity();
        let (min, max) = min_max(y.iter().copied()).unwrap_or((0.0, 0.0));
        let axis = spectrum.axis();
        let range = |col: &Option<Vec<f64>>| {
            col.as_ref().and_then(|c| min_max(c.iter().copied()))
        };
        SpectrumStats {
            pixels: y.len(),
            min,
            max,
            mean: mean(y),
            wavelength_range: range(&axis.wavelength),
            wavenumber_range: range(&axis.wavenumber),
        }
    }
}
