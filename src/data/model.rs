use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::calibration::{wavelength_to_wavenumber, CalibrationModel};

// ---------------------------------------------------------------------------
// BitDepth – sample width reported by the sensor board
// ---------------------------------------------------------------------------

/// ADC resolution of a frame. 12-bit samples travel in a 16-bit container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BitDepth {
    Eight,
    Twelve,
}

impl BitDepth {
    /// Bytes used on the wire for one sample.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            BitDepth::Eight => 1,
            BitDepth::Twelve => 2,
        }
    }

    /// Largest representable sample, `2^bits - 1`.
    pub fn full_scale(self) -> u16 {
        match self {
            BitDepth::Eight => 0x00FF,
            BitDepth::Twelve => 0x0FFF,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Twelve => 12,
        }
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

// ---------------------------------------------------------------------------
// SensorFrame – one raw readout
// ---------------------------------------------------------------------------

/// One complete raw readout, every sample within `[0, full_scale]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorFrame {
    samples: Vec<u16>,
    bit_depth: BitDepth,
}

impl SensorFrame {
    /// Build a frame, masking every sample to the declared bit depth.
    pub fn from_samples(mut samples: Vec<u16>, bit_depth: BitDepth) -> Self {
        let mask = bit_depth.full_scale();
        for s in &mut samples {
            *s &= mask;
        }
        SensorFrame { samples, bit_depth }
    }

    /// The degraded result substituted for a dropped frame.
    pub fn zeroed(len: usize, bit_depth: BitDepth) -> Self {
        SensorFrame {
            samples: vec![0; len],
            bit_depth,
        }
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples widened to `f64` for the processing chain.
    pub fn to_f64(&self) -> Vec<f64> {
        self.samples.iter().map(|&s| f64::from(s)).collect()
    }
}

// ---------------------------------------------------------------------------
// SpectralAxis – precomputed x axes for one frame length
// ---------------------------------------------------------------------------

/// Pixel, wavelength and wavenumber axes, computed once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralAxis {
    /// Pixel index as `f64`.
    pub pixel: Vec<f64>,
    /// Wavelength in nm, absent when uncalibrated.
    pub wavelength: Option<Vec<f64>>,
    /// Raman shift in cm⁻¹, absent when uncalibrated.
    pub wavenumber: Option<Vec<f64>>,
}

impl SpectralAxis {
    /// Bare pixel axis for sessions without a calibration.
    pub fn uncalibrated(len: usize) -> Self {
        SpectralAxis {
            pixel: (0..len).map(|i| i as f64).collect(),
            wavelength: None,
            wavenumber: None,
        }
    }

    /// Axes for `len` pixels through `model`, with the Raman shift taken
    /// relative to `laser_wavenumber` (cm⁻¹).
    pub fn calibrated(len: usize, model: &CalibrationModel, laser_wavenumber: f64) -> Self {
        let pixel: Vec<f64> = (0..len).map(|i| i as f64).collect();
        let wavelength: Vec<f64> = pixel
            .iter()
            .map(|&p| model.pixel_to_wavelength(p))
            .collect();
        let wavenumber = wavelength
            .iter()
            .map(|&wl| wavelength_to_wavenumber(wl, laser_wavenumber))
            .collect();
        SpectralAxis {
            pixel,
            wavelength: Some(wavelength),
            wavenumber: Some(wavenumber),
        }
    }

    pub fn len(&self) -> usize {
        self.pixel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixel.is_empty()
    }
}

// ---------------------------------------------------------------------------
// DarkFrame – baseline captured with the optical path blocked
// ---------------------------------------------------------------------------

/// Per-pixel offsets subtracted from every processed spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct DarkFrame {
    intensity: Vec<f64>,
}

impl DarkFrame {
    pub fn new(intensity: Vec<f64>) -> Self {
        DarkFrame { intensity }
    }

    pub fn values(&self) -> &[f64] {
        &self.intensity
    }

    pub fn len(&self) -> usize {
        self.intensity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensity.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ProcessedSpectrum – calibrated, corrected output
// ---------------------------------------------------------------------------

/// Corrected intensities paired with the session's shared axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedSpectrum {
    intensity: Vec<f64>,
    axis: Arc<SpectralAxis>,
}

impl ProcessedSpectrum {
    /// Pairs intensities with an axis. Callers guarantee equal lengths.
    pub(crate) fn new(intensity: Vec<f64>, axis: Arc<SpectralAxis>) -> Self {
        debug_assert_eq!(intensity.len(), axis.len());
        ProcessedSpectrum { intensity, axis }
    }

    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }

    pub fn axis(&self) -> &SpectralAxis {
        &self.axis
    }

    pub fn len(&self) -> usize {
        self.intensity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensity.is_empty()
    }

    /// Index of the brightest pixel (first one on ties), `None` when empty.
    pub fn argmax(&self) -> Option<usize> {
        crate::processing::peak::argmax(&self.intensity)
    }
}

// ---------------------------------------------------------------------------
// PeakFit – Gaussian fit of the dominant peak
// ---------------------------------------------------------------------------

/// Parameters of `a * exp(-(x - mu)^2 / (2 sigma^2))` plus derived width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakFit {
    pub amplitude: f64,
    pub center: f64,
    pub sigma: f64,
    pub fwhm: f64,
    /// Coefficient of determination of the fit over the fitted window.
    pub r_squared: f64,
}

impl PeakFit {
    /// Value of the fitted Gaussian at `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        self.amplitude * (-(x - self.center).powi(2) / (2.0 * self.sigma.powi(2))).exp()
    }
}
