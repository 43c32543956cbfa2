use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::data::loader::load_dark_frame;
use crate::data::model::{BitDepth, DarkFrame, ProcessedSpectrum, SensorFrame, SpectralAxis};
use crate::error::ProcessError;

use super::filter::{gaussian_smooth, remove_baseline};

// ---------------------------------------------------------------------------
// Stage settings
// ---------------------------------------------------------------------------

/// How raw counts map to light. The TCD1304 output falls as light rises.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Polarity {
    /// Use raw counts unchanged.
    AsIs,
    /// `full_scale - raw`.
    #[default]
    Invert,
    /// Mean of two light-shielded pixels minus raw.
    ReferencePixels { first: usize, second: usize },
}

/// Guard pixels at the start of the readout carry no signal and are
/// overwritten with a nearby valid pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeRepair {
    /// Pixels `0..guard_pixels` are replaced. Zero disables the stage.
    pub guard_pixels: usize,
    pub source: usize,
}

impl Default for EdgeRepair {
    fn default() -> Self {
        EdgeRepair {
            guard_pixels: 4,
            source: 5,
        }
    }
}

/// Odd/even channel offset correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Balance {
    /// Even indices of dark pixels; each is paired with the odd pixel after it.
    pub dark_pairs: Vec<usize>,
}

impl Default for Balance {
    fn default() -> Self {
        Balance {
            dark_pairs: vec![18, 20, 22, 24],
        }
    }
}

/// Every stage of the chain. Stages run in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub polarity: Polarity,
    pub edge_repair: EdgeRepair,
    /// Reverse pixel order after edge repair.
    pub reverse: bool,
    pub balance: Option<Balance>,
    /// Sliding-minimum width in pixels.
    pub baseline_window: Option<usize>,
    /// Gaussian smoothing sigma in pixels.
    pub smoothing_sigma: Option<f64>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            polarity: Polarity::Invert,
            edge_repair: EdgeRepair::default(),
            reverse: false,
            balance: None,
            baseline_window: None,
            smoothing_sigma: None,
        }
    }
}

impl ProcessorConfig {
    /// Settings matching the extended firmware: reference-pixel polarity,
    /// reversed readout, no guard-pixel repair.
    pub fn extended() -> Self {
        ProcessorConfig {
            polarity: Polarity::ReferencePixels {
                first: 10,
                second: 11,
            },
            edge_repair: EdgeRepair {
                guard_pixels: 0,
                ..EdgeRepair::default()
            },
            reverse: true,
            ..ProcessorConfig::default()
        }
    }
}

// ---------------------------------------------------------------------------
// SpectrumProcessor
// ---------------------------------------------------------------------------

/// Turns raw frames into corrected spectra. Holds only read-only state, so
/// the same frame always yields the same spectrum.
#[derive(Debug, Clone)]
pub struct SpectrumProcessor {
    config: ProcessorConfig,
    axis: Arc<SpectralAxis>,
    dark_frame: Option<Arc<DarkFrame>>,
}

impl SpectrumProcessor {
    pub fn new(config: ProcessorConfig, axis: Arc<SpectralAxis>) -> Self {
        SpectrumProcessor {
            config,
            axis,
            dark_frame: None,
        }
    }

    /// Subtract `dark` from every spectrum. A dark frame whose length does
    /// not match the axis is logged and ignored.
    pub fn with_dark_frame(mut self, dark: Arc<DarkFrame>) -> Self {
        if dark.len() == self.axis.len() {
            self.dark_frame = Some(dark);
        } else {
            warn!(
                "Dark frame has {} pixels, spectra have {}; not subtracting",
                dark.len(),
                self.axis.len()
            );
        }
        self
    }

    /// Load and attach a dark frame, carrying on uncorrected if it cannot
    /// be read.
    pub fn with_dark_frame_file(self, path: &Path) -> Self {
        match load_dark_frame(path) {
            Ok(dark) => self.with_dark_frame(Arc::new(dark)),
            Err(e) => {
                warn!("Error loading dark frame {}: {e:#}", path.display());
                self
            }
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn axis(&self) -> &Arc<SpectralAxis> {
        &self.axis
    }

    pub fn dark_frame(&self) -> Option<&DarkFrame> {
        self.dark_frame.as_deref()
    }

    pub fn process(&self, frame: &SensorFrame) -> Result<ProcessedSpectrum, ProcessError> {
        self.process_values(&frame.to_f64(), frame.bit_depth())
    }

    /// Process an already widened (e.g. averaged) frame.
    pub fn process_values(
        &self,
        raw: &[f64],
        bit_depth: BitDepth,
    ) -> Result<ProcessedSpectrum, ProcessError> {
        let intensity = self.correct(raw, bit_depth)?;
        Ok(ProcessedSpectrum::new(intensity, Arc::clone(&self.axis)))
    }

    /// The chain up to, but not including, dark subtraction. Saving this as
    /// the dark frame makes it cancel exactly against the same light level,
    /// whatever baseline and smoothing settings follow.
    pub fn dark_reference(&self, raw: &[f64], bit_depth: BitDepth) -> Result<DarkFrame, ProcessError> {
        Ok(DarkFrame::new(self.front_stages(raw, bit_depth)?))
    }

    /// Run the chain and return bare intensities.
    pub fn correct(&self, raw: &[f64], bit_depth: BitDepth) -> Result<Vec<f64>, ProcessError> {
        let mut y = self.front_stages(raw, bit_depth)?;
        if let Some(dark) = &self.dark_frame {
            for (v, d) in y.iter_mut().zip(dark.values()) {
                *v -= d;
            }
        }
        if let Some(width) = self.config.baseline_window {
            y = remove_baseline(&y, width);
        }
        if let Some(sigma) = self.config.smoothing_sigma {
            y = gaussian_smooth(&y, sigma);
        }
        Ok(y)
    }

    /// Polarity, edge repair, reversal and channel balancing.
    fn front_stages(&self, raw: &[f64], bit_depth: BitDepth) -> Result<Vec<f64>, ProcessError> {
        if raw.len() != self.axis.len() {
            return Err(ProcessError::AxisLength {
                frame: raw.len(),
                axis: self.axis.len(),
            });
        }
        let cfg = &self.config;

        let mut y = normalize_polarity(raw, &cfg.polarity, bit_depth)?;
        repair_edges(&mut y, &cfg.edge_repair);
        if cfg.reverse {
            y.reverse();
        }
        if let Some(balance) = &cfg.balance {
            balance_channels(&mut y, balance);
        }
        Ok(y)
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

fn normalize_polarity(
    raw: &[f64],
    polarity: &Polarity,
    bit_depth: BitDepth,
) -> Result<Vec<f64>, ProcessError> {
    Ok(match *polarity {
        Polarity::AsIs => raw.to_vec(),
        Polarity::Invert => {
            let full_scale = f64::from(bit_depth.full_scale());
            raw.iter().map(|v| full_scale - v).collect()
        }
        Polarity::ReferencePixels { first, second } => {
            let reference = match (raw.get(first), raw.get(second)) {
                (Some(a), Some(b)) => (a + b) / 2.0,
                _ => {
                    return Err(ProcessError::ReferencePixel {
                        index: first.max(second),
                        len: raw.len(),
                    })
                }
            };
            raw.iter().map(|v| reference - v).collect()
        }
    })
}

fn repair_edges(y: &mut [f64], repair: &EdgeRepair) {
    if repair.guard_pixels == 0 {
        return;
    }
    let Some(&value) = y.get(repair.source) else {
        debug!("edge repair source pixel {} out of range", repair.source);
        return;
    };
    let end = repair.guard_pixels.min(y.len());
    y[..end].fill(value);
}

/// Mean even-minus-odd difference over the dark pairs, subtracted from every
/// even-indexed sample.
fn balance_channels(y: &mut [f64], balance: &Balance) {
    let diffs: Vec<f64> = balance
        .dark_pairs
        .iter()
        .filter_map(|&i| Some(y.get(i)? - y.get(i + 1)?))
        .collect();
    if diffs.is_empty() {
        warn!("no usable dark pairs for channel balancing");
        return;
    }
    let offset = diffs.iter().sum::<f64>() / diffs.len() as f64;
    debug!("even/odd channel offset {offset:.3}");
    for v in y.iter_mut().step_by(2) {
        *v -= offset;
    }
}
