use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::calibration::{laser_wavenumber, CalibrationModel, CalibrationPoints};
use crate::data::model::SpectralAxis;
use crate::error::{CalibrationError, ConfigError};
use crate::link::command::{AcquisitionConfig, ExtendedTiming};
use crate::processing::peak::PeakFitter;
use crate::processing::pipeline::{ProcessorConfig, SpectrumProcessor};

/// Session settings read from a TOML file. Every table and field is
/// optional; missing values fall back to the bench defaults below.
///
/// ```toml
/// [link]
/// port = "/dev/ttyACM0"
///
/// [acquisition]
/// protocol = "extended"
/// sh_us = 10
/// icg_us = 10000
/// averages = 15
///
/// [processing]
/// dark_frame = "dark_frame.csv"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub link: LinkSettings,
    pub acquisition: AcquisitionSettings,
    pub calibration: CalibrationSettings,
    pub processing: ProcessingSettings,
    pub peak: PeakSettings,
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    pub port: String,
    pub baud_rate: u32,
    /// Overrides the per-protocol read deadline.
    pub timeout_ms: Option<u64>,
}

impl Default for LinkSettings {
    fn default() -> Self {
        LinkSettings {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Simple8,
    Simple12,
    Extended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    pub protocol: Protocol,
    /// Integration byte for the simple protocol (`0xB0..=0xD7`).
    pub integration: u8,
    pub sh_us: u64,
    pub icg_us: u64,
    /// On-board averages, extended protocol only.
    pub averages: u16,
    /// Frames averaged on the host per acquisition.
    pub frames: usize,
    pub pixel_count: Option<usize>,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        AcquisitionSettings {
            protocol: Protocol::Extended,
            integration: 0xD7,
            sh_us: 10,
            icg_us: 10_000,
            averages: 15,
            frames: 1,
            pixel_count: None,
        }
    }
}

/// Pixel→wavelength reference lines plus the alignment applied before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// `(pixel, wavelength_nm)` pairs. Empty leaves the session uncalibrated.
    pub points: Vec<(f64, f64)>,
    pub laser_nm: f64,
    /// Added to every point's pixel before fitting.
    pub shift: f64,
    /// Force the fitted line through this point.
    pub anchor: Option<Anchor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub pixel: f64,
    pub wavelength: f64,
}

/// Neon lines and HeNe laser line as measured on the bench spectrometer.
const BENCH_POINTS: [(f64, f64); 10] = [
    (19.0, 587.6),
    (127.0, 593.4),
    (262.0, 599.7),
    (501.0, 611.6),
    (920.0, 631.6),
    (962.5, 632.8),
    (1358.0, 650.8),
    (1638.0, 662.6),
    (2276.0, 687.7),
    (2439.0, 693.7),
];

/// The laser line lands here once the readout is reversed.
const LASER_PIXEL: f64 = 9.25;
const HENE_NM: f64 = 632.8;

impl Default for CalibrationSettings {
    fn default() -> Self {
        CalibrationSettings {
            points: BENCH_POINTS.to_vec(),
            laser_nm: HENE_NM,
            shift: LASER_PIXEL - BENCH_POINTS[5].0,
            anchor: Some(Anchor {
                pixel: LASER_PIXEL,
                wavelength: HENE_NM,
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    pub dark_frame: Option<PathBuf>,
    /// Stage settings; when absent the protocol's usual chain is used.
    pub stages: Option<ProcessorConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakSettings {
    pub half_window: usize,
    pub min_r_squared: f64,
}

impl Default for PeakSettings {
    fn default() -> Self {
        let fitter = PeakFitter::default();
        PeakSettings {
            half_window: 10,
            min_r_squared: fitter.min_r_squared,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading and building runtime values
// ---------------------------------------------------------------------------

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        info!("Loaded session config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Validated acquisition parameters. Timing errors surface here, before
    /// a port is opened.
    pub fn acquisition_config(&self) -> Result<AcquisitionConfig, ConfigError> {
        let acq = &self.acquisition;
        let mut config = match acq.protocol {
            Protocol::Simple8 => AcquisitionConfig::simple_8bit(acq.integration),
            Protocol::Simple12 => AcquisitionConfig::simple_12bit(acq.integration),
            Protocol::Extended => AcquisitionConfig::extended(ExtendedTiming::from_micros(
                acq.sh_us,
                acq.icg_us,
                acq.averages,
            )?),
        };
        if let Some(n) = acq.pixel_count {
            config = config.with_pixel_count(n)?;
        }
        if let Some(ms) = self.link.timeout_ms {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        debug!("acquisition config: {config:?}");
        Ok(config)
    }

    /// `None` when no calibration points are configured.
    pub fn calibration_model(&self) -> Result<Option<CalibrationModel>, CalibrationError> {
        let cal = &self.calibration;
        if cal.points.is_empty() {
            return Ok(None);
        }
        let points = CalibrationPoints::new(cal.points.clone())?.shifted(cal.shift);
        let mut model = CalibrationModel::fit(&points)?;
        if let Some(anchor) = cal.anchor {
            model = model.anchored(anchor.pixel, anchor.wavelength);
        }
        Ok(Some(model))
    }

    pub fn spectral_axis(&self, len: usize) -> Result<SpectralAxis, CalibrationError> {
        Ok(match self.calibration_model()? {
            Some(model) => {
                SpectralAxis::calibrated(len, &model, laser_wavenumber(self.calibration.laser_nm))
            }
            None => SpectralAxis::uncalibrated(len),
        })
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        match (&self.processing.stages, self.acquisition.protocol) {
            (Some(stages), _) => stages.clone(),
            (None, Protocol::Extended) => ProcessorConfig::extended(),
            (None, _) => ProcessorConfig::default(),
        }
    }

    /// Processor for `len`-pixel frames with the configured dark frame, if
    /// one is set and usable.
    pub fn build_processor(&self, len: usize) -> Result<SpectrumProcessor> {
        let axis = self
            .spectral_axis(len)
            .context("building calibration from config")?;
        let processor = SpectrumProcessor::new(self.processor_config(), Arc::new(axis));
        Ok(match &self.processing.dark_frame {
            Some(path) => processor.with_dark_frame_file(path),
            None => processor,
        })
    }

    pub fn peak_fitter(&self) -> PeakFitter {
        PeakFitter::new(self.peak.min_r_squared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::command::{Command, EXTENDED_PIXEL_COUNT, SIMPLE_PIXEL_COUNT};
    use crate::processing::pipeline::Polarity;
    use std::io::Write;

    #[test]
    fn empty_file_gives_bench_defaults() {
        let cfg = SessionConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, SessionConfig::default());

        let acq = cfg.acquisition_config().unwrap();
        assert_eq!(acq.pixel_count(), EXTENDED_PIXEL_COUNT);
        assert_eq!(acq.expected_bytes(), 7388);
        match acq.command() {
            Command::Extended(t) => {
                assert_eq!(t.sh_period(), 20);
                assert_eq!(t.icg_period(), 20_000);
                assert_eq!(t.averages(), 15);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cfg.processor_config(), ProcessorConfig::extended());
    }

    #[test]
    fn bench_calibration_puts_laser_at_anchor() {
        let cfg = SessionConfig::default();
        let model = cfg.calibration_model().unwrap().unwrap();
        assert!((model.pixel_to_wavelength(LASER_PIXEL) - HENE_NM).abs() < 1e-9);
        assert!(model.slope > 0.04 && model.slope < 0.05, "slope {}", model.slope);

        let axis = cfg.spectral_axis(100).unwrap();
        let wn = axis.wavenumber.unwrap();
        // Raman shift is zero at the laser line and grows to the red.
        assert!(wn[9].abs() < 2.0);
        assert!(wn[99] > wn[9]);
    }

    #[test]
    fn simple_protocol_from_toml() {
        let cfg = SessionConfig::from_toml_str(
            r#"
            [link]
            port = "/dev/ttyUSB0"
            baud_rate = 921600
            timeout_ms = 250

            [acquisition]
            protocol = "simple12"
            integration = 0xB4

            [calibration]
            points = []
            "#,
        )
        .unwrap();
        assert_eq!(cfg.link.baud_rate, 921_600);
        let acq = cfg.acquisition_config().unwrap();
        assert_eq!(acq.command(), &Command::Read12 { integration: 0xB4 });
        assert_eq!(acq.pixel_count(), SIMPLE_PIXEL_COUNT);
        assert_eq!(acq.timeout(), Duration::from_millis(250));
        assert_eq!(cfg.calibration_model().unwrap(), None);
        assert_eq!(cfg.processor_config(), ProcessorConfig::default());
    }

    #[test]
    fn explicit_stages_override_protocol_defaults() {
        let cfg = SessionConfig::from_toml_str(
            r#"
            [processing.stages]
            reverse = false
            baseline_window = 151
            smoothing_sigma = 6.0

            [processing.stages.polarity]
            mode = "as_is"
            "#,
        )
        .unwrap();
        let stages = cfg.processor_config();
        assert_eq!(stages.polarity, Polarity::AsIs);
        assert_eq!(stages.baseline_window, Some(151));
        assert_eq!(stages.smoothing_sigma, Some(6.0));
        assert!(!stages.reverse);
    }

    #[test]
    fn timing_violation_is_reported() {
        let cfg = SessionConfig::from_toml_str(
            r#"
            [acquisition]
            sh_us = 15
            icg_us = 10000
            "#,
        )
        .unwrap();
        assert!(matches!(
            cfg.acquisition_config(),
            Err(ConfigError::TimingNotDivisible { .. })
        ));
    }

    #[test]
    fn unknown_protocol_is_a_parse_error() {
        let err = SessionConfig::from_toml_str("[acquisition]\nprotocol = \"fast\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn load_reads_from_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[peak]\nhalf_window = 8\nmin_r_squared = 0.9").unwrap();
        let cfg = SessionConfig::load(f.path()).unwrap();
        assert_eq!(cfg.peak.half_window, 8);
        assert_eq!(cfg.peak_fitter().min_r_squared, 0.9);
    }

    #[test]
    fn build_processor_survives_missing_dark_frame() {
        let mut cfg = SessionConfig::default();
        cfg.processing.dark_frame = Some(PathBuf::from("/nonexistent/dark_frame.csv"));
        let processor = cfg.build_processor(64).unwrap();
        assert!(processor.dark_frame().is_none());
        assert_eq!(processor.axis().len(), 64);
    }
}
