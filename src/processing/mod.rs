/// Signal processing on decoded frames.
///
/// ```text
///   SensorFrame
///       │ polarity ─► edge repair ─► reverse ─► balance ─► dark ─► baseline ─► smoothing
///       ▼
///   ProcessedSpectrum ─► peak::PeakFitter ─► PeakFit (centre, FWHM)
/// ```

pub mod filter;
pub mod peak;
pub mod pipeline;

pub use peak::PeakFitter;
pub use pipeline::{ProcessorConfig, SpectrumProcessor};
