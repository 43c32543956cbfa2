/// Data layer: frame and spectrum types, CSV in and out.
///
/// Architecture:
/// ```text
///   serial bytes ─► SensorFrame ─► SpectrumProcessor ─► ProcessedSpectrum
///                                        ▲                     │
///   dark_frame.csv ─► loader ─► DarkFrame┘                     ▼
///                                                 export (pixel, wavelength,
///                                                 wavenumber, intensity)
/// ```

pub mod export;
pub mod loader;
pub mod model;
