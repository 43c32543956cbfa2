use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use super::loader::INTENSITY_COLUMN;
use super::model::ProcessedSpectrum;

/// Write `pixel,intensity` rows, the format [`load_dark_frame`] reads back.
///
/// [`load_dark_frame`]: super::loader::load_dark_frame
pub fn write_intensity_csv(path: &Path, intensity: &[f64]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["pixel", INTENSITY_COLUMN])?;
    for (i, v) in intensity.iter().enumerate() {
        writer.write_record([i.to_string(), v.to_string()])?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

/// `pixel,wavelength,wavenumber,intensity`; the axis columns are left empty
/// for an uncalibrated spectrum.
pub fn write_spectrum_csv<W: Write>(out: W, spectrum: &ProcessedSpectrum) -> Result<()> {
    let axis = spectrum.axis();
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["pixel", "wavelength", "wavenumber", INTENSITY_COLUMN])?;

    let cell = |col: &Option<Vec<f64>>, i: usize| {
        col.as_ref()
            .and_then(|c| c.get(i))
            .map(|v| v.to_string())
            .unwrap_or_default()
    };
    for (i, v) in spectrum.intensity().iter().enumerate() {
        writer.write_record([
            i.to_string(),
            cell(&axis.wavelength, i),
            cell(&axis.wavenumber, i),
            v.to_string(),
        ])?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

/// Sample, reference and their ratio, one row per pixel.
pub fn write_transmittance_csv<W: Write>(
    out: W,
    sample: &[f64],
    reference: &[f64],
    transmittance: &[f64],
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["pixel", "sample", "reference", "transmittance"])?;
    for (i, ((s, r), t)) in sample.iter().zip(reference).zip(transmittance).enumerate() {
        writer.write_record([i.to_string(), s.to_string(), r.to_string(), t.to_string()])?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}
