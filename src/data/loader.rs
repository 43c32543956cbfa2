use std::path::Path;

use anyhow::{bail, Context, Result};
use log::debug;

use super::model::DarkFrame;

/// Column holding per-pixel intensities in saved frames.
pub const INTENSITY_COLUMN: &str = "intensity";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a dark frame saved by an earlier session.
///
/// Expected layout (what `DataFrame.to_csv` produces, index column optional):
///
/// ```text
/// ,intensity
/// 0,12.5
/// 1,11.0
/// ...
/// ```
pub fn load_dark_frame(path: &Path) -> Result<DarkFrame> {
    let intensity = load_intensity_csv(path)?;
    debug!(
        "loaded {}-pixel dark frame from {}",
        intensity.len(),
        path.display()
    );
    Ok(DarkFrame::new(intensity))
}

/// Read the `intensity` column of a CSV file, one row per pixel. The header
/// match ignores case; all other columns are ignored.
pub fn load_intensity_csv(path: &Path) -> Result<Vec<f64>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening CSV {}", path.display()))?;
    let headers = reader.headers().context("reading CSV headers")?;

    let idx = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(INTENSITY_COLUMN))
        .with_context(|| format!("CSV missing '{INTENSITY_COLUMN}' column"))?;

    let mut values = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let cell = record.get(idx).unwrap_or("").trim();
        let v = cell
            .parse::<f64>()
            .with_context(|| format!("Row {row_no}: '{cell}' is not a number"))?;
        values.push(v);
    }

    if values.is_empty() {
        bail!("{} has no intensity rows", path.display());
    }
    Ok(values)
}

/// Raw bytes exactly as captured from the serial link.
pub fn load_raw_frame(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading raw frame {}", path.display()))
}
