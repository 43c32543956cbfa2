//! Pixel → wavelength → Raman shift calibration.
//!
//! Dispersion is modelled as linear across the array: a degree-1 least-squares
//! fit through a handful of known emission lines.

use log::debug;
use serde::Serialize;

use crate::error::CalibrationError;

/// nm → cm⁻¹ conversion factor.
const NM_PER_CM: f64 = 1e7;

/// Wavenumber (cm⁻¹) of a laser line given in nm.
pub fn laser_wavenumber(wavelength_nm: f64) -> f64 {
    NM_PER_CM / wavelength_nm
}

/// Raman shift in cm⁻¹ of light at `wavelength_nm` relative to the laser.
///
/// Stokes lines (longer than the laser) come out positive. Every axis in this
/// crate uses this sign.
pub fn wavelength_to_wavenumber(wavelength_nm: f64, laser_wavenumber: f64) -> f64 {
    laser_wavenumber - NM_PER_CM / wavelength_nm
}

// ---------------------------------------------------------------------------
// CalibrationPoints
// ---------------------------------------------------------------------------

/// Reference `(pixel, wavelength_nm)` pairs, e.g. neon lines.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationPoints {
    points: Vec<(f64, f64)>,
}

impl CalibrationPoints {
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self, CalibrationError> {
        if let Some(&(pixel, wavelength)) = points
            .iter()
            .find(|(p, w)| !p.is_finite() || !w.is_finite())
        {
            return Err(CalibrationError::NonFinite { pixel, wavelength });
        }
        let mut pixels: Vec<f64> = points.iter().map(|&(p, _)| p).collect();
        pixels.sort_by(f64::total_cmp);
        pixels.dedup();
        if pixels.len() < 2 {
            return Err(CalibrationError::InsufficientPoints {
                found: pixels.len(),
            });
        }
        Ok(CalibrationPoints { points })
    }

    /// Move every reference pixel by `delta`, e.g. to realign after the
    /// optics shifted the laser line.
    pub fn shifted(&self, delta: f64) -> Self {
        CalibrationPoints {
            points: self.points.iter().map(|&(p, w)| (p + delta, w)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ---------------------------------------------------------------------------
// CalibrationModel
// ---------------------------------------------------------------------------

/// `wavelength = slope * pixel + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationModel {
    pub slope: f64,
    pub intercept: f64,
}

impl CalibrationModel {
    /// Ordinary least squares of wavelength on pixel.
    pub fn fit(points: &CalibrationPoints) -> Result<Self, CalibrationError> {
        let n = points.len() as f64;
        let mean_p = points.points.iter().map(|&(p, _)| p).sum::<f64>() / n;
        let mean_w = points.points.iter().map(|&(_, w)| w).sum::<f64>() / n;

        let (sxy, sxx) = points
            .points
            .iter()
            .fold((0.0, 0.0), |(sxy, sxx), &(p, w)| {
                let dp = p - mean_p;
                (sxy + dp * (w - mean_w), sxx + dp * dp)
            });

        // Distinct pixels can still collapse once shifted far enough.
        if sxx == 0.0 || !sxx.is_finite() {
            return Err(CalibrationError::InsufficientPoints { found: 1 });
        }

        let slope = sxy / sxx;
        let intercept = mean_w - slope * mean_p;
        debug!(
            "calibration fit over {} points: slope={slope:.6} nm/px intercept={intercept:.4} nm",
            points.len()
        );
        Ok(CalibrationModel { slope, intercept })
    }

    pub fn from_coefficients(slope: f64, intercept: f64) -> Self {
        CalibrationModel { slope, intercept }
    }

    /// Keep the slope, move the intercept so `pixel` lands exactly on
    /// `wavelength`.
    pub fn anchored(self, pixel: f64, wavelength: f64) -> Self {
        let bias = self.pixel_to_wavelength(pixel) - wavelength;
        debug!("anchoring pixel {pixel} to {wavelength} nm (bias {bias:.4} nm)");
        CalibrationModel {
            slope: self.slope,
            intercept: self.intercept - bias,
        }
    }

    pub fn pixel_to_wavelength(&self, pixel: f64) -> f64 {
        self.slope * pixel + self.intercept
    }

    pub fn wavelength_to_wavenumber(&self, wavelength_nm: f64, laser_wavenumber: f64) -> f64 {
        wavelength_to_wavenumber(wavelength_nm, laser_wavenumber)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn two_point_fit() {
        let pts = CalibrationPoints::new(vec![(0.0, 500.0), (100.0, 600.0)]).unwrap();
        let m = CalibrationModel::fit(&pts).unwrap();
        assert!(approx(m.slope, 1.0));
        assert!(approx(m.intercept, 500.0));
        assert!(approx(m.pixel_to_wavelength(50.0), 550.0));
    }

    #[test]
    fn least_squares_through_noisy_points() {
        // y = 0.05x + 580 with symmetric ±0.1 residuals
        let pts = CalibrationPoints::new(vec![
            (0.0, 580.1),
            (1000.0, 629.9),
            (2000.0, 680.1),
            (3000.0, 729.9),
        ])
        .unwrap();
        let m = CalibrationModel::fit(&pts).unwrap();
        assert!((m.slope - 0.04996).abs() < 1e-9);
        assert!((m.pixel_to_wavelength(1500.0) - 655.0).abs() < 0.05);
    }

    #[test]
    fn rejects_too_few_points() {
        assert_eq!(
            CalibrationPoints::new(vec![(10.0, 600.0)]),
            Err(CalibrationError::InsufficientPoints { found: 1 })
        );
        assert_eq!(
            CalibrationPoints::new(vec![(10.0, 600.0), (10.0, 610.0)]),
            Err(CalibrationError::InsufficientPoints { found: 1 })
        );
        assert!(matches!(
            CalibrationPoints::new(vec![(f64::NAN, 600.0), (2.0, 610.0)]),
            Err(CalibrationError::NonFinite { .. })
        ));
    }

    #[test]
    fn anchoring_moves_only_the_intercept() {
        let m = CalibrationModel::from_coefficients(0.05, 587.0);
        let a = m.anchored(9.25, 632.8);
        assert_eq!(a.slope, m.slope);
        assert!(approx(a.pixel_to_wavelength(9.25), 632.8));
    }

    #[test]
    fn shifting_points_shifts_the_fit() {
        let pts = CalibrationPoints::new(vec![(100.0, 600.0), (200.0, 610.0)]).unwrap();
        let m0 = CalibrationModel::fit(&pts).unwrap();
        let m1 = CalibrationModel::fit(&pts.shifted(-50.0)).unwrap();
        assert!(approx(m0.slope, m1.slope));
        assert!(approx(m1.pixel_to_wavelength(50.0), m0.pixel_to_wavelength(100.0)));
    }

    #[test]
    fn stokes_shift_is_positive() {
        let laser = laser_wavenumber(632.8);
        assert!(approx(wavelength_to_wavenumber(632.8, laser), 0.0));
        // 650.8 nm neon line sits ~437 cm⁻¹ to the red of HeNe
        let shift = wavelength_to_wavenumber(650.8, laser);
        assert!((shift - 437.1).abs() < 0.5, "shift = {shift}");
    }
}
