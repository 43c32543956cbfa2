use std::cmp::Ordering;
use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Sliding-minimum baseline
// ---------------------------------------------------------------------------

/// Minimum over a centred window of `width` samples (even widths are widened
/// by one). Windows are clipped at the array ends.
///
/// Runs in O(n) with a monotonic deque of candidate indices.
pub fn sliding_minimum(y: &[f64], width: usize) -> Vec<f64> {
    let n = y.len();
    if n == 0 || width <= 1 {
        return y.to_vec();
    }
    let half = width / 2;
    let mut out = Vec::with_capacity(n);
    let mut window: VecDeque<usize> = VecDeque::new();

    for right in 0..n + half {
        if right < n {
            while window.back().is_some_and(|&b| y[b] >= y[right]) {
                window.pop_back();
            }
            window.push_back(right);
        }
        if right < half {
            continue;
        }
        let center = right - half;
        while window.front().is_some_and(|&f| f + half < center) {
            window.pop_front();
        }
        if let Some(&f) = window.front() {
            out.push(y[f]);
        }
    }
    out
}

/// Subtract the local floor and clip at zero. Removes broad fluorescence
/// while leaving peaks narrower than `width` intact.
pub fn remove_baseline(y: &[f64], width: usize) -> Vec<f64> {
    sliding_minimum(y, width)
        .iter()
        .zip(y)
        .map(|(floor, v)| (v - floor).max(0.0))
        .collect()
}

// ---------------------------------------------------------------------------
// Gaussian smoothing
// ---------------------------------------------------------------------------

/// Kernel half-width in units of sigma.
const TRUNCATE: f64 = 4.0;

/// Convolve with a normalised Gaussian of standard deviation `sigma` samples.
///
/// Edges use half-sample symmetric reflection (`d c b a | a b c d | d c b a`).
/// A non-positive or NaN sigma returns the input unchanged.
pub fn gaussian_smooth(y: &[f64], sigma: f64) -> Vec<f64> {
    if y.is_empty() || sigma.partial_cmp(&0.0) != Some(Ordering::Greater) {
        return y.to_vec();
    }
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;
    let n = y.len();

    (0..n as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * y[reflect(i + k as isize - radius, n)])
                .sum()
        })
        .collect()
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (TRUNCATE * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|k| (-0.5 * (k as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

fn reflect(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor_plus_peak() -> (Vec<f64>, f64) {
        let floor = 350.0;
        let height = 1200.0;
        let y = (0..400)
            .map(|i| {
                let x = i as f64;
                floor + height * (-(x - 200.0).powi(2) / (2.0 * 4.0f64.powi(2))).exp()
            })
            .collect();
        (y, height)
    }

    #[test]
    fn sliding_minimum_small_case() {
        let y = [5.0, 3.0, 4.0, 1.0, 6.0, 7.0];
        assert_eq!(sliding_minimum(&y, 3), vec![3.0, 3.0, 1.0, 1.0, 1.0, 6.0]);
        assert_eq!(sliding_minimum(&y, 1), y.to_vec());
    }

    #[test]
    fn sliding_minimum_matches_brute_force() {
        let y: Vec<f64> = (0..97).map(|i| ((i * 37) % 23) as f64).collect();
        for width in [2, 5, 11, 200] {
            let half = width / 2;
            let want: Vec<f64> = (0..y.len())
                .map(|c| {
                    let lo = c.saturating_sub(half);
                    let hi = (c + half).min(y.len() - 1);
                    y[lo..=hi].iter().cloned().fold(f64::INFINITY, f64::min)
                })
                .collect();
            assert_eq!(sliding_minimum(&y, width), want, "width {width}");
        }
    }

    #[test]
    fn baseline_removal_keeps_the_peak() {
        let (y, height) = floor_plus_peak();
        let out = remove_baseline(&y, 101);
        let min = out.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = out.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(min.abs() < 1e-9, "min = {min}");
        assert!((max - height).abs() < 1e-6, "max = {max}");
        assert!(out.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn smoothing_preserves_area_and_flat_signals() {
        let flat = vec![7.0; 50];
        for v in gaussian_smooth(&flat, 3.0) {
            assert!((v - 7.0).abs() < 1e-12);
        }

        let (y, _) = floor_plus_peak();
        let smoothed = gaussian_smooth(&y, 2.0);
        let before: f64 = y.iter().sum();
        let after: f64 = smoothed.iter().sum();
        assert!((before - after).abs() / before < 1e-9);
        // peak gets lower and wider
        assert!(smoothed[200] < y[200]);
        assert!(smoothed[208] > y[208]);
    }

    #[test]
    fn zero_sigma_is_identity() {
        let y = vec![1.0, 9.0, 3.0];
        assert_eq!(gaussian_smooth(&y, 0.0), y);
    }

    #[test]
    fn reflection_indices() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(9, 4), 1);
    }
}
