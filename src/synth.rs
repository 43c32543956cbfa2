//! Synthetic sensor output for demos and tests, so the chain can run without
//! a board attached.

/// Seeded xoshiro256** generator. The same seed always renders the same frame.
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Normal sample via Box-Muller; read noise on a rendered frame.
    pub fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// One emission line, in raw pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticLine {
    pub center: f64,
    pub sigma: f64,
    pub amplitude: f64,
}

/// Recipe for a raw frame as the sensor would report it: a dark level that
/// drops where light falls, plus read noise.
#[derive(Debug, Clone)]
pub struct FrameRecipe {
    pub pixel_count: usize,
    pub dark_level: f64,
    pub noise: f64,
    /// Leading pixels kept dark, like the shielded pixels on the real sensor.
    pub shielded: usize,
    pub lines: Vec<SyntheticLine>,
}

impl FrameRecipe {
    /// Build the 12-bit samples. Values are clamped to `0..=4095`.
    pub fn render(&self, rng: &mut SimpleRng) -> Vec<u16> {
        (0..self.pixel_count)
            .map(|i| {
                let x = i as f64;
                let light: f64 = if i < self.shielded {
                    0.0
                } else {
                    self.lines
                        .iter()
                        .map(|l| l.amplitude * (-(x - l.center).powi(2) / (2.0 * l.sigma.powi(2))).exp())
                        .sum()
                };
                let v = self.dark_level - light + rng.gauss(0.0, self.noise);
                v.round().clamp(0.0, 4095.0) as u16
            })
            .collect()
    }
}
