//! Seeded random number generation.
//!
//! All stochastic decisions in a run draw from one `SimRng` in a fixed
//! order, so a seed reproduces a run bit-exactly. Every probabilistic gate
//! consumes its draw whether or not the event fires.

use glam::DVec2;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::constants::EPS;

/// The shared simulation RNG.
pub struct SimRng {
    rng: ChaCha8Rng,
}

impl SimRng {
    /// Create from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Uniform double in [0, 1).
    pub fn dbl(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform 32-bit integer.
    pub fn uint(&mut self) -> u32 {
        self.rng.next_u32()
    }

    /// Standard normal variate (ziggurat).
    pub fn gauss(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }

    /// +1.0 or -1.0 from a single bit of one 32-bit draw.
    pub fn sign(&mut self) -> f64 {
        if self.uint() & 1 == 0 {
            1.0
        } else {
            -1.0
        }
    }

    /// 2D Gaussian displacement with per-component standard deviation
    /// `scale / sqrt(2)`, via the Marsaglia polar method.
    ///
    /// Each rejection round consumes exactly one 32-bit draw: the two
    /// 16-bit halves map to a candidate point in (-1, 1)².
    pub fn polar_2d(&mut self, scale: f64) -> DVec2 {
        loop {
            let bits = self.uint();
            let x = (bits & 0xffff) as f64 / 32768.0 - 1.0;
            let y = (bits >> 16) as f64 / 32768.0 - 1.0;
            let f = x * x + y * y;
            if f > EPS && f < 1.0 {
                let r = scale * (-f.ln() / f).sqrt();
                return DVec2::new(x * r, y * r);
            }
        }
    }
}
