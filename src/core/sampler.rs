use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Standard-normal variates from an injected uniform source via Box-Muller.
///
/// Each transform yields a cosine and a sine variate; the sine half is cached and
/// returned by the following call.
pub struct NormalSampler<R> {
    rng: R,
    cached_normal: Option<f64>,
}

impl<R: Rng> NormalSampler<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            cached_normal: None,
        }
    }

    pub fn sample(&mut self) -> f64 {
        if let Some(z) = self.cached_normal.take() {
            return z;
        }

        let u1 = self.open_unit();
        let u2 = self.rng.random::<f64>();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        let z0 = r * theta.cos();
        let z1 = r * theta.sin();
        self.cached_normal = Some(z1);
        z0
    }

    // Uniform on (0, 1); exact zeros would send ln() to -inf.
    fn open_unit(&mut self) -> f64 {
        loop {
            let u = self.rng.random::<f64>();
            if u > 0.0 {
                return u;
            }
        }
    }
}

/// Generator for one trial, independent of every other trial id under the same base seed.
pub fn trial_rng(base_seed: u64, trial_id: u32) -> StdRng {
    StdRng::seed_from_u64(derive_seed(base_seed, trial_id))
}

pub fn derive_seed(base_seed: u64, trial_id: u32) -> u64 {
    let id = trial_id as u64;
    splitmix64(base_seed ^ ((id << 32) | id))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
