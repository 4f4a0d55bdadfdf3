// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Random Engine
// Mirrors: DDG4 Geant4Random
// ─────────────────────────────────────────────────────────────────────
//! Seedable random source shared by every action of a run.
//!
//! The engine starts unseeded; the kernel refuses to configure until a
//! seed is set. Draws are reproducible for a given seed.

use std::fmt;
use std::time::SystemTime;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use megat_types::Vec3;

/// Seed and draw count, as reported by `RandomEngine::status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomStatus {
    pub seed: Option<u64>,
    pub draws: u64,
}

impl fmt::Display for RandomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.seed {
            Some(seed) => write!(f, "ChaCha8 engine, seed={seed}, draws={}", self.draws),
            None => write!(f, "ChaCha8 engine, unseeded"),
        }
    }
}

/// Seeded ChaCha8 engine shared by every action of a kernel.
///
/// `Kernel::configure` refuses an unseeded engine; there is no default seed.
pub struct RandomEngine {
    seed: Option<u64>,
    inner: ChaCha8Rng,
    draws: u64,
}

impl Default for RandomEngine {
    fn default() -> Self {
        Self {
            seed: None,
            inner: ChaCha8Rng::seed_from_u64(0),
            draws: 0,
        }
    }
}

impl RandomEngine {
    /// Unseeded engine.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: u64) -> Self {
        let mut engine = Self::new();
        engine.set_seed(seed);
        engine
    }

    /// (Re)seed the engine and reset the draw counter.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = Some(seed);
        self.inner = ChaCha8Rng::seed_from_u64(seed);
        self.draws = 0;
    }

    /// Seed from wall-clock seconds; returns the seed used.
    pub fn seed_from_time(&mut self) -> u64 {
        let seed = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.set_seed(seed);
        seed
    }

    pub fn is_seeded(&self) -> bool {
        self.seed.is_some()
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn status(&self) -> RandomStatus {
        RandomStatus {
            seed: self.seed,
            draws: self.draws,
        }
    }

    /// Uniform in [0, 1).
    pub fn uniform(&mut self) -> f64 {
        self.draws += 1;
        self.inner.gen::<f64>()
    }

    /// Uniform in [lo, hi).
    pub fn uniform_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.uniform()
    }

    /// Normal deviate via Box-Muller.
    pub fn gauss(&mut self, mean: f64, sigma: f64) -> f64 {
        if sigma == 0.0 {
            return mean;
        }
        let u1 = self.uniform().max(1e-300);
        let u2 = self.uniform();
        mean + sigma * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    /// Unit vector with cos(theta) uniform in [cos_min, cos_max] and
    /// phi uniform in [0, 2π).
    pub fn direction(&mut self, cos_min: f64, cos_max: f64) -> Vec3 {
        let cos_theta = self.uniform_range(cos_min, cos_max);
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let phi = self.uniform() * std::f64::consts::TAU;
        Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseeded_by_default() {
        let rng = RandomEngine::new();
        assert!(!rng.is_seeded());
        assert_eq!(rng.status().seed, None);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = RandomEngine::with_seed(987_654_321);
        let mut b = RandomEngine::with_seed(987_654_321);
        for _ in 0..10 {
            assert_eq!(a.uniform(), b.uniform());
        }
    }

    #[test]
    fn test_reseed_resets_stream() {
        let mut rng = RandomEngine::with_seed(7);
        let first = rng.uniform();
        rng.uniform();
        rng.set_seed(7);
        assert_eq!(rng.uniform(), first);
        assert_eq!(rng.status().draws, 1);
    }

    #[test]
    fn test_uniform_range() {
        let mut rng = RandomEngine::with_seed(1);
        for _ in 0..1000 {
            let v = rng.uniform_range(-2.0, 3.0);
            assert!((-2.0..3.0).contains(&v));
        }
    }

    #[test]
    fn test_gauss_zero_sigma_is_mean() {
        let mut rng = RandomEngine::with_seed(1);
        assert_eq!(rng.gauss(4.5, 0.0), 4.5);
        assert_eq!(rng.status().draws, 0);
    }

    #[test]
    fn test_gauss_moments() {
        let mut rng = RandomEngine::with_seed(3);
        let n = 20_000;
        let xs: Vec<f64> = (0..n).map(|_| rng.gauss(10.0, 2.0)).collect();
        let mean = xs.iter().sum::<f64>() / n as f64;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        assert!((mean - 10.0).abs() < 0.1);
        assert!((var.sqrt() - 2.0).abs() < 0.1);
    }

    #[test]
    fn test_direction_is_unit() {
        let mut rng = RandomEngine::with_seed(11);
        for _ in 0..100 {
            let d = rng.direction(-1.0, 1.0);
            assert!((d.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_status_display() {
        let rng = RandomEngine::with_seed(42);
        assert_eq!(rng.status().to_string(), "ChaCha8 engine, seed=42, draws=0");
    }
}
