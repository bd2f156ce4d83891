//! Test helpers: seeded noise and tracing setup.

#![allow(dead_code)]

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::common::Buffer2;

/// Initialize a tracing subscriber for tests. Safe to call repeatedly.
/// Respects RUST_LOG, defaults to "info".
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Standard normal sample (Box-Muller).
pub fn gaussian(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Add photon noise (Gaussian with variance equal to the flux) plus
/// `read_noise`, reproducibly from `seed`.
pub fn add_photon_noise(image: &mut Buffer2<f32>, read_noise: f32, seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for v in image.iter_mut() {
        let sigma = (v.max(0.0) + read_noise * read_noise).sqrt() as f64;
        *v += (gaussian(&mut rng) * sigma) as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_is_reproducible() {
        let mut a = Buffer2::new_filled(16, 8, 100.0f32);
        let mut b = a.clone();
        add_photon_noise(&mut a, 3.0, 7);
        add_photon_noise(&mut b, 3.0, 7);
        assert_eq!(a, b);
        assert!(a.iter().any(|&v| v != 100.0));
    }

    #[test]
    fn test_gaussian_moments() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let samples: Vec<f64> = (0..20_000).map(|_| gaussian(&mut rng)).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        assert!(mean.abs() < 0.05);
        assert!((var - 1.0).abs() < 0.05);
    }
}
