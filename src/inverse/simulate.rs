//! Deterministic stand-in for region activity when no genuine estimate can
//! be computed.
use ndarray::Array3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::atlas::N_REGIONS;

/// Seed of the simulation stream.
pub const SIMULATION_SEED: u64 = 42;

/// Amplitude of the simulated activity in A⋅m.
pub const SIMULATION_SCALE: f64 = 1e-9;

/// Standard-normal samples × [`SIMULATION_SCALE`], shape `[68, T, E]`.
/// Identical for identical shapes.
pub fn simulated_region_activity(n_times: usize, n_epochs: usize) -> Array3<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(SIMULATION_SEED);
    Array3::from_shape_simple_fn((N_REGIONS, n_times, n_epochs), || {
        let z: f64 = rng.sample(StandardNormal);
        z * SIMULATION_SCALE
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_identical_across_calls() {
        let a = simulated_region_activity(50, 3);
        let b = simulated_region_activity(50, 3);
        assert_eq!(a.dim(), (N_REGIONS, 50, 3));
        assert!(a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn scale_is_nanoamp_metres() {
        let a = simulated_region_activity(200, 4);
        let rms = (a.iter().map(|v| v * v).sum::<f64>() / a.len() as f64).sqrt();
        assert!(rms > 0.5e-9 && rms < 2e-9, "rms = {rms}");
    }
}
