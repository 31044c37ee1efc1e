use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::{MlErr, Result};

/// Fills `params` with samples of `U(low, high)`.
pub fn uniform<R: Rng + ?Sized>(params: &mut [f32], low: f32, high: f32, rng: &mut R) -> Result<()> {
    let distribution =
        Uniform::new(low, high).map_err(|e| MlErr::InvalidInit(format!("[{low}, {high}): {e}")))?;

    for p in params.iter_mut() {
        *p = distribution.sample(rng);
    }

    Ok(())
}
