use std::f32::consts::FRAC_2_PI;

const COEF: f32 = 0.044715;

/// Gaussian error linear unit, using the tanh approximation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Gelu;

impl Gelu {
    pub fn f(&self, x: f32) -> f32 {
        0.5 * x * (1. + Self::inner(x).tanh())
    }

    pub fn df(&self, x: f32) -> f32 {
        let t = Self::inner(x).tanh();
        let inner_prime = FRAC_2_PI.sqrt() * (1. + 3. * COEF * x.powi(2));

        0.5 * (1. + t) + 0.5 * x * (1. - t.powi(2)) * inner_prime
    }

    fn inner(x: f32) -> f32 {
        FRAC_2_PI.sqrt() * (x + COEF * x.powi(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gelu_matches_known_values() {
        assert_eq!(Gelu.f(0.), 0.);
        assert!((Gelu.f(1.) - 0.841192).abs() < 1e-4);
        assert!((Gelu.f(-1.) + 0.158808).abs() < 1e-4);
    }

    #[test]
    fn gelu_derivative_matches_finite_differences() {
        let eps = 1e-3;

        for x in [-2.5, -0.7, 0., 0.3, 1.9] {
            let numeric = (Gelu.f(x + eps) - Gelu.f(x - eps)) / (2. * eps);
            assert!((numeric - Gelu.df(x)).abs() < 1e-3, "x = {x}");
        }
    }
}
