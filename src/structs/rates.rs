use serde::Deserialize;
use serde_derive::Serialize;

/// Parametric form of a time-varying rate, chosen once during the
/// preliminary fit and held fixed afterwards
///
/// Only the coefficients are re-optimized by the main fit; the form itself
/// is never revisited. Keeping the choice as a tagged variant (rather than
/// an opaque closure) makes it inspectable and serializable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateForm {
    /// `a1 / (1 + exp(-a2 * (t - a3)))`, the long-horizon-stable default
    /// for the recovery rate λ(t)
    Logistic,
    /// `a1 + exp(-a2 * (t + a3))`, the alternative λ(t) candidate
    ExponentialOffset,
    /// `a1 * exp(-a2 * t)`, the single candidate for the mortality rate κ(t)
    ExponentialDecay,
}

impl RateForm {
    /// Number of coefficients the form takes
    pub fn ncoeffs(&self) -> usize {
        match self {
            RateForm::Logistic => 3,
            RateForm::ExponentialOffset => 3,
            RateForm::ExponentialDecay => 2,
        }
    }

    /// Evaluate the form at time `t` (days)
    ///
    /// Coefficients enter through their absolute value, so sign is
    /// irrelevant to the model even if a solver iterate strays.
    pub fn eval(&self, coeffs: &[f64], t: f64) -> f64 {
        match self {
            RateForm::Logistic => {
                let (a1, a2, a3) = (coeffs[0].abs(), coeffs[1].abs(), coeffs[2].abs());
                a1 / (1.0 + (-a2 * (t - a3)).exp())
            }
            RateForm::ExponentialOffset => {
                let (a1, a2, a3) = (coeffs[0].abs(), coeffs[1].abs(), coeffs[2].abs());
                a1 + (-a2 * (t + a3)).exp()
            }
            RateForm::ExponentialDecay => {
                let (a1, a2) = (coeffs[0].abs(), coeffs[1].abs());
                a1 * (-a2 * t).exp()
            }
        }
    }
}

/// A rate form together with its fitted coefficients
///
/// This is the handle returned to the caller for λ(t) and κ(t).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateFunction {
    pub form: RateForm,
    pub coeffs: Vec<f64>,
}

impl RateFunction {
    pub fn new(form: RateForm, coeffs: Vec<f64>) -> Self {
        debug_assert_eq!(form.ncoeffs(), coeffs.len());
        RateFunction { form, coeffs }
    }

    pub fn eval(&self, t: f64) -> f64 {
        self.form.eval(&self.coeffs, t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logistic_midpoint_is_half_amplitude() {
        let f = RateFunction::new(RateForm::Logistic, vec![0.4, 0.3, 12.0]);
        assert!((f.eval(12.0) - 0.2).abs() < 1e-12);
        // Saturates towards a1 for large t
        assert!((f.eval(1e4) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn exponential_decay_at_origin() {
        let f = RateFunction::new(RateForm::ExponentialDecay, vec![0.05, 0.1]);
        assert!((f.eval(0.0) - 0.05).abs() < 1e-12);
        assert!(f.eval(100.0) < 0.05);
    }

    #[test]
    fn eval_ignores_coefficient_sign() {
        let pos = RateForm::ExponentialOffset.eval(&[0.1, 0.2, 5.0], 3.0);
        let neg = RateForm::ExponentialOffset.eval(&[-0.1, -0.2, -5.0], 3.0);
        assert_eq!(pos, neg);
    }
}
