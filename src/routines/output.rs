use crate::routines::data::TimeAxis;
use crate::routines::simulation::model::{Simulator, Trajectories};
use crate::structs::rates::RateFunction;
use crate::structs::state::State;
use anyhow::Result;
use nalgebra::{DMatrix, DVector};
use ndarray::Array1;
use serde::Serialize;

/// Result of a completed fit
///
/// Every field is always populated; callers read what they need. The
/// residuals and Jacobian are taken at the solution and can feed a
/// downstream uncertainty or sensitivity analysis.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Protection rate α
    pub alpha: f64,
    /// Infection rate β
    pub beta: f64,
    /// Inverse latent time γ
    pub gamma: f64,
    /// Quarantine entry rate δ
    pub delta: f64,
    /// Recovery rate λ(t) with its fitted coefficients
    pub lambda: RateFunction,
    /// Mortality rate κ(t) with its fitted coefficients
    pub kappa: RateFunction,
    /// Residual vector at the solution, stacked `[Q; R; D]` (or `[Q+R; D]`
    /// when recovered data was absent)
    pub residuals: DVector<f64>,
    /// Jacobian of the residuals at the solution
    pub jacobian: DMatrix<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
    pub converged: bool,
    /// The model with its resolved rate forms, kept so the fitted
    /// parameters can be replayed
    pub(crate) simulator: Simulator,
    pub(crate) y0: State,
}

impl FitResult {
    /// The fitted 9-element parameter vector `[α, β, γ, δ, λ1..λ3, κ1, κ2]`
    pub fn params(&self) -> Vec<f64> {
        let mut p = vec![self.alpha, self.beta, self.gamma, self.delta];
        p.extend(&self.lambda.coeffs);
        p.extend(&self.kappa.coeffs);
        p
    }

    /// Replay the fitted parameters on an arbitrary simulation grid
    ///
    /// Reuses the same integrator the fit ran on; the grid need not match
    /// the one used during estimation.
    pub fn simulate(&self, grid: &Array1<f64>) -> Trajectories {
        self.simulator.run(&self.params(), &self.y0, grid)
    }

    /// Replay on the fit's own oversampled grid
    pub fn simulate_axis(&self, axis: &TimeAxis) -> Trajectories {
        self.simulate(axis.grid())
    }

    /// Scalar summary of the fit, serializable for persistence
    pub fn summary(&self) -> FitSummary {
        FitSummary {
            alpha: self.alpha,
            beta: self.beta,
            gamma: self.gamma,
            delta: self.delta,
            lambda: self.lambda.clone(),
            kappa: self.kappa.clone(),
            residual_norm: self.residual_norm,
            iterations: self.iterations,
            converged: self.converged,
        }
    }

    /// Write the scalar summary as pretty-printed JSON
    pub fn write_json(&self, path: &str) -> Result<()> {
        let serialized = serde_json::to_string_pretty(&self.summary())?;
        std::fs::write(path, serialized)?;
        Ok(())
    }
}

/// The parameter portion of a [FitResult], without the dense diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct FitSummary {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub lambda: RateFunction,
    pub kappa: RateFunction,
    pub residual_norm: f64,
    pub iterations: usize,
    pub converged: bool,
}
