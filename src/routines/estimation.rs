use crate::error::CoreError;
use crate::routines::data::{ObservedSeries, TimeAxis};
use crate::routines::initialization::rates::refine_guess;
use crate::routines::optimization::lm::{least_squares, Bounds, LmOptions};
use crate::routines::output::FitResult;
use crate::routines::settings::Settings;
use crate::routines::simulation::model::Simulator;
use crate::structs::rates::RateFunction;
use crate::structs::state::{initial_state, State};
use anyhow::Result;
use nalgebra::DVector;

/// Bounded nonlinear least-squares driver for the SEIQRDP model
///
/// Owns the parameter bounds and the observation layout, wraps the
/// simulator as the residual function, and returns the fitted parameters
/// with their diagnostics. Each fit is fully independent; nothing is shared
/// across invocations.
pub struct Estimator<'a> {
    series: &'a ObservedSeries,
    axis: &'a TimeAxis,
    npop: f64,
    e0: f64,
    i0: f64,
    settings: &'a Settings,
}

impl<'a> Estimator<'a> {
    pub fn new(
        series: &'a ObservedSeries,
        axis: &'a TimeAxis,
        npop: f64,
        e0: f64,
        i0: f64,
        settings: &'a Settings,
    ) -> Result<Self> {
        if series.len() != axis.target().len() {
            return Err(CoreError::configuration(format!(
                "observed series has {} samples but the time axis has {}",
                series.len(),
                axis.target().len()
            ))
            .into());
        }
        Ok(Estimator {
            series,
            axis,
            npop,
            e0,
            i0,
            settings,
        })
    }

    /// Bounds on the 9-element parameter vector for the main fit
    fn bounds() -> Bounds {
        let lower = vec![0.0; 9];
        let upper = vec![1.0, 3.0, 1.0, 1.0, 1.0, 5.0, 100.0, 2.0, 2.0];
        Bounds::new(lower, upper).expect("static bounds are valid")
    }

    /// The initial compartment state on the first grid point
    ///
    /// Susceptibles absorb the unaccounted remainder; when recovered data
    /// is absent the recovered compartment starts empty.
    fn initial(&self) -> Result<State> {
        let q0 = self.series.quarantined()[0];
        let r0 = self.series.recovered().map(|r| r[0]).unwrap_or(0.0);
        let d0 = self.series.deceased()[0];
        initial_state(self.npop, self.e0, self.i0, q0, r0, d0)
    }

    /// Run the two-stage fit: preliminary rate fits to refine the guess,
    /// then the bounded least-squares solve with the integrator nested in
    /// the objective
    pub fn fit(&self, guess: &[f64]) -> Result<FitResult> {
        if guess.len() != 9 {
            return Err(CoreError::configuration(format!(
                "initial guess needs 9 parameters, got {}",
                guess.len()
            ))
            .into());
        }

        let y0 = self.initial()?;

        let refined = refine_guess(self.series, self.axis, guess);
        tracing::debug!(
            "Preliminary fits chose {:?} for the recovery rate (refined: {}) and {:?} for the mortality rate (refined: {})",
            refined.lambda.form,
            refined.lambda.refined,
            refined.kappa.form,
            refined.kappa.refined
        );

        let simulator = Simulator::new(self.npop, refined.lambda.form, refined.kappa.form);
        if !self.series.has_recovered() {
            tracing::warn!(
                "Recovered counts unavailable; fitting quarantined+recovered against the quarantined channel"
            );
        }

        let residual = |params: &[f64]| -> Result<DVector<f64>> {
            let r = simulator.residuals(params, &y0, self.axis, self.series);
            Ok(DVector::from_iterator(r.len(), r.into_iter()))
        };

        let opts = LmOptions {
            tol_params: self.settings.fit.tol_params,
            tol_residual: self.settings.fit.tol_residual,
            max_iters: self.settings.fit.max_iters,
        };
        let outcome = least_squares(residual, &refined.guess, &Self::bounds(), &opts)?;

        tracing::info!(
            "Fit finished after {} iterations (converged: {}, residual norm {:.4e})",
            outcome.iterations,
            outcome.converged,
            outcome.residual_norm
        );

        // Bounds keep iterates inside the box, but the model reads
        // parameters through abs() anyway; report them the same way
        let p: Vec<f64> = outcome.params.iter().map(|v| v.abs()).collect();

        Ok(FitResult {
            alpha: p[0],
            beta: p[1],
            gamma: p[2],
            delta: p[3],
            lambda: RateFunction::new(refined.lambda.form, p[4..7].to_vec()),
            kappa: RateFunction::new(refined.kappa.form, p[7..9].to_vec()),
            residuals: outcome.residuals,
            jacobian: outcome.jacobian,
            residual_norm: outcome.residual_norm,
            iterations: outcome.iterations,
            converged: outcome.converged,
            simulator,
            y0,
        })
    }
}
