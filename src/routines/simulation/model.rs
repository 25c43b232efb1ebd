use crate::routines::data::{interp1, ObservedSeries, TimeAxis};
use crate::structs::rates::RateForm;
use crate::structs::state::{State, Transition, D, E, I, P, Q, R, S};
use ndarray::Array1;

/// Recovery rates above this are numerically implausible and usually mark a
/// diverging optimizer iterate
const LAMBDA_WARN: f64 = 10.0;

/// Assemble the instantaneous 7x7 transition matrix
///
/// Rows and columns follow the compartment order (S, E, I, Q, R, D, P).
/// The matrix is a generator: every column sums to zero, so the linear part
/// conserves total mass by construction. The bilinear infection term is not
/// part of it, see [force].
pub fn transition_matrix(alpha: f64, gamma: f64, delta: f64, lambda: f64, kappa: f64) -> Transition {
    let mut a = Transition::zeros();
    a[(S, S)] = -alpha;
    a[(E, E)] = -gamma;
    a[(I, E)] = gamma;
    a[(I, I)] = -delta;
    a[(Q, I)] = delta;
    a[(Q, Q)] = -(kappa + lambda);
    a[(R, Q)] = lambda;
    a[(D, Q)] = kappa;
    a[(P, S)] = alpha;
    a
}

/// The mass-action infection force
///
/// Bilinear in the state (proportional to S·I), so it cannot live inside
/// the linear transition matrix. It only moves mass from S to E.
pub fn force(beta: f64, npop: f64, state: &State) -> State {
    let mut f = State::zeros();
    let infection = beta / npop * state[S] * state[I];
    f[S] = -infection;
    f[E] = infection;
    f
}

/// One classical 4-stage Runge-Kutta step of `dY/dt = A·Y + F`
///
/// A and F are frozen across the step: the constant-rate parameters truly
/// are constant, while λ(t) and κ(t) are approximated as piecewise-constant,
/// so accuracy depends on `dt` being small against their variation.
pub fn rk4_step(y: &State, a: &Transition, f: &State, dt: f64) -> State {
    let k1 = a * y + f;
    let k2 = a * (y + &k1 * (0.5 * dt)) + f;
    let k3 = a * (y + &k2 * (0.5 * dt)) + f;
    let k4 = a * (y + &k3 * dt) + f;
    y + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}

/// Simulated Q, R, D trajectories on the simulation grid
#[derive(Debug, Clone)]
pub struct Trajectories {
    pub q: Vec<f64>,
    pub r: Vec<f64>,
    pub d: Vec<f64>,
}

/// The SEIQRDP model with its rate forms resolved
///
/// This is the body of the optimizer's objective function: given a
/// candidate parameter vector it integrates the compartments across the
/// oversampled grid and reports the observable channels back on the
/// observation axis. Evaluation is pure given its inputs, which the
/// finite-difference Jacobian of the solver relies on.
#[derive(Debug, Clone)]
pub struct Simulator {
    npop: f64,
    lambda_form: RateForm,
    kappa_form: RateForm,
}

impl Simulator {
    pub fn new(npop: f64, lambda_form: RateForm, kappa_form: RateForm) -> Self {
        Simulator {
            npop,
            lambda_form,
            kappa_form,
        }
    }

    pub fn npop(&self) -> f64 {
        self.npop
    }

    pub fn lambda_form(&self) -> RateForm {
        self.lambda_form
    }

    pub fn kappa_form(&self) -> RateForm {
        self.kappa_form
    }

    /// Integrate the compartments across `grid` for the 9-element parameter
    /// vector `[α, β, γ, δ, λ1..λ3, κ1, κ2]`
    ///
    /// Parameters enter through their absolute value. A and the mass-action
    /// force are rebuilt at every step from the current state and the
    /// current λ(tᵢ), κ(tᵢ).
    pub fn run(&self, params: &[f64], y0: &State, grid: &Array1<f64>) -> Trajectories {
        let alpha = params[0].abs();
        let beta = params[1].abs();
        let gamma = params[2].abs();
        let delta = params[3].abs();
        let lambda_coeffs = &params[4..7];
        let kappa_coeffs = &params[7..9];

        let n = grid.len();

        // Rates are evaluated over the whole grid up front; within a step
        // they are held constant
        let lambda: Vec<f64> = grid
            .iter()
            .map(|t| self.lambda_form.eval(lambda_coeffs, *t))
            .collect();
        let kappa: Vec<f64> = grid
            .iter()
            .map(|t| self.kappa_form.eval(kappa_coeffs, *t))
            .collect();
        let peak = lambda.iter().cloned().fold(0.0, f64::max);
        if peak > LAMBDA_WARN {
            tracing::warn!(
                "Recovery rate reached {:.3}, which is numerically implausible; the optimizer iterate is likely diverging",
                peak
            );
        }

        let mut q = Vec::with_capacity(n);
        let mut r = Vec::with_capacity(n);
        let mut d = Vec::with_capacity(n);

        let mut y = *y0;
        for i in 0..n {
            q.push(y[Q]);
            r.push(y[R]);
            d.push(y[D]);
            if i + 1 == n {
                break;
            }

            let dt = grid[i + 1] - grid[i];
            let a = transition_matrix(alpha, gamma, delta, lambda[i], kappa[i]);
            let f = force(beta, self.npop, &y);
            y = rk4_step(&y, &a, &f, dt);
        }

        Trajectories { q, r, d }
    }

    /// Run the model and stack the simulated channels on the observation
    /// axis, residual-ready
    ///
    /// With recovered data the output is `[Q; R; D]`. Without it,
    /// quarantined and recovered are observationally indistinguishable and
    /// are summed into `[Q+R; D]`.
    pub fn observables(
        &self,
        params: &[f64],
        y0: &State,
        axis: &TimeAxis,
        with_recovered: bool,
    ) -> Array1<f64> {
        let grid = axis.grid().as_slice().expect("grid is contiguous");
        let traj = self.run(params, y0, axis.grid());
        let target = axis.target().as_slice().expect("target is contiguous");

        let q = interp1(grid, &traj.q, target);
        let r = interp1(grid, &traj.r, target);
        let d = interp1(grid, &traj.d, target);

        let mut out = Vec::with_capacity(target.len() * 3);
        if with_recovered {
            out.extend(q);
            out.extend(r);
        } else {
            out.extend(q.iter().zip(r.iter()).map(|(qi, ri)| qi + ri));
        }
        out.extend(d);
        Array1::from_vec(out)
    }

    /// Residual against the stacked observed channels
    pub fn residuals(
        &self,
        params: &[f64],
        y0: &State,
        axis: &TimeAxis,
        series: &ObservedSeries,
    ) -> Array1<f64> {
        let observed = series.stacked();
        let simulated = self.observables(params, y0, axis, series.has_recovered());
        simulated - observed
    }
}
