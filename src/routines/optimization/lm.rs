use crate::error::CoreError;
use anyhow::Result;
use nalgebra::{DMatrix, DVector};

/// Square root of machine epsilon, the forward-difference step scale
const FD_STEP: f64 = 1.490_116_119_384_765_6e-8;

/// Damping factor ceiling; beyond this the search has stalled
const MU_MAX: f64 = 1e12;

/// Box constraints on the parameter vector
///
/// A component with a zero-width interval is held fixed during the solve.
#[derive(Debug, Clone)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(CoreError::configuration(format!(
                "bound vectors differ in length ({} vs {})",
                lower.len(),
                upper.len()
            ))
            .into());
        }
        if lower.iter().zip(upper.iter()).any(|(l, u)| l > u) {
            return Err(CoreError::configuration("lower bound exceeds upper bound").into());
        }
        Ok(Bounds { lower, upper })
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Whether component `i` has a zero-width interval
    pub fn is_fixed(&self, i: usize) -> bool {
        self.upper[i] <= self.lower[i]
    }

    /// Project a point into the box
    pub fn clamp(&self, x: &mut [f64]) {
        for (i, v) in x.iter_mut().enumerate() {
            *v = v.clamp(self.lower[i], self.upper[i]);
        }
    }

    pub fn contains(&self, x: &[f64]) -> bool {
        x.iter()
            .enumerate()
            .all(|(i, v)| *v >= self.lower[i] && *v <= self.upper[i])
    }
}

/// Stopping criteria for the solver
#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    /// Stop when the accepted step satisfies
    /// `‖h‖ ≤ tol_params · (‖x‖ + tol_params)`
    pub tol_params: f64,
    /// Stop when the relative cost improvement drops below this
    pub tol_residual: f64,
    pub max_iters: usize,
}

impl Default for LmOptions {
    fn default() -> Self {
        LmOptions {
            tol_params: 1e-8,
            tol_residual: 1e-8,
            max_iters: 5000,
        }
    }
}

/// Outcome of a bounded least-squares solve
///
/// Every field is always populated; callers read what they need. The
/// Jacobian is evaluated at the returned parameters, ready for downstream
/// uncertainty or sensitivity analysis.
#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub params: Vec<f64>,
    pub residuals: DVector<f64>,
    pub jacobian: DMatrix<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimize `‖residual(x)‖²` over the box `bounds`, starting from `x0`
///
/// Levenberg-Marquardt with a forward-difference Jacobian and projection of
/// each trial step back into the box. The residual function must be
/// deterministic: the finite-difference Jacobian is only valid when
/// repeated evaluations at nearby points are side-effect-free.
pub fn least_squares<F>(
    mut residual: F,
    x0: &[f64],
    bounds: &Bounds,
    opts: &LmOptions,
) -> Result<LmOutcome>
where
    F: FnMut(&[f64]) -> Result<DVector<f64>>,
{
    if x0.len() != bounds.len() {
        return Err(CoreError::configuration(format!(
            "initial guess has {} components but bounds have {}",
            x0.len(),
            bounds.len()
        ))
        .into());
    }
    let n = x0.len();

    let mut x = x0.to_vec();
    bounds.clamp(&mut x);

    let mut r = residual(&x)?;
    let mut cost = r.norm_squared();
    let mut jac = fd_jacobian(&mut residual, &x, &r, bounds)?;

    let mut mu = 1e-3 * max_diag(&jac);
    let mut nu = 2.0;
    let mut converged = false;
    let mut iterations = 0;

    'outer: for _ in 0..opts.max_iters {
        iterations += 1;

        let jtj = jac.transpose() * &jac;
        let g = jac.transpose() * &r;

        loop {
            // Damped normal equations, with fixed components pinned
            let mut a = jtj.clone();
            for i in 0..n {
                if bounds.is_fixed(i) {
                    a[(i, i)] = 1.0;
                } else {
                    a[(i, i)] += mu * jtj[(i, i)].max(1e-12);
                }
            }

            let h = match a.lu().solve(&(-&g)) {
                Some(h) => h,
                None => {
                    mu *= nu;
                    nu *= 2.0;
                    if mu > MU_MAX {
                        break 'outer;
                    }
                    continue;
                }
            };

            // Project the trial point and measure the realized step
            let mut x_new: Vec<f64> = x.iter().zip(h.iter()).map(|(xi, hi)| xi + hi).collect();
            bounds.clamp(&mut x_new);
            let step: DVector<f64> = DVector::from_iterator(
                n,
                x_new.iter().zip(x.iter()).map(|(a, b)| a - b),
            );
            let x_norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();

            if step.norm() <= opts.tol_params * (x_norm + opts.tol_params) {
                converged = true;
                break 'outer;
            }

            let r_new = residual(&x_new)?;
            let cost_new = r_new.norm_squared();

            if cost_new < cost {
                let actual = cost - cost_new;
                let predicted: f64 = step
                    .iter()
                    .enumerate()
                    .map(|(i, hi)| hi * (mu * jtj[(i, i)].max(1e-12) * hi - g[i]))
                    .sum();
                let rho = actual / predicted.max(f64::MIN_POSITIVE);

                x = x_new;
                r = r_new;
                cost = cost_new;
                mu *= (1.0 - (2.0 * rho - 1.0).powi(3)).max(1.0 / 3.0);
                nu = 2.0;

                if actual <= opts.tol_residual * cost.max(f64::MIN_POSITIVE) {
                    converged = true;
                    break 'outer;
                }

                jac = fd_jacobian(&mut residual, &x, &r, bounds)?;
                break;
            }

            mu *= nu;
            nu *= 2.0;
            if mu > MU_MAX {
                break 'outer;
            }
        }
    }

    // The Jacobian is reported at the solution
    jac = fd_jacobian(&mut residual, &x, &r, bounds)?;

    Ok(LmOutcome {
        params: x,
        residual_norm: cost.sqrt(),
        residuals: r,
        jacobian: jac,
        iterations,
        converged,
    })
}

/// Forward-difference Jacobian, flipping to a backward step at the upper
/// bound so evaluations stay inside the box
fn fd_jacobian<F>(
    residual: &mut F,
    x: &[f64],
    r0: &DVector<f64>,
    bounds: &Bounds,
) -> Result<DMatrix<f64>>
where
    F: FnMut(&[f64]) -> Result<DVector<f64>>,
{
    let m = r0.len();
    let n = x.len();
    let mut jac = DMatrix::zeros(m, n);

    for i in 0..n {
        if bounds.is_fixed(i) {
            continue;
        }
        let h = FD_STEP * x[i].abs().max(1.0);
        let (xi, sign) = if x[i] + h <= bounds.upper()[i] {
            (x[i] + h, 1.0)
        } else {
            (x[i] - h, -1.0)
        };
        let mut xp = x.to_vec();
        xp[i] = xi;
        let rp = residual(&xp)?;
        let col = (rp - r0) * (sign / h);
        jac.set_column(i, &col);
    }

    Ok(jac)
}

fn max_diag(jac: &DMatrix<f64>) -> f64 {
    let jtj = jac.transpose() * jac;
    (0..jtj.nrows())
        .map(|i| jtj[(i, i)])
        .fold(1e-12, f64::max)
}
