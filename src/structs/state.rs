use crate::error::CoreError;
use anyhow::Result;

pub type T = f64;
/// The 7-dimensional compartment state (S, E, I, Q, R, D, P)
pub type State = nalgebra::SVector<T, 7>;
/// The 7x7 linear transition matrix
pub type Transition = nalgebra::SMatrix<T, 7, 7>;

// Compartment indices within [State]
pub const S: usize = 0;
pub const E: usize = 1;
pub const I: usize = 2;
pub const Q: usize = 3;
pub const R: usize = 4;
pub const D: usize = 5;
pub const P: usize = 6;

/// Relative tolerance for the conservation check
const CONSERVATION_RTOL: f64 = 1e-6;

/// Build the initial compartment state
///
/// Susceptibles absorb whatever population the other compartments leave
/// unaccounted for; the protected compartment starts empty. The
/// conservation law (all seven components sum to `npop`) is enforced
/// immediately and its violation is fatal.
pub fn initial_state(npop: f64, e0: f64, i0: f64, q0: f64, r0: f64, d0: f64) -> Result<State> {
    let s0 = npop - q0 - e0 - i0 - r0 - d0;
    if s0 < 0.0 {
        return Err(CoreError::consistency(format!(
            "initial compartment masses ({}) exceed the total population ({})",
            q0 + e0 + i0 + r0 + d0,
            npop
        ))
        .into());
    }
    let state = State::from_column_slice(&[s0, e0, i0, q0, r0, d0, 0.0]);
    check_conservation(&state, npop)?;
    Ok(state)
}

/// Verify that the compartments sum to the total population, within
/// rounding tolerance
pub fn check_conservation(state: &State, npop: f64) -> Result<()> {
    let total: f64 = state.iter().sum();
    if (total - npop).abs() > CONSERVATION_RTOL * npop.max(1.0) {
        return Err(CoreError::consistency(format!(
            "compartments sum to {} but the total population is {}",
            total, npop
        ))
        .into());
    }
    Ok(())
}
