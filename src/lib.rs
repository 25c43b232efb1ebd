//! epicore: parameter estimation for the generalized SEIR (SEIQRDP)
//! epidemic model.
//!
//! The crate fits the nine free parameters of the SEIQRDP compartmental
//! model (Susceptible, Exposed, Infectious, Quarantined, Recovered,
//! Deceased, Protected) to observed case counts by bounded nonlinear least
//! squares, with a fixed-step RK4 integrator nested inside the objective
//! function. A bootstrapping preliminary fit of the time-varying recovery
//! rate λ(t) and mortality rate κ(t) seeds the main optimization.
//!
//! The entrypoint is [fit] (or [fit_days] for a pre-numeric time axis).

pub mod entrypoints;
pub mod error;
pub mod logger;

pub mod routines {
    pub mod data;
    pub mod estimation;
    pub mod initialization {
        pub mod rates;
    }
    pub mod optimization {
        pub mod lm;
    }
    pub mod output;
    pub mod settings;
    pub mod simulation {
        pub mod model;
    }
}

pub mod structs {
    pub mod rates;
    pub mod state;
}

pub use entrypoints::{fit, fit_days};

pub mod prelude {
    pub use crate::entrypoints::{fit, fit_days};
    pub use crate::error::CoreError;
    pub use crate::routines::data::{ObservedSeries, TimeAxis};
    pub use crate::routines::estimation::Estimator;
    pub use crate::routines::output::{FitResult, FitSummary};
    pub use crate::routines::settings::{read_settings, Settings};
    pub use crate::routines::simulation::model::Simulator;
    pub use crate::structs::rates::{RateForm, RateFunction};
    pub use crate::structs::state::{initial_state, State};
}
