use crate::logger;
use crate::routines::data::{ObservedSeries, TimeAxis};
use crate::routines::estimation::Estimator;
use crate::routines::output::FitResult;
use crate::routines::settings::Settings;
use anyhow::Result;
use chrono::NaiveDate;
use std::time::Instant;

/// Primary entrypoint for epicore
///
/// Estimates the nine SEIQRDP parameters from observed quarantined,
/// recovered (optional) and deceased counts on a calendar axis. The
/// recovered series may be `None` or empty, in which case the fit runs in
/// the reduced 2-channel mode.
///
/// # Arguments
/// - `quarantined`, `recovered`, `deceased`: cumulative daily counts
/// - `dates`: calendar timestamps, one per sample
/// - `npop`: total population
/// - `e0`, `i0`: initial exposed and infectious counts
/// - `guess`: the 9-element initial guess `[α, β, γ, δ, λ1..λ3, κ1, κ2]`
/// - `settings`: solver tolerances, integration step and logging, see
///   [crate::routines::settings]
#[allow(clippy::too_many_arguments)]
pub fn fit(
    quarantined: Vec<f64>,
    recovered: Option<Vec<f64>>,
    deceased: Vec<f64>,
    dates: &[NaiveDate],
    npop: f64,
    e0: f64,
    i0: f64,
    guess: &[f64],
    settings: &Settings,
) -> Result<FitResult> {
    let axis = TimeAxis::from_dates(dates, settings.fit.dt)?;
    fit_on_axis(quarantined, recovered, deceased, axis, npop, e0, i0, guess, settings)
}

/// As [fit], but with the time axis given as day offsets from the first
/// observation instead of calendar dates
#[allow(clippy::too_many_arguments)]
pub fn fit_days(
    quarantined: Vec<f64>,
    recovered: Option<Vec<f64>>,
    deceased: Vec<f64>,
    days: Vec<f64>,
    npop: f64,
    e0: f64,
    i0: f64,
    guess: &[f64],
    settings: &Settings,
) -> Result<FitResult> {
    let axis = TimeAxis::from_days(days, settings.fit.dt)?;
    fit_on_axis(quarantined, recovered, deceased, axis, npop, e0, i0, guess, settings)
}

#[allow(clippy::too_many_arguments)]
fn fit_on_axis(
    quarantined: Vec<f64>,
    recovered: Option<Vec<f64>>,
    deceased: Vec<f64>,
    axis: TimeAxis,
    npop: f64,
    e0: f64,
    i0: f64,
    guess: &[f64],
    settings: &Settings,
) -> Result<FitResult> {
    let now = Instant::now();
    logger::setup_log(settings)?;
    tracing::info!("Starting epicore");

    let series = ObservedSeries::new(quarantined, recovered, deceased)?;
    tracing::info!(
        "Fitting {} samples over {:.1} days (recovered data: {})",
        series.len(),
        axis.target()[axis.target().len() - 1],
        series.has_recovered()
    );

    let estimator = Estimator::new(&series, &axis, npop, e0, i0, settings)?;
    let result = estimator.fit(guess)?;

    tracing::info!("Total time: {:.2?}", now.elapsed());
    Ok(result)
}
