use crate::routines::data::{ObservedSeries, TimeAxis};
use crate::routines::optimization::lm::{least_squares, Bounds, LmOptions};
use crate::structs::rates::RateForm;
use anyhow::Result;
use nalgebra::DVector;

/// Below this many cumulative cases a preliminary fit is unreliable and
/// risks destabilizing the main optimization
const MIN_CUMULATIVE: f64 = 20.0;

/// Empirical λ estimates with magnitude above this are discarded
const LAMBDA_OUTLIER: f64 = 1.0;

/// Empirical κ estimates with magnitude above this are physically
/// implausible death rates
const KAPPA_OUTLIER: f64 = 3.0;

/// Upper-bound saturation thresholds: an exponential-offset λ fit that hit
/// them is degenerate and loses the form selection
const SATURATED_A1: f64 = 0.99;
const SATURATED_A2: f64 = 4.9;

/// Outcome of one preliminary rate fit
///
/// `refined` is false when the fit was skipped (insufficient data) or fell
/// back after a solver failure; in both cases `coeffs` are the caller's
/// unmodified guess for that sub-vector.
#[derive(Debug, Clone)]
pub struct RateFit {
    pub form: RateForm,
    pub coeffs: Vec<f64>,
    pub refined: bool,
}

/// Preliminary fits for λ(t) and κ(t) plus the refined 9-element guess
///
/// The guess is returned as a new vector; the caller's guess is never
/// mutated in place.
#[derive(Debug, Clone)]
pub struct RefinedGuess {
    pub guess: Vec<f64>,
    pub lambda: RateFit,
    pub kappa: RateFit,
}

/// Point-wise empirical rate estimate from finite differences
///
/// The first difference of a cumulative count, divided by the median time
/// step and by the concurrent quarantined count, approximates the rate per
/// currently-quarantined individual. Attributed to the right endpoint of
/// each difference.
pub fn empirical_rate(cumulative: &[f64], quarantined: &[f64], times: &[f64], median_step: f64) -> Vec<(f64, f64)> {
    cumulative
        .windows(2)
        .zip(quarantined.iter().skip(1))
        .zip(times.iter().skip(1))
        .filter(|((_, q), _)| **q > 0.0)
        .map(|((w, q), t)| (*t, (w[1] - w[0]) / median_step / q))
        .collect()
}

/// Drop implausible λ estimates: magnitude above 1, or exactly zero (zero
/// likely reflects insufficient reporting, not a true zero rate)
pub fn filter_lambda(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    points
        .iter()
        .copied()
        .filter(|(_, rate)| rate.abs() <= LAMBDA_OUTLIER && *rate != 0.0)
        .collect()
}

/// Drop implausible κ estimates: magnitude above 3
pub fn filter_kappa(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    points
        .iter()
        .copied()
        .filter(|(_, rate)| rate.abs() <= KAPPA_OUTLIER)
        .collect()
}

/// Refine the initial guess by pre-fitting λ(t) and κ(t)
///
/// Returns a new guess vector with positions 4-6 (λ) and 7-8 (κ) replaced
/// where the sub-fits succeeded, together with the chosen rate forms. The
/// main optimization must never abort because a preliminary heuristic
/// failed, so every failure path falls back to the default forms.
pub fn refine_guess(
    series: &ObservedSeries,
    axis: &TimeAxis,
    guess: &[f64],
) -> RefinedGuess {
    let times = axis.target().as_slice().expect("target is contiguous");
    let quarantined = series.quarantined().as_slice().expect("series is contiguous");
    let median_step = axis.median_step();

    let lambda = match series.recovered() {
        Some(recovered) => fit_lambda(
            recovered.as_slice().expect("series is contiguous"),
            quarantined,
            times,
            median_step,
            &guess[4..7],
        ),
        None => {
            tracing::warn!(
                "No recovered data available; the recovery rate keeps its default logistic form"
            );
            RateFit {
                form: RateForm::Logistic,
                coeffs: guess[4..7].to_vec(),
                refined: false,
            }
        }
    };

    let kappa = fit_kappa(
        series.deceased().as_slice().expect("series is contiguous"),
        quarantined,
        times,
        median_step,
        &guess[7..9],
    );

    let mut refined = guess.to_vec();
    refined[4..7].copy_from_slice(&lambda.coeffs);
    refined[7..9].copy_from_slice(&kappa.coeffs);

    RefinedGuess {
        guess: refined,
        lambda,
        kappa,
    }
}

/// Preliminary fit of the recovery rate λ(t) from recovered counts
///
/// Two candidate forms are tried; the logistic is the long-horizon-stable
/// default punished only when the exponential-offset fit is both strictly
/// better and not saturated at its upper bounds.
pub fn fit_lambda(
    recovered: &[f64],
    quarantined: &[f64],
    times: &[f64],
    median_step: f64,
    guess: &[f64],
) -> RateFit {
    let fallback = RateFit {
        form: RateForm::Logistic,
        coeffs: guess.to_vec(),
        refined: false,
    };

    let peak = recovered.iter().cloned().fold(0.0, f64::max);
    if peak < MIN_CUMULATIVE {
        tracing::info!(
            "Fewer than {} cumulative recovered cases; skipping the preliminary recovery-rate fit",
            MIN_CUMULATIVE
        );
        return fallback;
    }

    let points = filter_lambda(&empirical_rate(recovered, quarantined, times, median_step));
    if points.len() < 4 {
        tracing::warn!(
            "Only {} usable recovery-rate estimates after outlier rejection; keeping the default form",
            points.len()
        );
        return fallback;
    }

    let bounds = Bounds::new(vec![0.0, 0.0, 0.0], vec![1.0, 2.0, 100.0])
        .expect("static bounds are valid");
    let mut start = guess.to_vec();
    bounds.clamp(&mut start);

    let logistic = fit_form(RateForm::Logistic, &points, &start, &bounds);
    let exponential = fit_form(RateForm::ExponentialOffset, &points, &start, &bounds);

    match (logistic, exponential) {
        (Ok(log), Ok(exp)) => {
            let saturated = exp.params[0] >= SATURATED_A1 || exp.params[1] >= SATURATED_A2;
            if exp.residual_norm < log.residual_norm && !saturated {
                RateFit {
                    form: RateForm::ExponentialOffset,
                    coeffs: exp.params,
                    refined: true,
                }
            } else {
                RateFit {
                    form: RateForm::Logistic,
                    coeffs: log.params,
                    refined: true,
                }
            }
        }
        (Ok(log), Err(err)) => {
            tracing::warn!(
                "Exponential-offset recovery-rate fit failed ({}); keeping the logistic fit",
                err
            );
            RateFit {
                form: RateForm::Logistic,
                coeffs: log.params,
                refined: true,
            }
        }
        (Err(err), _) => {
            tracing::warn!(
                "Preliminary recovery-rate fit failed ({}); falling back to the default form",
                err
            );
            fallback
        }
    }
}

/// Preliminary fit of the mortality rate κ(t) from deceased counts
///
/// A single candidate form, exponential decay.
pub fn fit_kappa(
    deceased: &[f64],
    quarantined: &[f64],
    times: &[f64],
    median_step: f64,
    guess: &[f64],
) -> RateFit {
    let fallback = RateFit {
        form: RateForm::ExponentialDecay,
        coeffs: guess.to_vec(),
        refined: false,
    };

    let peak = deceased.iter().cloned().fold(0.0, f64::max);
    if peak < MIN_CUMULATIVE {
        tracing::info!(
            "Fewer than {} cumulative deceased cases; skipping the preliminary mortality-rate fit",
            MIN_CUMULATIVE
        );
        return fallback;
    }

    let points = filter_kappa(&empirical_rate(deceased, quarantined, times, median_step));
    if points.len() < 3 {
        tracing::warn!(
            "Only {} usable mortality-rate estimates after outlier rejection; keeping the default form",
            points.len()
        );
        return fallback;
    }

    let bounds = Bounds::new(vec![0.0, 0.0], vec![2.0, 2.0]).expect("static bounds are valid");
    let mut start = guess.to_vec();
    bounds.clamp(&mut start);

    match fit_form(RateForm::ExponentialDecay, &points, &start, &bounds) {
        Ok(out) => RateFit {
            form: RateForm::ExponentialDecay,
            coeffs: out.params,
            refined: true,
        },
        Err(err) => {
            tracing::warn!(
                "Preliminary mortality-rate fit failed ({}); falling back to the default form",
                err
            );
            fallback
        }
    }
}

/// Bounded least squares of one candidate form against the filtered
/// empirical-rate points
fn fit_form(
    form: RateForm,
    points: &[(f64, f64)],
    start: &[f64],
    bounds: &Bounds,
) -> Result<crate::routines::optimization::lm::LmOutcome> {
    let residual = |coeffs: &[f64]| -> Result<DVector<f64>> {
        Ok(DVector::from_iterator(
            points.len(),
            points.iter().map(|(t, rate)| form.eval(coeffs, *t) - rate),
        ))
    };
    least_squares(residual, start, bounds, &LmOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUESS: [f64; 9] = [0.1, 1.0, 0.2, 0.3, 0.05, 0.1, 10.0, 0.02, 0.05];

    #[test]
    fn outlier_filters_are_idempotent() {
        let points = vec![
            (1.0, 0.5),
            (2.0, 0.0),
            (3.0, 1.5),
            (4.0, -0.2),
            (5.0, 0.8),
        ];
        let once = filter_lambda(&points);
        let twice = filter_lambda(&once);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);

        let kappa_points = vec![(1.0, 2.9), (2.0, 3.1), (3.0, 0.0)];
        let once = filter_kappa(&kappa_points);
        assert_eq!(filter_kappa(&once), once);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn empirical_rate_normalizes_by_quarantined() {
        let cumulative = [0.0, 2.0, 6.0];
        let quarantined = [10.0, 20.0, 40.0];
        let times = [0.0, 1.0, 2.0];
        let points = empirical_rate(&cumulative, &quarantined, &times, 1.0);
        assert_eq!(points, vec![(1.0, 0.1), (2.0, 0.1)]);
    }

    #[test]
    fn below_twenty_cases_keeps_guess_untouched() {
        let recovered: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let quarantined = vec![50.0; 10];
        let times: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let fit = fit_lambda(&recovered, &quarantined, &times, 1.0, &GUESS[4..7]);
        assert_eq!(fit.form, RateForm::Logistic);
        assert!(!fit.refined);
        assert_eq!(fit.coeffs, GUESS[4..7].to_vec());
    }

    #[test]
    fn zero_deaths_skip_kappa_fit() {
        let deceased = vec![0.0; 10];
        let quarantined = vec![50.0; 10];
        let times: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let fit = fit_kappa(&deceased, &quarantined, &times, 1.0, &GUESS[7..9]);
        assert_eq!(fit.form, RateForm::ExponentialDecay);
        assert!(!fit.refined);
        assert_eq!(fit.coeffs, GUESS[7..9].to_vec());
    }

    #[test]
    fn recovers_generating_logistic_parameters() {
        // Build recovered counts whose empirical rate is exactly a known
        // logistic: R_{j+1} = R_j + λ(t_{j+1})·Q_{j+1} with unit steps.
        let truth = [0.06, 0.25, 20.0];
        let times: Vec<f64> = (0..=60).map(|i| i as f64).collect();
        let quarantined: Vec<f64> = times.iter().map(|t| 100.0 + 5.0 * t).collect();
        let mut recovered = vec![0.0];
        for j in 1..times.len() {
            let rate = RateForm::Logistic.eval(&truth, times[j]);
            recovered.push(recovered[j - 1] + rate * quarantined[j]);
        }
        assert!(recovered.last().unwrap() > &MIN_CUMULATIVE);

        let fit = fit_lambda(&recovered, &quarantined, &times, 1.0, &[0.05, 0.1, 10.0]);
        assert!(fit.refined);
        assert_eq!(fit.form, RateForm::Logistic);
        // The fitted curve reproduces the generating rate pointwise
        for t in [5.0, 20.0, 40.0, 60.0] {
            let want = RateForm::Logistic.eval(&truth, t);
            let got = fit.form.eval(&fit.coeffs, t);
            assert!(
                (want - got).abs() < 1e-3,
                "rate mismatch at t={}: {} vs {}",
                t,
                want,
                got
            );
        }
        assert!((fit.coeffs[0] - truth[0]).abs() < 0.01);
    }
}
