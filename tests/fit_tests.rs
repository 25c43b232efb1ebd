use epicore::prelude::*;
use epicore::routines::settings::Settings;

const NPOP: f64 = 10_000.0;
const E0: f64 = 200.0;
const I0: f64 = 100.0;
const TRUTH: [f64; 9] = [0.08, 1.0, 0.2, 0.3, 0.05, 0.1, 15.0, 0.02, 0.05];

/// Generate noise-free observations by running the model itself with the
/// known parameter vector and sampling it on a daily axis.
fn synthetic_series(days: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
    let settings = Settings::default();
    let axis = TimeAxis::from_days((0..days).map(|i| i as f64).collect(), settings.fit.dt).unwrap();
    let y0 = initial_state(NPOP, E0, I0, 50.0, 10.0, 5.0).unwrap();
    let sim = Simulator::new(NPOP, RateForm::Logistic, RateForm::ExponentialDecay);
    let stacked = sim.observables(&TRUTH, &y0, &axis, true);

    let n = days;
    let q = stacked.iter().take(n).cloned().collect();
    let r = stacked.iter().skip(n).take(n).cloned().collect();
    let d = stacked.iter().skip(2 * n).take(n).cloned().collect();
    let t = (0..days).map(|i| i as f64).collect();
    (q, r, d, t)
}

fn perturbed_guess() -> Vec<f64> {
    TRUTH.iter().map(|p| p * 1.15).collect()
}

fn norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

#[test]
fn synthetic_round_trip_recovers_trajectories() {
    let (q, r, d, t) = synthetic_series(30);
    let data_norm = norm(
        &q.iter()
            .chain(r.iter())
            .chain(d.iter())
            .cloned()
            .collect::<Vec<f64>>(),
    );
    let settings = Settings::default();

    let result = fit_days(
        q.clone(),
        Some(r.clone()),
        d.clone(),
        t.clone(),
        NPOP,
        E0,
        I0,
        &perturbed_guess(),
        &settings,
    )
    .unwrap();

    assert!(result.converged, "solver did not report success");
    assert!(
        result.residual_norm < 0.05 * data_norm,
        "residual norm {} exceeds 5% of the data norm {}",
        result.residual_norm,
        data_norm
    );
    assert!(result.alpha >= 0.0 && result.alpha <= 1.0);
    assert!(result.beta >= 0.0 && result.beta <= 3.0);
    assert!(result.gamma >= 0.0 && result.gamma <= 1.0);
    assert!(result.delta >= 0.0 && result.delta <= 1.0);

    // Replaying the fitted parameters reproduces the observations
    let axis = TimeAxis::from_days(t, settings.fit.dt).unwrap();
    let traj = result.simulate_axis(&axis);
    let q_sim: Vec<f64> = (0..30).map(|i| traj.q[i * 10]).collect();
    let err = norm(
        &q_sim
            .iter()
            .zip(q.iter())
            .map(|(a, b)| a - b)
            .collect::<Vec<f64>>(),
    );
    assert!(
        err < 0.05 * norm(&q),
        "replayed quarantined channel deviates by {}",
        err
    );
}

#[test]
fn absent_recovered_runs_in_two_channel_mode() {
    let (q, _, d, t) = synthetic_series(30);
    let n = q.len();
    let settings = Settings::default();

    let result = fit_days(
        q,
        None,
        d,
        t,
        NPOP,
        E0,
        I0,
        &perturbed_guess(),
        &settings,
    )
    .unwrap();

    // Reduced-fidelity mode: two stacked channels, default λ form
    assert_eq!(result.residuals.len(), 2 * n);
    assert_eq!(result.lambda.form, RateForm::Logistic);
    assert!(result.residual_norm.is_finite());
}

#[test]
fn empty_recovered_is_treated_as_absent() {
    let (q, _, d, t) = synthetic_series(20);
    let n = q.len();
    let settings = Settings::default();

    let result = fit_days(
        q,
        Some(vec![]),
        d,
        t,
        NPOP,
        E0,
        I0,
        &perturbed_guess(),
        &settings,
    )
    .unwrap();
    assert_eq!(result.residuals.len(), 2 * n);
}

#[test]
fn zero_deaths_keep_default_mortality_form() {
    let (q, r, _, t) = synthetic_series(30);
    let d = vec![0.0; q.len()];
    let settings = Settings::default();

    let result = fit_days(
        q,
        Some(r),
        d,
        t,
        NPOP,
        E0,
        I0,
        &perturbed_guess(),
        &settings,
    )
    .unwrap();
    assert_eq!(result.kappa.form, RateForm::ExponentialDecay);
    assert!(result.kappa.coeffs.iter().all(|c| *c >= 0.0 && *c <= 2.0));
}

#[test]
fn five_point_scenario_converges_within_bounds() {
    let settings = Settings::default();
    let guess = [0.1, 1.0, 0.2, 0.3, 0.05, 0.1, 2.0, 0.02, 0.05];
    let q = vec![10.0, 15.0, 25.0, 40.0, 60.0];
    let r = vec![0.0, 1.0, 3.0, 8.0, 15.0];
    let d = vec![0.0, 0.0, 1.0, 2.0, 3.0];
    let data_norm = norm(
        &q.iter()
            .chain(r.iter())
            .chain(d.iter())
            .cloned()
            .collect::<Vec<f64>>(),
    );

    let result = fit_days(
        q,
        Some(r),
        d,
        vec![0.0, 1.0, 2.0, 3.0, 4.0],
        1000.0,
        5.0,
        5.0,
        &guess,
        &settings,
    )
    .unwrap();

    assert!(result.converged, "solver did not report success");
    assert!(
        result.residual_norm < 0.05 * data_norm,
        "residual norm {} exceeds 5% of the data norm {}",
        result.residual_norm,
        data_norm
    );
    assert!(result.alpha >= 0.0 && result.alpha <= 1.0);
    assert!(result.beta >= 0.0 && result.beta <= 3.0);
    assert!(result.gamma >= 0.0 && result.gamma <= 1.0);
    assert!(result.delta >= 0.0 && result.delta <= 1.0);
    assert_eq!(result.residuals.len(), 15);
    assert_eq!(result.jacobian.shape(), (15, 9));
}

#[test]
fn overfull_initial_compartments_abort_the_fit() {
    let settings = Settings::default();
    let err = fit_days(
        vec![800.0, 900.0],
        None,
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        1000.0,
        200.0,
        200.0,
        &[0.1, 1.0, 0.2, 0.3, 0.05, 0.1, 2.0, 0.02, 0.05],
        &settings,
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CoreError>().unwrap(),
        CoreError::Consistency(_)
    ));
}

#[test]
fn summary_serializes_to_json() {
    let (q, r, d, t) = synthetic_series(20);
    let settings = Settings::default();
    let result = fit_days(
        q,
        Some(r),
        d,
        t,
        NPOP,
        E0,
        I0,
        &perturbed_guess(),
        &settings,
    )
    .unwrap();

    let json = serde_json::to_string(&result.summary()).unwrap();
    assert!(json.contains("alpha"));
    assert!(json.contains("Logistic") || json.contains("ExponentialOffset"));
}
