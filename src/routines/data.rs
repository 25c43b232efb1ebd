use crate::error::CoreError;
use anyhow::Result;
use chrono::NaiveDate;
use ndarray::Array1;

/// Observed case-count series: quarantined, recovered (optional), deceased
///
/// All series share the same length and calendar axis. Recovered counts may
/// be absent entirely, in which case the fit runs in a reduced 2-channel
/// mode where quarantined and recovered are observationally
/// indistinguishable.
#[derive(Debug, Clone)]
pub struct ObservedSeries {
    q: Array1<f64>,
    r: Option<Array1<f64>>,
    d: Array1<f64>,
}

impl ObservedSeries {
    /// Build an observed series, clamping negative entries to zero
    ///
    /// Negative counts are data errors, not modeled states; they are
    /// sanitized silently (with a debug trace of how many were touched).
    pub fn new(q: Vec<f64>, r: Option<Vec<f64>>, d: Vec<f64>) -> Result<Self> {
        if q.len() != d.len() {
            return Err(CoreError::configuration(format!(
                "quarantined ({}) and deceased ({}) series differ in length",
                q.len(),
                d.len()
            ))
            .into());
        }
        if let Some(r) = &r {
            if !r.is_empty() && r.len() != q.len() {
                return Err(CoreError::configuration(format!(
                    "recovered series has length {} but quarantined has {}",
                    r.len(),
                    q.len()
                ))
                .into());
            }
        }

        let mut clamped = 0usize;
        let mut sanitize = |series: Vec<f64>| -> Array1<f64> {
            Array1::from_vec(
                series
                    .into_iter()
                    .map(|v| {
                        if v < 0.0 {
                            clamped += 1;
                            0.0
                        } else {
                            v
                        }
                    })
                    .collect(),
            )
        };

        let q = sanitize(q);
        let d = sanitize(d);
        let r = match r {
            Some(r) if !r.is_empty() => Some(sanitize(r)),
            _ => None,
        };
        if clamped > 0 {
            tracing::debug!("Clamped {} negative case counts to zero", clamped);
        }

        Ok(ObservedSeries { q, r, d })
    }

    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    pub fn quarantined(&self) -> &Array1<f64> {
        &self.q
    }

    pub fn recovered(&self) -> Option<&Array1<f64>> {
        self.r.as_ref()
    }

    pub fn deceased(&self) -> &Array1<f64> {
        &self.d
    }

    pub fn has_recovered(&self) -> bool {
        self.r.is_some()
    }

    /// Stack the observed channels the way the residual is built:
    /// `[Q; R; D]` with recovered data, `[Q; D]` without
    pub fn stacked(&self) -> Array1<f64> {
        let mut out = Vec::with_capacity(self.q.len() * 3);
        out.extend(self.q.iter());
        if let Some(r) = &self.r {
            out.extend(r.iter());
        }
        out.extend(self.d.iter());
        Array1::from_vec(out)
    }
}

/// The observation time axis in days since the first sample, plus the
/// oversampled grid the integrator runs on
///
/// Observation times are rounded to the nearest `dt` fraction of a day so
/// that they land exactly on grid points and floating accumulation drift
/// cannot push them off.
#[derive(Debug, Clone)]
pub struct TimeAxis {
    target: Array1<f64>,
    grid: Array1<f64>,
    dt: f64,
}

impl TimeAxis {
    /// Build the axis from calendar dates
    pub fn from_dates(dates: &[NaiveDate], dt: f64) -> Result<Self> {
        if dates.is_empty() {
            return Err(CoreError::configuration("empty time axis").into());
        }
        let first = dates[0];
        let days: Vec<f64> = dates
            .iter()
            .map(|d| (*d - first).num_days() as f64)
            .collect();
        Self::from_days(days, dt)
    }

    /// Build the axis from day offsets (the first entry is rebased to zero)
    pub fn from_days(days: Vec<f64>, dt: f64) -> Result<Self> {
        if !(dt > 0.0) {
            return Err(
                CoreError::configuration(format!("integration step dt = {} is invalid", dt)).into(),
            );
        }
        if days.len() < 2 {
            return Err(CoreError::configuration(format!(
                "time axis needs at least two points, got {}",
                days.len()
            ))
            .into());
        }
        if days.iter().any(|t| !t.is_finite()) {
            return Err(CoreError::configuration("time axis contains non-finite values").into());
        }

        let t0 = days[0];
        let target: Vec<f64> = days.iter().map(|t| ((t - t0) / dt).round() * dt).collect();
        if target.windows(2).any(|w| w[1] <= w[0]) {
            return Err(
                CoreError::configuration("time axis is not strictly increasing").into(),
            );
        }

        let span = *target.last().unwrap();
        let nsteps = (span / dt).round() as usize;
        let grid: Vec<f64> = (0..=nsteps).map(|i| i as f64 * dt).collect();

        Ok(TimeAxis {
            target: Array1::from_vec(target),
            grid: Array1::from_vec(grid),
            dt,
        })
    }

    /// Observation times, in days since the first sample
    pub fn target(&self) -> &Array1<f64> {
        &self.target
    }

    /// The oversampled simulation grid at step `dt`
    pub fn grid(&self) -> &Array1<f64> {
        &self.grid
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Median spacing of the observation times
    pub fn median_step(&self) -> f64 {
        let mut steps: Vec<f64> = self.target.windows(2).into_iter().map(|w| w[1] - w[0]).collect();
        median(&mut steps)
    }
}

/// Median of a mutable slice (sorted in place)
pub fn median(values: &mut [f64]) -> f64 {
    assert!(!values.is_empty());
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Linear interpolation of `(xs, ys)` onto `targets`
///
/// `xs` must be strictly increasing; targets outside the range are clamped
/// to the boundary values.
pub fn interp1(xs: &[f64], ys: &[f64], targets: &[f64]) -> Vec<f64> {
    debug_assert_eq!(xs.len(), ys.len());
    targets
        .iter()
        .map(|&t| {
            if t <= xs[0] {
                return ys[0];
            }
            if t >= xs[xs.len() - 1] {
                return ys[ys.len() - 1];
            }
            let j = xs.partition_point(|&x| x <= t);
            let (x0, x1) = (xs[j - 1], xs[j]);
            let (y0, y1) = (ys[j - 1], ys[j]);
            y0 + (y1 - y0) * (t - x0) / (x1 - x0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn negative_counts_are_clamped() {
        let series =
            ObservedSeries::new(vec![10.0, -1.0, 5.0], None, vec![0.0, 1.0, -2.0]).unwrap();
        assert_eq!(series.quarantined()[1], 0.0);
        assert_eq!(series.deceased()[2], 0.0);
        assert!(!series.has_recovered());
    }

    #[test]
    fn empty_recovered_means_absent() {
        let series = ObservedSeries::new(vec![1.0, 2.0], Some(vec![]), vec![0.0, 0.0]).unwrap();
        assert!(!series.has_recovered());
        assert_eq!(series.stacked().len(), 4);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = ObservedSeries::new(vec![1.0, 2.0], None, vec![0.0]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::CoreError>().unwrap(),
            crate::error::CoreError::Configuration(_)
        ));
    }

    #[test]
    fn axis_from_dates_spans_grid() {
        let dates: Vec<NaiveDate> = (1..=5)
            .map(|day| NaiveDate::from_ymd_opt(2020, 3, day).unwrap())
            .collect();
        let axis = TimeAxis::from_dates(&dates, 0.5).unwrap();
        assert_eq!(axis.target().len(), 5);
        assert_eq!(axis.target()[4], 4.0);
        assert_eq!(axis.grid().len(), 9);
        assert_eq!(axis.grid()[8], 4.0);
        assert_eq!(axis.median_step(), 1.0);
    }

    #[test]
    fn times_are_rounded_to_dt_fractions() {
        let axis = TimeAxis::from_days(vec![0.0, 1.0001, 2.0], 0.1).unwrap();
        assert_eq!(axis.target()[1], 1.0);
    }

    #[test]
    fn non_finite_days_are_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = TimeAxis::from_days(vec![0.0, bad, 2.0], 0.1).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<crate::error::CoreError>().unwrap(),
                crate::error::CoreError::Configuration(_)
            ));
        }
    }

    #[test]
    fn non_monotonic_axis_is_rejected() {
        assert!(TimeAxis::from_days(vec![0.0, 2.0, 1.0], 0.1).is_err());
        // Rounding collisions count as non-monotonic too
        assert!(TimeAxis::from_days(vec![0.0, 0.01, 0.02], 0.1).is_err());
    }

    #[test]
    fn interpolation_matches_straight_line() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [0.0, 2.0, 4.0];
        let out = interp1(&xs, &ys, &[0.5, 1.5, 3.0]);
        assert_eq!(out, vec![1.0, 3.0, 4.0]);
    }
}
