//! Domain evaluation and validation of correction functions.
//!
//! A bound formula is sampled over a fixed global x range (not just the
//! record's validity window, so out-of-validity behavior stays visible) and
//! every sample inside the validity window is checked against the expected
//! physical range.

use crate::domain::{
    BoundKind, CorrectionBounds, CorrectionRecord, EvaluatedSeries, OutOfBoundsWarning,
    ValidityWindow,
};
use crate::expr::{ExprError, Formula};

/// Sample `f` over `domain` and flag out-of-bounds values inside `validity`.
///
/// The first evaluation error aborts the whole series.
pub fn evaluate<F>(
    f: F,
    domain: &[f64],
    validity: ValidityWindow,
    bounds: CorrectionBounds,
) -> Result<EvaluatedSeries, ExprError>
where
    F: Fn(f64) -> Result<f64, ExprError>,
{
    let mut points = Vec::with_capacity(domain.len());
    for &x in domain {
        points.push((x, f(x)?));
    }
    let warnings = flag_out_of_bounds(&points, validity, bounds);
    Ok(EvaluatedSeries { points, warnings })
}

/// Bind a record's parameters to `formula` and evaluate it over `domain`.
pub fn evaluate_record(
    formula: &Formula,
    record: &CorrectionRecord,
    domain: &[f64],
    bounds: CorrectionBounds,
) -> Result<EvaluatedSeries, ExprError> {
    let bound = formula.bind(&record.parameters)?;
    evaluate(|x| bound.eval(x), domain, record.validity, bounds)
}

/// Samples inside `validity` whose value lies outside `bounds`.
pub fn flag_out_of_bounds(
    points: &[(f64, f64)],
    validity: ValidityWindow,
    bounds: CorrectionBounds,
) -> Vec<OutOfBoundsWarning> {
    points
        .iter()
        .filter(|(x, _)| validity.contains(*x))
        .filter_map(|&(x, value)| {
            let bound = if value < bounds.low {
                BoundKind::Low
            } else if value > bounds.high {
                BoundKind::High
            } else {
                return None;
            };
            Some(OutOfBoundsWarning { x, value, bound })
        })
        .collect()
}

/// Correction range inside the validity window plus violation counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSummary {
    pub min: f64,
    pub max: f64,
    pub below: usize,
    pub above: usize,
}

/// Summarize the samples inside `validity`; `None` when the window holds no sample.
pub fn summarize_window(series: &EvaluatedSeries, validity: ValidityWindow) -> Option<WindowSummary> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut any = false;
    for &(x, value) in &series.points {
        if validity.contains(x) {
            any = true;
            min = min.min(value);
            max = max.max(value);
        }
    }
    if !any {
        return None;
    }
    let below = series
        .warnings
        .iter()
        .filter(|w| w.bound == BoundKind::Low)
        .count();
    Some(WindowSummary {
        min,
        max,
        below,
        above: series.warnings.len() - below,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EtaBin, RowLayout, SamplingGrid};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn window(min: f64, max: f64) -> ValidityWindow {
        ValidityWindow { min, max }
    }

    #[test]
    fn grid_spans_fixed_endpoints() {
        let grid = SamplingGrid { start: 5.0, stop: 2000.0, count: 50_000 };
        let xs = grid.points();
        assert_eq!(xs.len(), 50_000);
        assert_eq!(xs[0], 5.0);
        assert_eq!(xs[49_999], 2000.0);
        assert!(xs.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn flags_only_inside_validity_window() {
        let domain: Vec<f64> = (1..=100).map(f64::from).collect();
        // Linear ramp: 0.0 at x=1, 9.9 at x=100.
        let series = evaluate(
            |x| Ok((x - 1.0) / 10.0),
            &domain,
            window(20.0, 60.0),
            CorrectionBounds::default(),
        )
        .unwrap();

        assert_eq!(series.points.len(), 100);
        // x in [52, 60] gives values above 5.0.
        assert_eq!(series.warnings.len(), 9);
        assert!(series.warnings.iter().all(|w| w.bound == BoundKind::High));
        assert!(series.warnings.iter().all(|w| (20.0..=60.0).contains(&w.x)));
    }

    #[test]
    fn low_values_are_flagged_with_their_bound() {
        let domain = [10.0, 20.0, 30.0];
        let series = evaluate(|_| Ok(0.0001), &domain, window(15.0, 25.0), CorrectionBounds::default())
            .unwrap();
        assert_eq!(
            series.warnings,
            vec![OutOfBoundsWarning { x: 20.0, value: 0.0001, bound: BoundKind::Low }]
        );

        let summary = summarize_window(&series, window(15.0, 25.0)).unwrap();
        assert_eq!(summary.below, 1);
        assert_eq!(summary.above, 0);
        assert!(summarize_window(&series, window(100.0, 200.0)).is_none());
    }

    #[test]
    fn evaluation_errors_abort_the_series() {
        let formula = Formula::parse("[0]*log10(x-[1])").unwrap();
        let record = CorrectionRecord {
            line: 1,
            layout: RowLayout::Minimal,
            eta: EtaBin { low: 0.0, high: 1.3 },
            validity: window(10.0, 100.0),
            parameters: vec![1.0, 50.0],
        };
        let domain = [60.0, 55.0, 40.0];
        let err = evaluate_record(&formula, &record, &domain, CorrectionBounds::default()).unwrap_err();
        assert!(matches!(err, ExprError::Domain { func: "log10", .. }));
    }

    #[test]
    fn every_flag_satisfies_the_window_and_bound_property() {
        let formula = Formula::parse("[0]+[1]*log10(x)+[2]*x").unwrap();
        let domain = SamplingGrid { start: 5.0, stop: 2000.0, count: 2000 }.points();
        let mut rng = StdRng::seed_from_u64(3);
        let bounds = CorrectionBounds::default();

        for _ in 0..25 {
            let lo = rng.gen_range(5.0..500.0);
            let hi = lo + rng.gen_range(0.0..1500.0);
            let record = CorrectionRecord {
                line: 1,
                layout: RowLayout::Extended,
                eta: EtaBin { low: -1.0, high: 1.0 },
                validity: window(lo, hi),
                parameters: (0..3).map(|_| rng.gen_range(-3.0..3.0)).collect(),
            };
            let first = evaluate_record(&formula, &record, &domain, bounds).unwrap();
            let second = evaluate_record(&formula, &record, &domain, bounds).unwrap();
            assert_eq!(first.points, second.points);

            for w in &first.warnings {
                assert!(record.validity.contains(w.x));
                assert!(w.value < bounds.low || w.value > bounds.high);
            }
            let expected = first
                .points
                .iter()
                .filter(|(x, v)| record.validity.contains(*x) && (*v < bounds.low || *v > bounds.high))
                .count();
            assert_eq!(first.warnings.len(), expected);
        }
    }
}
