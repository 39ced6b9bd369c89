//! Axis ranging and tick spacing shared by the plot series

/// Smallest tick step returned by [`smart_interval`]
pub const MIN_TICK_STEP: f64 = 0.0001;

/// Compute a "nice" tick step for the range `[min, max]`
///
/// The step is about 20% of the range, rounded up at the range's order of
/// magnitude, then shrunk so that it divides the range evenly.
pub fn smart_interval(min: f64, max: f64) -> f64 {
    let range = (max - min).abs();
    if !range.is_finite() || range <= 0.0 {
        return MIN_TICK_STEP;
    }

    let digits = range.log10().ceil() as i32;
    let r = 10f64.powi(-digits) * 10.0;
    let v = (range * r).ceil() / r;
    let mut step = (v * 0.2).max(MIN_TICK_STEP);
    if range % step != 0.0 {
        step = range / (range / step).ceil();
    }

    step
}

/// Compute a display range covering `values`
///
/// - no values: `(0, 1)`
/// - a constant zero series: `(-1, 1)`
/// - a constant series `c`: `c` widened by 10% of `|c|` on each side
/// - otherwise the data range widened by 10% on each side
///
/// Bounds are rounded outward to integers; a range that collapses after
/// rounding is widened by one on each side.
pub fn auto_scale_range<I>(values: I) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
{
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    let mut any = false;
    for v in values.into_iter().filter(|v| v.is_finite()) {
        min = min.min(v);
        max = max.max(v);
        any = true;
    }

    if !any {
        return (0.0, 1.0);
    }

    if fuzzy_eq(min, max) {
        if fuzzy_is_null(min) {
            min = -1.0;
            max = 1.0;
        } else {
            let abs = min.abs();
            min -= abs * 0.1;
            max += abs * 0.1;
        }
    } else {
        let range = max - min;
        min -= range * 0.1;
        max += range * 0.1;
    }

    min = min.floor();
    max = max.ceil();
    if fuzzy_eq(min, max) {
        min -= 1.0;
        max += 1.0;
    }

    (min, max)
}

pub(crate) fn fuzzy_eq(a: f64, b: f64) -> bool {
    (a - b).abs() * 1_000_000_000_000.0 <= a.abs().min(b.abs()).max(f64::MIN_POSITIVE)
        || (a - b).abs() <= f64::EPSILON
}

fn fuzzy_is_null(v: f64) -> bool {
    v.abs() <= 0.000_000_000_001
}
