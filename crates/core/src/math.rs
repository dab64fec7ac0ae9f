//! Safe arithmetic shared by the valuation and analytics code.
//!
//! Every ratio in the crate goes through these helpers so that a zero
//! denominator, an overflow in `powf`, or a NaN input collapses to a
//! sentinel instead of leaking `NaN`/`Infinity` into serialized output.

/// Replace `NaN` and `±Infinity` with `0.0`.
#[inline]
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// `numerator / denominator`, or `0.0` when the denominator is zero,
/// non-finite, or the quotient is not finite.
#[inline]
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    finite_or_zero(numerator / denominator)
}

/// `part / whole * 100`, with the same zero-denominator sentinel as [`safe_div`].
#[inline]
pub fn percent_of(part: f64, whole: f64) -> f64 {
    finite_or_zero(safe_div(part, whole) * 100.0)
}

/// Percentage change from `from` to `to`. Zero when `from` is zero.
#[inline]
pub fn percent_change(from: f64, to: f64) -> f64 {
    percent_of(to - from, from)
}

/// Compound a total return over `days` into a yearly figure, in percent.
///
/// `roi` is a fraction (0.10 = 10%). `days` is clamped to at least one day.
/// A result too large for `f64` is reported as `0.0`.
pub fn annualize(roi: f64, days: i64) -> f64 {
    let days = days.max(1) as f64;
    let growth = 1.0 + roi;
    if growth <= 0.0 {
        // Total loss: the compounded figure is exactly -100%.
        return if growth == 0.0 { -100.0 } else { 0.0 };
    }
    finite_or_zero((growth.powf(365.0 / days) - 1.0) * 100.0)
}

/// Arithmetic mean; `0.0` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    safe_div(values.iter().sum(), values.len() as f64)
}

/// Sample standard deviation (n − 1); `0.0` with fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = safe_div(
        values.iter().map(|v| (v - m).powi(2)).sum(),
        (values.len() - 1) as f64,
    );
    finite_or_zero(variance.sqrt())
}
