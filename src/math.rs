/// Computes the infinity norm: `max(abs(a))`
pub(crate) fn norm_inf(a: &[f64]) -> f64 {
    a.iter().fold(0.0, |max, v| f64::max(max, v.abs()))
}

/// Tolerance below which `1 - BPTDF[c,c]` is treated as zero.
///
/// The entries of a PTDF carry a relative error of roughly `cond * eps`,
/// so the fixed tolerance is widened for poorly conditioned networks.
pub(crate) fn bridge_tolerance(tol: f64, condition: f64) -> f64 {
    if condition.is_finite() {
        f64::max(tol, condition * f64::EPSILON)
    } else {
        tol
    }
}
