//! Quadrature rules over a descending power ladder.

/// Trapezoid estimate of the integral between `a` and `b`.
pub fn trapezoid_rule(fa: f64, fb: f64, a: f64, b: f64) -> f64 {
    (b - a).abs() / 2.0 * (fa + fb)
}

/// Simpson's rule for unequally spaced points `a > c > b`.
///
/// Fits the parabola through `(b, fb)`, `(c, fc)`, `(a, fa)` and integrates it
/// from `b` to `a`. The result is exact for any quadratic.
pub fn simpsons_rule(fa: f64, fb: f64, fc: f64, a: f64, b: f64, c: f64) -> f64 {
    let (x0, x1, x2) = (b, c, a);
    let (y0, y1, y2) = (fb, fc, fa);
    let base = (x2 - x0) * (y0 + ((x2 - x0) / (x1 - x0)) * (y1 - y0) / 2.0);
    let curvature = (2.0 * x2 * x2 - x0 * x2 - x0 * x0 + 3.0 * x0 * x1 - 3.0 * x1 * x2)
        * ((y2 - y1) / (x2 - x1) - (y1 - y0) / (x1 - x0))
        / 6.0;
    base + curvature
}
