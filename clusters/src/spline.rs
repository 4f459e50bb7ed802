//! 1D interpolation used by the σ-integrator (C7, spec §4.6 / §4.10).
//!
//! Two kinds are needed: a cheap piecewise-linear integral over the fixed
//! σ-grid, evaluated once per cluster per (R, T); and a natural cubic spline
//! used once, at configuration time, to turn a user-supplied
//! `size -> prior probability` curve into a callable `f(σ)`.

/// Definite integral of a piecewise-linear function sampled at `xs` (strictly
/// ascending) with values `ys`, over the function's full domain
/// `[xs[0], xs[xs.len()-1]]`. The trapezoid rule is exact for this model, so
/// there's no separate quadrature error to worry about.
pub fn integrate_linear(xs: &[f64], ys: &[f64]) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    let mut total = 0.0;
    for i in 1..xs.len() {
        let dx = xs[i] - xs[i - 1];
        total += 0.5 * dx * (ys[i] + ys[i - 1]);
    }
    total
}

/// Natural cubic spline (second derivative zero at both ends) over a set of
/// knots, built once and evaluated by point lookup. Standard tridiagonal
/// construction (Burden & Faires, *Numerical Analysis*).
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

impl CubicSpline {
    /// `xs` must be strictly ascending and have the same length as `ys`.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Self {
        let n = xs.len();
        assert_eq!(n, ys.len(), "CubicSpline: xs/ys length mismatch");

        if n < 3 {
            // Degenerate: fall back to a flat/linear model with zero curvature.
            let b = if n == 2 {
                vec![(ys[1] - ys[0]) / (xs[1] - xs[0]); 1]
            } else {
                vec![0.0; n.saturating_sub(1)]
            };
            return Self {
                c: vec![0.0; n],
                d: vec![0.0; n.saturating_sub(1)],
                b,
                xs,
                ys,
            };
        }

        let mut h = vec![0.0; n - 1];
        for i in 0..n - 1 {
            h[i] = xs[i + 1] - xs[i];
        }

        let mut alpha = vec![0.0; n];
        for i in 1..n - 1 {
            alpha[i] = (3.0 / h[i]) * (ys[i + 1] - ys[i]) - (3.0 / h[i - 1]) * (ys[i] - ys[i - 1]);
        }

        let mut l = vec![1.0; n];
        let mut mu = vec![0.0; n];
        let mut z = vec![0.0; n];
        for i in 1..n - 1 {
            l[i] = 2.0 * (xs[i + 1] - xs[i - 1]) - h[i - 1] * mu[i - 1];
            mu[i] = h[i] / l[i];
            z[i] = (alpha[i] - h[i - 1] * z[i - 1]) / l[i];
        }

        let mut c = vec![0.0; n];
        let mut b = vec![0.0; n - 1];
        let mut d = vec![0.0; n - 1];
        for j in (0..n - 1).rev() {
            c[j] = z[j] - mu[j] * c[j + 1];
            b[j] = (ys[j + 1] - ys[j]) / h[j] - h[j] * (c[j + 1] + 2.0 * c[j]) / 3.0;
            d[j] = (c[j + 1] - c[j]) / (3.0 * h[j]);
        }

        Self { xs, ys, b, c, d }
    }

    /// Evaluate the spline at `x`, clamping to the nearest segment outside
    /// the knot range rather than extrapolating wildly.
    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if n == 1 {
            return self.ys[0];
        }
        let i = match self.xs.binary_search_by(|v| v.partial_cmp(&x).unwrap()) {
            Ok(idx) => idx.min(n - 2),
            Err(idx) => idx.saturating_sub(1).min(n - 2),
        };
        let dx = x - self.xs[i];
        self.ys[i] + self.b[i] * dx + self.c[i] * dx * dx + self.d[i] * dx * dx * dx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_integral_matches_trapezoid_by_hand() {
        let xs = vec![0.0, 1.0, 2.0, 3.0];
        let ys = vec![0.0, 1.0, 1.0, 0.0];
        // segments: 0.5*(0+1) + 0.5*(1+1) + 0.5*(1+0) = 0.5+1.0+0.5 = 2.0
        assert!((integrate_linear(&xs, &ys) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn cubic_spline_interpolates_exactly_at_knots() {
        let xs = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let ys = vec![0.0, 1.0, 4.0, 9.0, 16.0];
        let spline = CubicSpline::new(xs.clone(), ys.clone());
        for (x, y) in xs.iter().zip(ys.iter()) {
            assert!((spline.eval(*x) - *y).abs() < 1e-9);
        }
    }

    #[test]
    fn cubic_spline_handles_two_points() {
        let spline = CubicSpline::new(vec![0.0, 2.0], vec![1.0, 3.0]);
        assert!((spline.eval(1.0) - 2.0).abs() < 1e-9);
    }
}
