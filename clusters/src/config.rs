//! ScanConfiguration (C1, spec §4.1): an immutable bundle of scan parameters.

use crate::error::{ClusterError, Result};
use crate::spline::CubicSpline;
use statrs::function::gamma::ln_gamma;

/// An equally-spaced axis: `value[i] = min + i * spacing`, for `i in 0..bins`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
    pub spacing: f64,
    pub bins: usize,
}

impl Bounds {
    fn new(min: f64, max: f64, bins: usize) -> Result<Self> {
        if bins == 0 && (max - min).abs() > 0.0 {
            return Err(ClusterError::InvalidConfig(
                "bin count is zero over a non-degenerate range".into(),
            ));
        }
        let spacing = if bins == 0 { 0.0 } else { (max - min) / bins as f64 };
        Ok(Self { min, max, spacing, bins })
    }

    /// The value at grid index `i`.
    pub fn at(&self, i: usize) -> f64 {
        self.min + i as f64 * self.spacing
    }
}

/// Immutable scan parameters: σ-grid and prior, R-grid, T-grid, and the
/// mixture hyperparameters `pb`, `alpha`.
#[derive(Clone, Debug)]
pub struct ScanConfiguration {
    sigma_bins: Vec<f64>,
    sigma_bins2: Vec<f64>,
    prob_sigma: Vec<f64>,
    log_prob_sigma: Vec<f64>,
    r_bounds: Bounds,
    t_bounds: Bounds,
    pb: f64,
    log_pb: f64,
    log_pb_dagger: f64,
    alpha: f64,
    log_alpha: f64,
    log_gamma_alpha: f64,
}

impl ScanConfiguration {
    /// `sigma_prior` is evaluated at each σ-grid point to give its (unnormalized)
    /// prior density; pass a constant closure for a flat prior.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        n_sigma: usize,
        sigma_min: f64,
        sigma_max: f64,
        sigma_prior: impl Fn(f64) -> f64,
        r_bins: usize,
        r_min: f64,
        r_max: f64,
        t_bins: usize,
        t_min: f64,
        t_max: f64,
        pb: f64,
        alpha: f64,
    ) -> Result<Self> {
        if n_sigma == 0 {
            return Err(ClusterError::InvalidConfig("sigma-bins must be nonzero".into()));
        }
        if !(0.0 < pb && pb < 1.0) {
            return Err(ClusterError::InvalidConfig(format!("pb must lie in (0, 1), got {pb}")));
        }
        if alpha <= 0.0 {
            return Err(ClusterError::InvalidConfig(format!("alpha must be positive, got {alpha}")));
        }

        let spacing = (sigma_max - sigma_min) / n_sigma as f64;
        let sigma_bins: Vec<f64> = (0..n_sigma).map(|k| sigma_min + k as f64 * spacing).collect();
        let sigma_bins2: Vec<f64> = sigma_bins.iter().map(|s| s * s).collect();
        let prob_sigma: Vec<f64> = sigma_bins.iter().map(|&s| sigma_prior(s)).collect();
        let log_prob_sigma: Vec<f64> = prob_sigma.iter().map(|p| p.ln()).collect();

        let r_bounds = Bounds::new(r_min, r_max, r_bins)?;
        let t_bounds = Bounds::new(t_min, t_max, t_bins)?;

        Ok(Self {
            sigma_bins,
            sigma_bins2,
            prob_sigma,
            log_prob_sigma,
            r_bounds,
            t_bounds,
            pb,
            log_pb: pb.ln(),
            log_pb_dagger: (1.0 - pb).ln(),
            alpha,
            log_alpha: alpha.ln(),
            log_gamma_alpha: ln_gamma(alpha),
        })
    }

    /// Build a `sigma_prior` callback from discrete `(size, probability)` pairs
    /// via a natural cubic spline, matching the CLI's `sigma-curve` flag.
    pub fn interpolated_prior(points: &[(f64, f64)]) -> impl Fn(f64) -> f64 {
        let xs: Vec<f64> = points.iter().map(|(x, _)| *x).collect();
        let ys: Vec<f64> = points.iter().map(|(_, y)| *y).collect();
        let spline = CubicSpline::new(xs, ys);
        move |sigma: f64| spline.eval(sigma)
    }

    pub fn sigma_bins(&self) -> &[f64] {
        &self.sigma_bins
    }
    pub fn sigma_bins2(&self) -> &[f64] {
        &self.sigma_bins2
    }
    pub fn probability_sigma(&self) -> &[f64] {
        &self.prob_sigma
    }
    pub fn log_probability_sigma(&self) -> &[f64] {
        &self.log_prob_sigma
    }
    pub fn r_bounds(&self) -> &Bounds {
        &self.r_bounds
    }
    pub fn t_bounds(&self) -> &Bounds {
        &self.t_bounds
    }
    pub fn pb(&self) -> f64 {
        self.pb
    }
    pub fn log_pb(&self) -> f64 {
        self.log_pb
    }
    pub fn log_pb_dagger(&self) -> f64 {
        self.log_pb_dagger
    }
    pub fn alpha(&self) -> f64 {
        self.alpha
    }
    pub fn log_alpha(&self) -> f64 {
        self.log_alpha
    }
    pub fn log_gamma_alpha(&self) -> f64 {
        self.log_gamma_alpha
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_bin_counts() {
        let err = ScanConfiguration::new(1, 0.02, 0.02, |_| 1.0, 0, 0.0, 1.0, 10, 0.0, 1.0, 0.5, 1.0);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_bad_pb_and_alpha() {
        assert!(ScanConfiguration::new(1, 0.02, 0.02, |_| 1.0, 1, 0.0, 1.0, 1, 0.0, 1.0, 1.5, 1.0).is_err());
        assert!(ScanConfiguration::new(1, 0.02, 0.02, |_| 1.0, 1, 0.0, 1.0, 1, 0.0, 1.0, 0.5, -1.0).is_err());
    }

    #[test]
    fn derives_sigma_grid_correctly() {
        let cfg = ScanConfiguration::new(2, 0.0, 0.02, |_| 1.0, 1, 0.0, 1.0, 1, 0.0, 1.0, 0.2, 20.0).unwrap();
        assert_eq!(cfg.sigma_bins(), &[0.0, 0.01]);
        assert_eq!(cfg.sigma_bins2(), &[0.0, 0.0001]);
    }

    #[test]
    fn r_and_t_bounds_spacing() {
        let cfg = ScanConfiguration::new(1, 0.02, 0.02, |_| 1.0, 4, 0.0, 1.0, 2, 0.0, 1.0, 0.2, 20.0).unwrap();
        assert!((cfg.r_bounds().spacing - 0.25).abs() < 1e-12);
        assert!((cfg.t_bounds().spacing - 0.5).abs() < 1e-12);
    }
}
