//! Cluster (C3, spec §3 / §4.5 / §4.6): sufficient statistics, union-find
//! parent link, and the marginal log-score.

use std::ops::AddAssign;

use statrs::function::erf::{erf, erfc};

use crate::spline::integrate_linear;

/// Standard normal CDF via erf/erfc, split at `z = -1` to avoid cancellation
/// for very negative arguments (spec §4.5).
pub fn normal_cdf(z: f64) -> f64 {
    if z < -1.0 {
        0.5 * erfc(-z)
    } else {
        0.5 * (1.0 + erf(z))
    }
}

/// Per-σ-bin sufficient statistics for a cluster (spec §3).
///
/// `weighted_centre_x/y` and `s2` are validation-only fields, populated by a
/// second pass over points (spec §4.9) and not touched by `+=`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Parameter {
    pub a: f64,
    pub bx: f64,
    pub by: f64,
    pub c: f64,
    pub log_f: f64,
    pub weighted_centre_x: f64,
    pub weighted_centre_y: f64,
    pub s2: f64,
}

impl Parameter {
    /// Proto-cluster statistics for a single point `(x, y)` with uncertainty
    /// `s2 = s^2` under a σ-bin with `sigma2 = σ_k^2` (spec §3).
    pub fn proto(x: f64, y: f64, r2: f64, s2: f64, sigma2: f64) -> Self {
        let w = 1.0 / (s2 + sigma2);
        Parameter {
            a: w,
            bx: w * x,
            by: w * y,
            c: w * r2,
            log_f: w.ln(),
            weighted_centre_x: 0.0,
            weighted_centre_y: 0.0,
            s2: 0.0,
        }
    }

    /// The per-σ-bin marginal log-score (spec §4.5).
    pub fn log_score(&self) -> f64 {
        let dx = self.bx / self.a;
        let dy = self.by / self.a;
        let e = self.c - self.bx * dx - self.by * dy;
        let sqrt_a = self.a.sqrt();

        let mut log_sum = self.log_f - self.a.ln() - 0.5 * e;

        let gx = normal_cdf(sqrt_a * (1.0 - dx)) - normal_cdf(sqrt_a * (-1.0 - dx));
        if gx != 1.0 {
            log_sum += gx.ln();
        }
        let gy = normal_cdf(sqrt_a * (1.0 - dy)) - normal_cdf(sqrt_a * (-1.0 - dy));
        if gy != 1.0 {
            log_sum += gy.ln();
        }
        log_sum
    }

    /// Independently-formulated log-score used only for validation (spec
    /// §4.9): recomputes the quadratic form from the explicit `s2` second
    /// moment rather than from `A, Bx, By, C`.
    pub fn alt_log_score(&self) -> f64 {
        let log2pi = (2.0 * std::f64::consts::PI).ln();
        let inv_a = 1.0 / self.a;
        let sqrt_a = self.a.sqrt();
        let nubar_x = self.weighted_centre_x;
        let nubar_y = self.weighted_centre_y;

        let log_mu_integral = log2pi
            + inv_a.ln()
            + (normal_cdf(sqrt_a * (1.0 - nubar_x)) - normal_cdf(sqrt_a * (-1.0 - nubar_x))).ln()
            + (normal_cdf(sqrt_a * (1.0 - nubar_y)) - normal_cdf(sqrt_a * (-1.0 - nubar_y))).ln();

        self.log_f - self.s2 / 2.0 + log_mu_integral
    }
}

impl AddAssign for Parameter {
    fn add_assign(&mut self, rhs: Self) {
        self.a += rhs.a;
        self.bx += rhs.bx;
        self.by += rhs.by;
        self.c += rhs.c;
        self.log_f += rhs.log_f;
    }
}

/// A union-find node: a cluster's sufficient statistics across every σ-bin,
/// its size, and a parent link into the owning `RoIProxy`'s pool.
#[derive(Clone, Debug)]
pub struct Cluster {
    pub params: Vec<Parameter>,
    pub size: usize,
    pub last_size: usize,
    pub score: f64,
    pub parent: Option<u32>,
}

impl Cluster {
    pub fn new(n_sigma: usize) -> Self {
        Cluster {
            params: vec![Parameter::default(); n_sigma],
            size: 0,
            last_size: 0,
            score: f64::NEG_INFINITY,
            parent: None,
        }
    }

    /// Merge `other`'s statistics into `self` (spec §3: commutative,
    /// associative on the `(A, Bx, By, C, logF, size)` tuple).
    pub fn merge_params(&mut self, other_params: &[Parameter], other_size: usize) {
        for (p, o) in self.params.iter_mut().zip(other_params.iter()) {
            *p += *o;
        }
        self.size += other_size;
    }

    /// Absorb a single point's proto-cluster statistics.
    pub fn absorb_proto(&mut self, proto: &[Parameter]) {
        for (p, o) in self.params.iter_mut().zip(proto.iter()) {
            *p += *o;
        }
        self.size += 1;
    }

    /// Marginal log-score over σ (spec §4.6). A no-op if `size` hasn't grown
    /// since the last call, since the score depends only on the additive
    /// sufficient statistics.
    pub fn update_log_score(&mut self, sigma_bins: &[f64], log_p_sigma: &[f64], arg: &mut Vec<f64>, mu: &mut Vec<f64>) {
        if self.size <= self.last_size {
            return;
        }
        self.last_size = self.size;

        let n = sigma_bins.len();
        arg.clear();
        arg.resize(n, 0.0);
        mu.clear();
        mu.resize(n, 0.0);

        let mut max_val = f64::NEG_INFINITY;
        for k in 0..n {
            let v = self.params[k].log_score() + log_p_sigma[k];
            arg[k] = v;
            if v > max_val {
                max_val = v;
            }
        }
        for k in 0..n {
            mu[k] = (arg[k] - max_val).exp();
        }

        let integral = integrate_linear(sigma_bins, mu);
        let log2pi = (2.0 * std::f64::consts::PI).ln();
        let size = self.size as f64;

        // Algebraically redundant (see spec Design Notes §9) but kept
        // verbatim rather than simplified.
        self.score = integral.ln() + max_val - 4f64.ln() + (1.0 - size) * log2pi + 0.25f64.ln() - size * log2pi;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(x: f64, y: f64, r2: f64, s2: f64, sigma2: f64) -> Parameter {
        Parameter::proto(x, y, r2, s2, sigma2)
    }

    #[test]
    fn merge_is_commutative_on_sufficient_statistics() {
        let p1 = param(0.1, 0.1, 0.02, 1e-6, 4e-4);
        let p2 = param(-0.1, 0.1, 0.02, 1e-6, 4e-4);

        let mut a = Cluster::new(1);
        a.absorb_proto(&[p1]);
        a.merge_params(&[p2], 1);

        let mut b = Cluster::new(1);
        b.absorb_proto(&[p2]);
        b.merge_params(&[p1], 1);

        assert!((a.params[0].a - b.params[0].a).abs() < 1e-15);
        assert!((a.params[0].bx - b.params[0].bx).abs() < 1e-15);
        assert!((a.params[0].by - b.params[0].by).abs() < 1e-15);
        assert_eq!(a.size, b.size);
    }

    #[test]
    fn merge_is_associative() {
        let p1 = param(0.0, 0.0, 0.0, 1e-6, 4e-4);
        let p2 = param(0.1, 0.0, 0.01, 1e-6, 4e-4);
        let p3 = param(0.0, 0.1, 0.01, 1e-6, 4e-4);

        let mut left = Cluster::new(1);
        left.absorb_proto(&[p1]);
        left.merge_params(&[p2], 1);
        left.merge_params(&[p3], 1);

        let mut right = Cluster::new(1);
        right.absorb_proto(&[p2]);
        right.merge_params(&[p3], 1);
        right.merge_params(&[p1], 1);

        assert!((left.params[0].c - right.params[0].c).abs() < 1e-12);
        assert_eq!(left.size, right.size);
    }

    #[test]
    fn update_log_score_is_cached_while_size_unchanged() {
        let mut c = Cluster::new(1);
        c.absorb_proto(&[param(0.0, 0.0, 0.0, 1e-6, 4e-4)]);
        let mut arg = Vec::new();
        let mut mu = Vec::new();
        c.update_log_score(&[0.02], &[0.0], &mut arg, &mut mu);
        let first = c.score;
        c.last_size = c.size; // simulate an unchanged scan step
        c.update_log_score(&[0.02], &[0.0], &mut arg, &mut mu);
        assert_eq!(first, c.score);
    }
}
