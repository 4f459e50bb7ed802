//! RoIProxy (C5, spec §3 / §4.3 / §4.7 / §4.9): one worker's scratch space
//! for a single (R, T) clusterization.

use statrs::function::gamma::ln_gamma;

use crate::callback::FullScanCallback;
use crate::cluster::Cluster;
use crate::config::ScanConfiguration;
use crate::error::{ClusterError, Result};
use crate::roi::RoI;

/// A chain ~75,000 deep is the point at which the source treats the walk as
/// runaway (spec §4.3, §7).
const RECURSION_LIMIT: usize = 75_000;

/// Per-point scratch: which cluster (if any) it currently belongs to, and
/// whether it's excluded from this (R, T) by its localization score.
#[derive(Clone, Copy, Debug, Default)]
struct DataProxy {
    cluster: Option<u32>,
    exclude: bool,
}

/// A worker's private clusterization state: its own cluster pool and
/// DataProxy array, plus per-(R, T) summary counters. Never shared between
/// workers (spec §5).
pub struct RoIProxy<'roi> {
    roi: &'roi RoI,
    data: Vec<DataProxy>,
    clusters: Vec<Cluster>,
    clustered_count: usize,
    background_count: usize,
    cluster_count: usize,
    log_p: f64,
    arg_scratch: Vec<f64>,
    mu_scratch: Vec<f64>,
}

impl<'roi> RoIProxy<'roi> {
    pub fn new(roi: &'roi RoI) -> Self {
        let n = roi.points.len();
        RoIProxy {
            roi,
            data: vec![DataProxy::default(); n],
            clusters: Vec::with_capacity(n),
            clustered_count: 0,
            background_count: 0,
            cluster_count: 0,
            log_p: 0.0,
            arg_scratch: Vec::new(),
            mu_scratch: Vec::new(),
        }
    }

    pub fn roi(&self) -> &RoI {
        self.roi
    }
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }
    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }
    pub fn clustered_count(&self) -> usize {
        self.clustered_count
    }
    pub fn background_count(&self) -> usize {
        self.background_count
    }
    pub fn log_p(&self) -> f64 {
        self.log_p
    }

    /// Root cluster id for every point, `None` if excluded from this
    /// (R, T). Resolves (and path-compresses) every live chain, so callers
    /// building e.g. a convex hull per cluster can group by the returned id.
    pub fn final_clusters(&mut self) -> Vec<Option<u32>> {
        (0..self.data.len()).map(|idx| self.resolve(idx)).collect()
    }

    fn get_root(&mut self, id: u32) -> u32 {
        let mut cur = id;
        while let Some(p) = self.clusters[cur as usize].parent {
            cur = p;
        }
        let mut walk = id;
        while walk != cur {
            let next = self.clusters[walk as usize]
                .parent
                .expect("walked node must have a parent until reaching the root");
            self.clusters[walk as usize].parent = Some(cur);
            walk = next;
        }
        cur
    }

    fn resolve(&mut self, idx: usize) -> Option<u32> {
        let id = self.data[idx].cluster?;
        let root = self.get_root(id);
        self.data[idx].cluster = Some(root);
        Some(root)
    }

    fn clusterize_point(&mut self, idx: usize, two_r2: f64) -> Result<()> {
        if self.data[idx].cluster.is_some() || self.data[idx].exclude {
            return Ok(());
        }
        let n_sigma = self.roi.points[idx].proto.len();
        let target = self.clusters.len() as u32;
        self.clusters.push(Cluster::new(n_sigma));
        match self.attach(idx, target, two_r2, 0) {
            Ok(()) => Ok(()),
            Err(ClusterError::RecursionLimitExceeded) => {
                log::warn!("recursion limit exceeded clusterizing point {idx}; abandoning seed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn attach(&mut self, idx: usize, target: u32, two_r2: f64, depth: usize) -> Result<()> {
        if let Some(c) = self.data[idx].cluster {
            let root = self.get_root(c);
            if root == target {
                return Ok(());
            }
            let source_params = self.clusters[root as usize].params.clone();
            let source_size = self.clusters[root as usize].size;
            self.clusters[target as usize].merge_params(&source_params, source_size);
            self.clusters[root as usize].parent = Some(target);
            self.clusters[root as usize].size = 0;
            self.data[idx].cluster = Some(target);
            return Ok(());
        }
        if self.data[idx].exclude {
            return Ok(());
        }

        {
            let proto = &self.roi.points[idx].proto;
            self.clusters[target as usize].absorb_proto(proto);
        }
        self.data[idx].cluster = Some(target);

        if depth > RECURSION_LIMIT {
            return Err(ClusterError::RecursionLimitExceeded);
        }

        let n_neighbors = self.roi.points[idx].neighbors.len();
        for k in 0..n_neighbors {
            let (d2, j) = self.roi.points[idx].neighbors[k];
            if d2 > two_r2 {
                break;
            }
            self.attach(j, target, two_r2, depth + 1)?;
        }
        Ok(())
    }

    fn update_log_score(&mut self, config: &ScanConfiguration) {
        self.cluster_count = 0;
        self.clustered_count = 0;
        let mut log_pl = 0.0;

        for c in self.clusters.iter_mut() {
            if c.size == 0 {
                continue;
            }
            c.update_log_score(config.sigma_bins(), config.log_probability_sigma(), &mut self.arg_scratch, &mut self.mu_scratch);
            self.cluster_count += 1;
            self.clustered_count += c.size;
            log_pl += c.score;
            log_pl += ln_gamma(c.size as f64);
        }

        self.background_count = self.data.len() - self.clustered_count;
        log_pl += self.background_count as f64 * config.log_pb()
            + self.clustered_count as f64 * config.log_pb_dagger()
            + self.cluster_count as f64 * config.log_alpha()
            + config.log_gamma_alpha()
            - ln_gamma(config.alpha() + self.clustered_count as f64);

        self.log_p = log_pl + (-4f64.ln()) * self.background_count as f64;
    }

    fn tally_counts_without_score(&mut self) {
        self.cluster_count = self.clusters.iter().filter(|c| c.size > 0).count();
        self.clustered_count = self.clusters.iter().map(|c| c.size).sum();
        self.background_count = self.data.len() - self.clustered_count;
    }

    /// Structural validation (spec §4.9, first two bullets): every included
    /// neighbor pair shares a root, and sizes + background account for every
    /// point.
    fn check_clusterization(&mut self, two_r2: f64) -> Result<()> {
        let n = self.data.len();
        for idx in 0..n {
            if self.data[idx].exclude {
                continue;
            }
            let root_d = self.resolve(idx).expect("included point must be attached to a cluster");
            let n_neighbors = self.roi.points[idx].neighbors.len();
            for k in 0..n_neighbors {
                let (d2, j) = self.roi.points[idx].neighbors[k];
                if d2 > two_r2 {
                    break;
                }
                if self.data[j].exclude {
                    continue;
                }
                let root_j = self.resolve(j).expect("included neighbor must be attached to a cluster");
                if root_j != root_d {
                    return Err(ClusterError::LogScoreMismatch(format!(
                        "points {idx} and {j} are mutual neighbors within 2R^2={two_r2} but have different roots"
                    )));
                }
            }
        }

        let total_size: usize = self.clusters.iter().map(|c| c.size).sum();
        if total_size + self.background_count != n {
            return Err(ClusterError::LogScoreMismatch(format!(
                "cluster sizes ({total_size}) + background ({}) != point count ({n})",
                self.background_count
            )));
        }
        Ok(())
    }

    /// Recompute each cluster's `log_score` against an independently
    /// formulated `alt_log_score` (spec §4.9, third bullet), via a second
    /// pass that accumulates the weighted centre and `S²` directly.
    fn validate_log_score(&mut self, config: &ScanConfiguration, tolerance: f64) -> Result<()> {
        let n_sigma = config.sigma_bins().len();
        if n_sigma == 0 {
            return Ok(());
        }
        let n_clusters = self.clusters.len();
        let mut sum_w = vec![vec![0.0; n_sigma]; n_clusters];
        let mut sum_wx = vec![vec![0.0; n_sigma]; n_clusters];
        let mut sum_wy = vec![vec![0.0; n_sigma]; n_clusters];

        for idx in 0..self.data.len() {
            if self.data[idx].exclude {
                continue;
            }
            let root = self.resolve(idx).expect("included point must be attached to a cluster") as usize;
            let p = &self.roi.points[idx];
            for (k, &sigma2) in config.sigma_bins2().iter().enumerate() {
                let w = 1.0 / (p.s * p.s + sigma2);
                sum_w[root][k] += w;
                sum_wx[root][k] += w * p.x;
                sum_wy[root][k] += w * p.y;
            }
        }

        let mut s2 = vec![vec![0.0; n_sigma]; n_clusters];
        for idx in 0..self.data.len() {
            if self.data[idx].exclude {
                continue;
            }
            let root = self.resolve(idx).expect("included point must be attached to a cluster") as usize;
            let p = &self.roi.points[idx];
            for (k, &sigma2) in config.sigma_bins2().iter().enumerate() {
                if sum_w[root][k] == 0.0 {
                    continue;
                }
                let w = 1.0 / (p.s * p.s + sigma2);
                let mean_x = sum_wx[root][k] / sum_w[root][k];
                let mean_y = sum_wy[root][k] / sum_w[root][k];
                let dx = p.x - mean_x;
                let dy = p.y - mean_y;
                s2[root][k] += w * (dx * dx + dy * dy);
            }
        }

        for (cluster_idx, cluster) in self.clusters.iter().enumerate() {
            if cluster.size == 0 {
                continue;
            }
            for k in 0..n_sigma {
                if sum_w[cluster_idx][k] == 0.0 {
                    continue;
                }
                let mut alt_param = cluster.params[k];
                alt_param.weighted_centre_x = sum_wx[cluster_idx][k] / sum_w[cluster_idx][k];
                alt_param.weighted_centre_y = sum_wy[cluster_idx][k] / sum_w[cluster_idx][k];
                alt_param.s2 = s2[cluster_idx][k];

                let primary = cluster.params[k].log_score();
                let alt = alt_param.alt_log_score();
                if (primary - alt).abs() > tolerance {
                    return Err(ClusterError::LogScoreMismatch(format!(
                        "cluster {cluster_idx} sigma-bin {k}: log_score {primary} vs alt_log_score {alt} (tolerance {tolerance})"
                    )));
                }
            }
        }
        Ok(())
    }

    /// One worker's share of a full scan (spec §4.8): `i = offset, offset +
    /// stride, ...`, T descending inside each R.
    pub fn scan_rt(&mut self, config: &ScanConfiguration, stride: usize, offset: usize, validate: bool, callback: &impl FullScanCallback) -> Result<()> {
        let r_bounds = *config.r_bounds();
        let t_bounds = *config.t_bounds();

        let mut i = offset;
        while i < r_bounds.bins {
            let r = r_bounds.at(i);
            let two_r2 = 4.0 * r * r;

            self.clusters.clear();
            for d in self.data.iter_mut() {
                d.cluster = None;
            }

            for j in 0..t_bounds.bins {
                let t = t_bounds.max - j as f64 * t_bounds.spacing;

                for idx in 0..self.data.len() {
                    self.data[idx].exclude = self.roi.points[idx].scores_by_r[i] < t;
                }
                for idx in 0..self.data.len() {
                    self.clusterize_point(idx, two_r2)?;
                }

                self.update_log_score(config);

                if validate {
                    self.check_clusterization(two_r2)?;
                    self.validate_log_score(config, 5.0)?;
                }

                callback(self, r, t);
            }
            i += stride;
        }

        self.clusters.clear();
        for d in self.data.iter_mut() {
            d.cluster = None;
        }
        Ok(())
    }

    /// Single (R, T) clusterization outside a scan grid (spec §4.4's
    /// standalone form). No σ-marginal score is computed; only membership.
    pub fn clusterize_standalone(&mut self, r: f64, t: f64) -> Result<()> {
        let two_r2 = 4.0 * r * r;
        let n = self.data.len();

        for idx in 0..n {
            self.data[idx].cluster = None;
            let score = self.roi.points[idx].calculate_localization_score(r, self.roi.area, n);
            self.data[idx].exclude = score < t;
        }
        self.clusters.clear();

        for idx in 0..n {
            self.clusterize_point(idx, two_r2)?;
        }
        self.tally_counts_without_score();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::{build_neighbors, Point};
    use crate::roi::RoI;

    fn coincident_pair_plus_isolated() -> RoI {
        let pts = vec![Point::new(0.0, 0.0, 0.001), Point::new(0.0, 0.0, 0.001), Point::new(0.9, 0.9, 0.001)];
        RoI::new("r", pts, (0.0, 0.0), 1.0)
    }

    #[test]
    fn coincident_points_always_cluster_together_for_positive_r() {
        let mut roi = coincident_pair_plus_isolated();
        let proxy = roi.clusterize(0.01, 0.0, 1).unwrap();
        assert_eq!(proxy.cluster_count(), 2);
        let mut sizes: Vec<usize> = proxy.clusters().iter().map(|c| c.size).filter(|&s| s > 0).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2]);
    }

    #[test]
    fn get_root_is_idempotent_and_path_compresses() {
        let pts = vec![Point::new(0.0, 0.0, 0.001), Point::new(0.01, 0.0, 0.001), Point::new(0.02, 0.0, 0.001)];
        let mut roi = RoI::new("chain", pts, (0.0, 0.0), 1.0);
        let mut proxy = roi.clusterize(1.0, 0.0, 1).unwrap();
        let root_a = proxy.resolve(0).unwrap();
        let root_again = proxy.resolve(0).unwrap();
        assert_eq!(root_a, root_again);
        for d in proxy.data.iter() {
            if let Some(c) = d.cluster {
                assert_eq!(proxy.clusters[c as usize].parent.is_none(), true);
            }
        }
    }

    #[test]
    fn seed_order_permutation_yields_same_partition() {
        // Clusterizing forward vs. reverse index order must yield the same
        // final grouping of points into clusters (spec §8).
        let two_rmax = 1.0;
        let mut points = vec![
            Point::new(0.0, 0.0, 0.001),
            Point::new(0.02, 0.0, 0.001),
            Point::new(0.04, 0.0, 0.001),
            Point::new(1.0, 1.0, 0.001),
        ];
        points.sort_by(|a, b| a.r.partial_cmp(&b.r).unwrap());
        for i in 0..points.len() {
            points[i].neighbors = build_neighbors(&points, i, two_rmax, two_rmax * two_rmax);
        }
        let roi_a = RoI { id: "a".into(), points: points.clone(), centre: (0.0, 0.0), area: 1.0 };
        let roi_b = RoI { id: "b".into(), points, centre: (0.0, 0.0), area: 1.0 };

        let mut proxy_a = RoIProxy::new(&roi_a);
        for idx in 0..proxy_a.data.len() {
            proxy_a.clusterize_point(idx, 0.1 * 0.1).unwrap();
        }
        let mut proxy_b = RoIProxy::new(&roi_b);
        for idx in (0..proxy_b.data.len()).rev() {
            proxy_b.clusterize_point(idx, 0.1 * 0.1).unwrap();
        }

        let partition_a: Vec<Option<u32>> = proxy_a.final_clusters();
        let partition_b: Vec<Option<u32>> = proxy_b.final_clusters();

        let same_group = |p: &[Option<u32>], i: usize, j: usize| p[i] == p[j];
        for i in 0..partition_a.len() {
            for j in 0..partition_a.len() {
                assert_eq!(same_group(&partition_a, i, j), same_group(&partition_b, i, j));
            }
        }
    }
}
