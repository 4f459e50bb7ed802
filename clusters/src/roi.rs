//! RoI (C4, spec §3 / §4.2): owns a sorted vector of Points plus the
//! physical centre and area used for edge-correction normalization.

use crate::callback::FullScanCallback;
use crate::cluster::Parameter;
use crate::config::{Bounds, ScanConfiguration};
use crate::error::{ClusterError, Result};
use crate::point::{build_neighbors, Point};
use crate::roi_proxy::RoIProxy;
use crate::scheduler;

/// A Region of Interest: an immutable-after-construction set of Points, sorted
/// ascending by radial distance from the RoI's centre, plus its physical
/// centre and area.
pub struct RoI {
    pub id: String,
    pub points: Vec<Point>,
    pub centre: (f64, f64),
    pub area: f64,
}

impl RoI {
    /// Points are re-expressed relative to `centre` and sorted by the
    /// resulting radius; `area` is the RoI's physical area (used by the
    /// edge-correction normalization in §4.4).
    pub fn new(id: impl Into<String>, points: Vec<Point>, centre: (f64, f64), area: f64) -> Self {
        let mut points = points;
        points.sort_by(|a, b| a.r.partial_cmp(&b.r).unwrap());
        RoI { id: id.into(), points, centre, area }
    }

    /// Build neighbour lists, proto-clusters, and per-R localization scores
    /// for every point (spec §4.2), in parallel across `threads` workers.
    fn preprocess(&mut self, max_r: f64, sigma_bins2: &[f64], threads: usize) {
        let two_rmax = 2.0 * max_r;
        let two_rmax2 = two_rmax * two_rmax;
        let n = self.points.len();

        {
            let snapshot: &[Point] = &self.points;
            let results = scheduler::parallel_map(n, threads, |i| {
                let neighbors = build_neighbors(snapshot, i, two_rmax, two_rmax2);
                let p = &snapshot[i];
                let proto: Vec<Parameter> = sigma_bins2
                    .iter()
                    .map(|&sigma2| Parameter::proto(p.x, p.y, p.r2, p.s * p.s, sigma2))
                    .collect();
                (neighbors, proto)
            });
            for (i, (neighbors, proto)) in results.into_iter().enumerate() {
                self.points[i].neighbors = neighbors;
                self.points[i].proto = proto;
            }
        }
    }

    fn preprocess_localization_scores(&mut self, r_bounds: &Bounds, threads: usize) {
        let n = self.points.len();
        if n <= 1 {
            for p in &mut self.points {
                p.scores_by_r = vec![0.0; r_bounds.bins];
            }
            return;
        }
        let localization_constant = self.area / (std::f64::consts::PI * (n as f64 - 1.0));
        let snapshot: &[Point] = &self.points;
        let results = scheduler::parallel_map(n, threads, |i| snapshot[i].compute_scores_by_r(r_bounds, localization_constant));
        for (i, scores) in results.into_iter().enumerate() {
            self.points[i].scores_by_r = scores;
        }
    }

    /// Run a full (R, T) scan: preprocess, then fan the R-axis across
    /// `threads` workers, invoking `callback(&RoIProxy, r, t)` for every
    /// grid point (spec §4.8).
    pub fn scan_rt(&mut self, config: &ScanConfiguration, threads: usize, validate: bool, callback: impl FullScanCallback) -> Result<()> {
        self.preprocess(config.r_bounds().max, config.sigma_bins2(), threads);
        self.preprocess_localization_scores(config.r_bounds(), threads);
        scheduler::run_scan(self, config, threads, validate, &callback)
    }

    /// Clusterize a single (R, T) outside of a scan grid (spec §4.4's
    /// standalone form). Does not require a `ScanConfiguration`, since no
    /// σ-marginal score is computed in this mode.
    pub fn clusterize(&mut self, r: f64, t: f64, threads: usize) -> Result<RoIProxy<'_>> {
        if r < 0.0 || t < 0.0 {
            return Err(ClusterError::InvalidConfig("R and T must be non-negative".into()));
        }
        self.preprocess(r, &[], threads);
        let mut proxy = RoIProxy::new(self);
        proxy.clusterize_standalone(r, t)?;
        Ok(proxy)
    }
}
