//! Point (C2, spec §3 / §4.2 / §4.4): a localization and its derived,
//! cached geometry.

use crate::cluster::Parameter;
use crate::config::Bounds;

/// A single localization: position, positional uncertainty, derived polar
/// coordinates, and the caches built during `RoI::preprocess`.
#[derive(Clone, Debug)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub s: f64,
    pub r2: f64,
    pub r: f64,
    pub phi: f64,
    /// `(d2, index)` pairs, ascending by `d2`, of every other point within
    /// `2 * R_max`.
    pub neighbors: Vec<(f64, usize)>,
    /// Edge-corrected local density score at each R-grid index (spec §4.4).
    pub scores_by_r: Vec<f64>,
    /// This point's per-σ-bin proto-cluster statistics (spec §3, §4.2 step 3;
    /// a cached `Vec<Parameter>` rather than an owned `Cluster`, per the
    /// Design Notes simplification).
    pub proto: Vec<Parameter>,
}

impl Point {
    pub fn new(x: f64, y: f64, s: f64) -> Self {
        let r2 = x * x + y * y;
        Point {
            x,
            y,
            s,
            r2,
            r: r2.sqrt(),
            phi: y.atan2(x),
            neighbors: Vec::new(),
            scores_by_r: Vec::new(),
            proto: Vec::new(),
        }
    }

    /// Recompute K(R) by a linear scan of `neighbors` (spec §4.4, second
    /// form), for standalone `Clusterize(R, T)` calls outside a scan.
    pub fn calculate_localization_score(&self, r: f64, area: f64, n_points: usize) -> f64 {
        let r2 = r * r;
        let count = self.neighbors.iter().take_while(|&&(d2, _)| d2 <= r2).count();
        (area / (std::f64::consts::PI * (n_points as f64 - 1.0)) * count as f64).sqrt()
    }

    /// Precompute `scores_by_R` for the whole R-grid in one pass (spec §4.4),
    /// advancing the neighbour cursor as R grows rather than rescanning.
    pub fn compute_scores_by_r(&self, r_bounds: &Bounds, localization_constant: f64) -> Vec<f64> {
        let mut out = Vec::with_capacity(r_bounds.bins);
        let mut cursor = 0usize;
        let mut count = 0.0f64;
        let mut last_count = -1.0f64;
        let mut score = 0.0f64;

        for i in 0..r_bounds.bins {
            let r = r_bounds.at(i);
            let r2 = r * r;
            while cursor < self.neighbors.len() && self.neighbors[cursor].0 <= r2 {
                count += 1.0;
                cursor += 1;
            }
            if last_count != count {
                score = (localization_constant * count).sqrt();
                last_count = count;
            }
            out.push(score);
        }
        out
    }
}

/// Build `points[i]`'s neighbour list: every other point within Euclidean
/// distance `two_rmax`, angular-pruned by the ring-geometry bound (spec
/// §4.2). `points` must already be sorted ascending by `r`.
pub fn build_neighbors(points: &[Point], i: usize, two_rmax: f64, two_rmax2: f64) -> Vec<(f64, usize)> {
    let p = &points[i];

    // arcsin(two_rmax / r) is only defined for r >= two_rmax; for smaller r
    // the wedge covers the whole circle, so pruning is skipped rather than
    // risking a NaN comparison (spec §9 open question).
    let ratio = two_rmax / p.r;
    let prune = ratio <= 1.0;
    let dphi = if prune { ratio.asin() } else { 0.0 };
    let dphi2 = 2.0 * std::f64::consts::PI - dphi;

    let within_wedge = |q: &Point| -> bool {
        if !prune {
            return true;
        }
        let d = (p.phi - q.phi).abs();
        d <= dphi || d >= dphi2
    };

    let mut neighbors = Vec::new();

    for j in (i + 1)..points.len() {
        let q = &points[j];
        if q.r - p.r > two_rmax {
            break;
        }
        if !within_wedge(q) {
            continue;
        }
        let dx = p.x - q.x;
        let dy = p.y - q.y;
        let d2 = dx * dx + dy * dy;
        if d2 <= two_rmax2 {
            neighbors.push((d2, j));
        }
    }

    for j in (0..i).rev() {
        let q = &points[j];
        if p.r - q.r > two_rmax {
            break;
        }
        if !within_wedge(q) {
            continue;
        }
        let dx = p.x - q.x;
        let dy = p.y - q.y;
        let d2 = dx * dx + dy * dy;
        if d2 <= two_rmax2 {
            neighbors.push((d2, j));
        }
    }

    neighbors.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    neighbors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_points(coords: &[(f64, f64)]) -> Vec<Point> {
        let mut points: Vec<Point> = coords.iter().map(|&(x, y)| Point::new(x, y, 0.001)).collect();
        points.sort_by(|a, b| a.r.partial_cmp(&b.r).unwrap());
        points
    }

    #[test]
    fn neighbor_build_matches_brute_force() {
        let points = make_points(&[(0.0, 0.0), (0.05, 0.0), (0.2, 0.0), (-0.1, 0.05)]);
        let two_rmax = 0.3;
        let two_rmax2 = two_rmax * two_rmax;

        for i in 0..points.len() {
            let built = build_neighbors(&points, i, two_rmax, two_rmax2);
            let mut brute: Vec<(f64, usize)> = (0..points.len())
                .filter(|&j| j != i)
                .map(|j| {
                    let dx = points[i].x - points[j].x;
                    let dy = points[i].y - points[j].y;
                    (dx * dx + dy * dy, j)
                })
                .filter(|&(d2, _)| d2 <= two_rmax2)
                .collect();
            brute.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

            let mut built_sorted = built.clone();
            built_sorted.sort_by(|a, b| a.1.cmp(&b.1));
            let mut brute_sorted = brute.clone();
            brute_sorted.sort_by(|a, b| a.1.cmp(&b.1));
            assert_eq!(built_sorted, brute_sorted);
        }
    }

    #[test]
    fn scores_by_r_are_monotone_non_decreasing() {
        let points = make_points(&[(0.0, 0.0), (0.05, 0.01), (0.2, 0.0), (-0.1, 0.05), (0.3, -0.2)]);
        let two_rmax = 1.0;
        let mut points = points;
        for i in 0..points.len() {
            points[i].neighbors = build_neighbors(&points, i, two_rmax, two_rmax * two_rmax);
        }
        let bounds = Bounds { min: 0.0, max: 1.0, spacing: 0.1, bins: 10 };
        let constant = 4.0 / (std::f64::consts::PI * (points.len() as f64 - 1.0));
        for p in &points {
            let scores = p.compute_scores_by_r(&bounds, constant);
            for w in scores.windows(2) {
                assert!(w[1] >= w[0] - 1e-15);
            }
        }
    }
}
