//! Callback surface (C8, spec §6.1 / §6.3 / Design Notes "Callback invocation
//! discipline"): typed signatures through which results escape the core.

use crate::roi_proxy::RoIProxy;

/// Invoked once per (R, T) grid point during a scan, synchronously from
/// whichever worker thread reached that point. The proxy is only valid for
/// the duration of the call: implementations must not retain references to
/// it or its clusters past their own return.
pub trait FullScanCallback: Fn(&RoIProxy, f64, f64) + Sync {}
impl<T: Fn(&RoIProxy, f64, f64) + Sync> FullScanCallback for T {}

/// One entry in a collected scan surface: `(r, t, logP)`, ordered
/// lexicographically by `(r, t)` (spec §6.1).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanEntry {
    pub r: f64,
    pub t: f64,
    pub log_p: f64,
}

impl ScanEntry {
    pub fn sort_key(&self) -> (f64, f64) {
        (self.r, self.t)
    }
}

/// A snapshot of one non-empty cluster's member positions, taken
/// synchronously inside a callback (spec §6.1: `ClusterWrapper` is later
/// derived from this by the ambient geometry layer via a convex hull).
#[derive(Clone, Debug)]
pub struct ClusterSnapshot {
    pub positions: Vec<(f64, f64)>,
}

/// Collects `ScanEntry` values from a full scan callback into the sorted
/// vector the "simple" callback flavor expects (spec §6.1,
/// `AutoRoi_Scan_SimpleCallback`). Thread-safe: intended to be shared (e.g.
/// behind a `Mutex`) by the wrapper that adapts a full callback into a
/// simple one.
#[derive(Default)]
pub struct ScanCollector {
    pub entries: Vec<ScanEntry>,
}

impl ScanCollector {
    pub fn push(&mut self, r: f64, t: f64, log_p: f64) {
        self.entries.push(ScanEntry { r, t, log_p });
    }

    /// Consume the collector, returning entries sorted by `(r, t)`.
    pub fn into_sorted(mut self) -> Vec<ScanEntry> {
        self.entries.sort_by(|a, b| a.sort_key().partial_cmp(&b.sort_key()).unwrap());
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_sorts_lexicographically_by_r_then_t() {
        let mut c = ScanCollector::default();
        c.push(0.2, 0.1, -1.0);
        c.push(0.1, 0.5, -2.0);
        c.push(0.1, 0.1, -3.0);
        let sorted = c.into_sorted();
        let keys: Vec<(f64, f64)> = sorted.iter().map(|e| e.sort_key()).collect();
        assert_eq!(keys, vec![(0.1, 0.1), (0.1, 0.5), (0.2, 0.1)]);
    }
}
