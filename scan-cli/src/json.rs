//! JSON report writing (W3, SPEC_FULL §4.13): scan output and cluster output,
//! five significant digits in scientific notation, `{input}`/`{roi}` path
//! templating.

use std::path::{Path, PathBuf};

use geo::{Area, BoundingRect, ConvexHull, LineString, Polygon};
use serde::Serialize;
use serde_json::value::RawValue;

use clusters::error::{ClusterError, Result};
use clusters::{RoIProxy, ScanEntry};

/// Formats `x` with five significant digits in scientific notation
/// (`d.ddddeNN` / `-d.ddddeNN`).
fn format_sci(x: f64) -> String {
    format!("{x:.4e}")
}

/// Wraps `format_sci` in a `RawValue` so it's written byte-for-byte into the
/// output rather than being re-parsed and re-formatted by `serde_json`'s own
/// float writer.
fn sci_raw(x: f64) -> Box<RawValue> {
    RawValue::from_string(format_sci(x)).expect("format_sci always produces a valid JSON number literal")
}

/// One row of the scan report (SPEC_FULL §4.13): `{"r","t","logP"}`.
#[derive(Serialize)]
pub struct ScanEntryJson {
    r: Box<RawValue>,
    t: Box<RawValue>,
    #[serde(rename = "logP")]
    log_p: Box<RawValue>,
}

/// One row of the cluster report (SPEC_FULL §4.13): `{"localizations","area",
/// "perimeter","centroid_x","centroid_y"}`.
#[derive(Serialize)]
pub struct ClusterJson {
    localizations: usize,
    area: Box<RawValue>,
    perimeter: Box<RawValue>,
    centroid_x: Box<RawValue>,
    centroid_y: Box<RawValue>,
}

/// One row of a cluster report (SPEC_FULL §4.13, `ClusterWrapper`).
#[derive(Clone, Copy, Debug)]
pub struct ClusterSummary {
    pub localizations: usize,
    pub area: f64,
    pub perimeter: f64,
    pub centroid_x: f64,
    pub centroid_y: f64,
}

/// Compute one `ClusterSummary` per non-empty cluster in `proxy`, from the
/// convex hull of its member positions (absolute, i.e. offset by the RoI's
/// centre).
pub fn summarize_clusters(proxy: &mut RoIProxy) -> Vec<ClusterSummary> {
    let (cx, cy) = proxy.roi().centre;
    let roots = proxy.final_clusters();
    let n_clusters = proxy.clusters().len();

    let mut members: Vec<Vec<(f64, f64)>> = vec![Vec::new(); n_clusters];
    for (idx, root) in roots.iter().enumerate() {
        if let Some(root) = root {
            let p = &proxy.roi().points[idx];
            members[*root as usize].push((p.x + cx, p.y + cy));
        }
    }

    members
        .into_iter()
        .filter(|pts| !pts.is_empty())
        .map(|pts| {
            let n = pts.len();
            if n < 3 {
                let cx = pts.iter().map(|&(x, _)| x).sum::<f64>() / n as f64;
                let cy = pts.iter().map(|&(_, y)| y).sum::<f64>() / n as f64;
                return ClusterSummary { localizations: n, area: 0.0, perimeter: 0.0, centroid_x: cx, centroid_y: cy };
            }
            let mut coords: Vec<(f64, f64)> = pts.clone();
            coords.push(coords[0]);
            let ring = LineString::from(coords);
            let polygon = Polygon::new(ring, vec![]);
            let hull = polygon.convex_hull();
            let area = hull.unsigned_area();
            let perimeter = hull.exterior().coords().zip(hull.exterior().coords().skip(1)).map(|(a, b)| ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()).sum();
            let rect = hull.bounding_rect();
            let (centroid_x, centroid_y) = rect.map(|r| (r.center().x, r.center().y)).unwrap_or_else(|| {
                let cx = pts.iter().map(|&(x, _)| x).sum::<f64>() / n as f64;
                let cy = pts.iter().map(|&(_, y)| y).sum::<f64>() / n as f64;
                (cx, cy)
            });
            ClusterSummary { localizations: n, area, perimeter, centroid_x, centroid_y }
        })
        .collect()
}

/// Build the `{"r","t","logP"}` array format (SPEC_FULL §4.13) from a sorted
/// `ScanEntry` slice.
pub fn scan_entries_to_json(entries: &[ScanEntry]) -> Vec<ScanEntryJson> {
    entries.iter().map(|e| ScanEntryJson { r: sci_raw(e.r), t: sci_raw(e.t), log_p: sci_raw(e.log_p) }).collect()
}

/// Build the `{"localizations","area","perimeter","centroid_x","centroid_y"}`
/// array format (SPEC_FULL §4.13) from cluster summaries.
pub fn clusters_to_json(summaries: &[ClusterSummary]) -> Vec<ClusterJson> {
    summaries
        .iter()
        .map(|s| ClusterJson {
            localizations: s.localizations,
            area: sci_raw(s.area),
            perimeter: sci_raw(s.perimeter),
            centroid_x: sci_raw(s.centroid_x),
            centroid_y: sci_raw(s.centroid_y),
        })
        .collect()
}

/// Substitute `{input}` (input-file stem) and `{roi}` (RoI id) in an output
/// path template (SPEC_FULL §4.13).
pub fn render_output_path(template: &str, input_file: &Path, roi_id: &str) -> PathBuf {
    let stem = input_file.file_stem().and_then(|s| s.to_str()).unwrap_or("input");
    PathBuf::from(template.replace("{input}", stem).replace("{roi}", roi_id))
}

/// Write a JSON value to `path`, creating parent directories as needed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(ClusterError::IoFailure)?;
        }
    }
    let text = serde_json::to_string_pretty(value).map_err(|e| ClusterError::MalformedInput(e.to_string()))?;
    std::fs::write(path, text).map_err(ClusterError::IoFailure)
}
