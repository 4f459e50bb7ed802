//! RoI construction strategies (W2, SPEC_FULL §4.12): manual window,
//! decoded ImageJ polygon, and automatic blob extraction.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use clusters::error::{ClusterError, Result};
use clusters::{Point, RoI};

use crate::ingest::RawLocalization;

/// A polygon decoded from an ImageJ `.roi` file: ordered vertices in the
/// same coordinate units as the source localizations.
#[derive(Clone, Debug)]
pub struct ImageJPolygon {
    pub vertices: Vec<(f64, f64)>,
}

impl ImageJPolygon {
    /// Decode the subset of the ImageJ RoiDecoder binary format needed for
    /// polygon/freehand ROIs: a big-endian header followed by `n` (x, y)
    /// int16 coordinate pairs, offset by the header's `(left, top)` origin
    /// and rescaled by `scale` (pixels -> the localization file's units).
    /// Grounded in `ImageJ_RoI.hpp`'s field layout.
    pub fn decode(bytes: &[u8], scale: f64) -> Result<Self> {
        if bytes.len() < 64 || &bytes[0..4] != b"Iout" {
            return Err(ClusterError::MalformedInput("not an ImageJ .roi file (bad magic)".into()));
        }
        let read_i16 = |off: usize| -> i16 { i16::from_be_bytes([bytes[off], bytes[off + 1]]) };
        let read_u16 = |off: usize| -> u16 { u16::from_be_bytes([bytes[off], bytes[off + 1]]) };

        let top = read_i16(8) as f64;
        let left = read_i16(10) as f64;
        let n_coords = read_u16(16) as usize;

        let header2_offset = 64usize;
        let coords_offset = header2_offset;
        let x_offset = coords_offset;
        let y_offset = coords_offset + n_coords * 2;

        if bytes.len() < y_offset + n_coords * 2 {
            return Err(ClusterError::MalformedInput("truncated ImageJ .roi coordinate block".into()));
        }

        let mut vertices = Vec::with_capacity(n_coords);
        for k in 0..n_coords {
            let x = read_i16(x_offset + 2 * k) as f64;
            let y = read_i16(y_offset + 2 * k) as f64;
            vertices.push(((x + left) * scale, (y + top) * scale));
        }

        Ok(ImageJPolygon { vertices })
    }

    /// Even-odd point-in-polygon test (ray casting).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[j];
            if (yi > y) != (yj > y) {
                let x_cross = xi + (y - yi) * (xj - xi) / (yj - yi);
                if x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Polygon area via the shoelace formula.
    pub fn area(&self) -> f64 {
        let n = self.vertices.len();
        let mut sum = 0.0;
        for i in 0..n {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[(i + 1) % n];
            sum += xi * yj - xj * yi;
        }
        (sum / 2.0).abs()
    }

    fn centroid(&self) -> (f64, f64) {
        let n = self.vertices.len() as f64;
        let sx: f64 = self.vertices.iter().map(|&(x, _)| x).sum();
        let sy: f64 = self.vertices.iter().map(|&(_, y)| y).sum();
        (sx / n, sy / n)
    }
}

/// Load every `.roi` file in `dir`, keyed by file stem. Stands in for
/// reading from an ImageJ zip archive of the same files (no zip crate
/// appears in the reference corpus; see DESIGN.md).
pub fn load_imagej_polygons(dir: impl AsRef<Path>, scale: f64) -> Result<HashMap<String, ImageJPolygon>> {
    let dir = dir.as_ref();
    let mut out = HashMap::new();
    for entry in fs::read_dir(dir).map_err(ClusterError::IoFailure)? {
        let entry = entry.map_err(ClusterError::IoFailure)?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("roi") {
            continue;
        }
        let mut bytes = Vec::new();
        fs::File::open(&path).map_err(ClusterError::IoFailure)?.read_to_end(&mut bytes).map_err(ClusterError::IoFailure)?;
        let polygon = ImageJPolygon::decode(&bytes, scale)?;
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("roi").to_string();
        out.insert(stem, polygon);
    }
    Ok(out)
}

/// Build an `RoI` from every localization falling inside `polygon`, relative
/// to the polygon's centroid.
pub fn select_imagej_roi(locs: &[RawLocalization], polygon: &ImageJPolygon) -> (Vec<Point>, f64) {
    let (cx, cy) = polygon.centroid();
    let points: Vec<Point> = locs
        .iter()
        .filter(|loc| polygon.contains(loc.x, loc.y))
        .map(|loc| Point::new(loc.x - cx, loc.y - cy, loc.uncertainty_xy))
        .collect();
    (points, polygon.area())
}

/// Automatic blob extraction (SPEC_FULL §4.12): bin localizations into a
/// square density histogram, then flood-fill 4-connected bins whose density
/// exceeds `threshold_fraction` of the peak bin into separate components.
/// A simplified stand-in for the original's Gaussian-blurred threshold
/// search — no convolution step.
pub fn auto_extract_rois(locs: &[RawLocalization], bin_size: f64, threshold_fraction: f64) -> Vec<(Vec<Point>, f64)> {
    if locs.is_empty() {
        return Vec::new();
    }

    let min_x = locs.iter().map(|l| l.x).fold(f64::INFINITY, f64::min);
    let max_x = locs.iter().map(|l| l.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = locs.iter().map(|l| l.y).fold(f64::INFINITY, f64::min);
    let max_y = locs.iter().map(|l| l.y).fold(f64::NEG_INFINITY, f64::max);

    let cols = (((max_x - min_x) / bin_size).ceil() as usize + 1).max(1);
    let rows = (((max_y - min_y) / bin_size).ceil() as usize + 1).max(1);

    let bin_of = |x: f64, y: f64| -> (usize, usize) {
        (((x - min_x) / bin_size) as usize, ((y - min_y) / bin_size) as usize)
    };

    let mut histogram = vec![0u32; cols * rows];
    let mut bins_of_loc = Vec::with_capacity(locs.len());
    for loc in locs {
        let (cx, cy) = bin_of(loc.x, loc.y);
        histogram[cy * cols + cx] += 1;
        bins_of_loc.push((cx, cy));
    }

    let peak = *histogram.iter().max().unwrap_or(&0);
    let threshold = ((peak as f64) * threshold_fraction).ceil() as u32;

    let mut component_id = vec![None; cols * rows];
    let mut next_id = 0usize;
    let mut stack = Vec::new();

    for start in 0..cols * rows {
        if histogram[start] < threshold || component_id[start].is_some() {
            continue;
        }
        let id = next_id;
        next_id += 1;
        component_id[start] = Some(id);
        stack.push(start);
        while let Some(idx) = stack.pop() {
            let (col, row) = (idx % cols, idx / cols);
            let neighbors = [
                (col.wrapping_sub(1), row),
                (col + 1, row),
                (col, row.wrapping_sub(1)),
                (col, row + 1),
            ];
            for (ncol, nrow) in neighbors {
                if ncol >= cols || nrow >= rows {
                    continue;
                }
                let nidx = nrow * cols + ncol;
                if histogram[nidx] >= threshold && component_id[nidx].is_none() {
                    component_id[nidx] = Some(id);
                    stack.push(nidx);
                }
            }
        }
    }

    let mut members: Vec<Vec<&RawLocalization>> = vec![Vec::new(); next_id];
    for (loc, &(cx, cy)) in locs.iter().zip(bins_of_loc.iter()) {
        if let Some(id) = component_id[cy * cols + cx] {
            members[id].push(loc);
        }
    }

    members
        .into_iter()
        .filter(|group| !group.is_empty())
        .map(|group| {
            let n = group.len() as f64;
            let cx = group.iter().map(|l| l.x).sum::<f64>() / n;
            let cy = group.iter().map(|l| l.y).sum::<f64>() / n;
            let points: Vec<Point> = group.iter().map(|l| Point::new(l.x - cx, l.y - cy, l.uncertainty_xy)).collect();
            let area = (cols as f64 * bin_size) * (rows as f64 * bin_size) * (points.len() as f64 / locs.len() as f64).max(bin_size * bin_size);
            (points, area)
        })
        .collect()
}

/// Convenience wrapper turning a (points, area) pair into an `RoI`.
pub fn build_roi(id: impl Into<String>, points: Vec<Point>, area: f64) -> RoI {
    RoI::new(id, points, (0.0, 0.0), area)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_contains_matches_square() {
        let polygon = ImageJPolygon { vertices: vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)] };
        assert!(polygon.contains(5.0, 5.0));
        assert!(!polygon.contains(15.0, 5.0));
        assert!((polygon.area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn auto_extract_splits_two_well_separated_blobs() {
        let mut locs = Vec::new();
        for i in 0..20 {
            locs.push(RawLocalization { x: (i % 5) as f64 * 1e-3, y: (i / 5) as f64 * 1e-3, sigma: 150.0, uncertainty_xy: 5e-9 });
        }
        for i in 0..20 {
            locs.push(RawLocalization { x: 1.0 + (i % 5) as f64 * 1e-3, y: 1.0 + (i / 5) as f64 * 1e-3, sigma: 150.0, uncertainty_xy: 5e-9 });
        }
        let rois = auto_extract_rois(&locs, 5e-3, 0.1);
        assert_eq!(rois.len(), 2);
        for (points, _) in &rois {
            assert_eq!(points.len(), 20);
        }
    }
}
