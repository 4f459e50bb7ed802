//! CSV localization ingest (W1, SPEC_FULL §4.11) and RoI window selection
//! (W2, SPEC_FULL §4.12, manual-window half).

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use clusters::error::{ClusterError, Result};
use clusters::Point;

/// A CSV row after unit conversion (nm -> m) and σ-bound filtering, before
/// RoI assignment.
#[derive(Clone, Copy, Debug)]
pub struct RawLocalization {
    pub x: f64,
    pub y: f64,
    pub sigma: f64,
    pub uncertainty_xy: f64,
}

/// A centred rectangular window used to select localizations before
/// building an `RoI` (spec §6.1, `ManualRoi_*`).
#[derive(Clone, Copy, Debug)]
pub struct ManualRoi {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

const SIGMA_MIN_NM: f64 = 100.0;
const SIGMA_MAX_NM: f64 = 300.0;
const NM_TO_M: f64 = 1e-9;

/// Load a localization CSV, splitting the file into byte ranges across
/// `threads` workers. Columns (1-indexed): x[nm] (3), y[nm] (4), sigma[nm]
/// (5), uncertainty_xy[nm] (10). One header line is assumed and skipped by
/// every worker that starts at byte 0; later workers skip forward to the
/// next newline so no record is split between chunks (spec §6.2, §9).
pub fn load_csv(path: impl AsRef<Path>, threads: usize) -> Result<Vec<RawLocalization>> {
    let path = path.as_ref();
    let threads = threads.max(1);
    let file_len = std::fs::metadata(path)
        .map_err(ClusterError::IoFailure)?
        .len();

    if file_len == 0 {
        return Ok(Vec::new());
    }

    let chunk_len = (file_len / threads as u64).max(1);
    let mut ranges = Vec::with_capacity(threads);
    for t in 0..threads {
        let start = t as u64 * chunk_len;
        if start >= file_len {
            break;
        }
        let end = if t + 1 == threads { file_len } else { (start + chunk_len).min(file_len) };
        ranges.push((start, end));
    }

    let results: Vec<Result<Vec<RawLocalization>>> = std::thread::scope(|scope| {
        let handles: Vec<_> = ranges
            .into_iter()
            .enumerate()
            .map(|(worker, (start, end))| scope.spawn(move || load_csv_range(path, start, end, worker == 0)))
            .collect();
        handles.into_iter().map(|h| h.join().expect("csv worker panicked")).collect()
    });

    let mut out = Vec::new();
    for r in results {
        out.extend(r?);
    }
    Ok(out)
}

fn load_csv_range(path: &Path, start: u64, end: u64, is_first_chunk: bool) -> Result<Vec<RawLocalization>> {
    let mut file = File::open(path).map_err(ClusterError::IoFailure)?;
    file.seek(SeekFrom::Start(start)).map_err(ClusterError::IoFailure)?;
    let mut reader = BufReader::new(file);

    if is_first_chunk {
        // Skip the header line.
        let mut header = String::new();
        reader.read_line(&mut header).map_err(ClusterError::IoFailure)?;
    } else {
        // Discard the partial record this chunk starts mid-way through.
        let mut discard = Vec::new();
        reader.read_until(b'\n', &mut discard).map_err(ClusterError::IoFailure)?;
    }

    let mut out = Vec::new();
    let mut pos = reader.stream_position().map_err(ClusterError::IoFailure)?.max(start);
    let mut line_number = 0usize;

    loop {
        if pos >= end {
            break;
        }
        let mut line = String::new();
        let n = reader.read_line(&mut line).map_err(ClusterError::IoFailure)?;
        if n == 0 {
            break; // EOF: the last chunk's range may overrun the true end of file.
        }
        pos += n as u64;
        line_number += 1;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }
        if let Some(row) = parse_row(line, line_number, path)? {
            out.push(row);
        }
    }
    Ok(out)
}

fn parse_row(line: &str, line_number: usize, path: &Path) -> Result<Option<RawLocalization>> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 10 {
        return Err(ClusterError::MalformedInput(format!(
            "{}:{line_number}: expected at least 10 columns, found {}",
            path.display(),
            fields.len()
        )));
    }

    let parse = |idx: usize, name: &str| -> Result<f64> {
        fields[idx].trim().parse::<f64>().map_err(|_| {
            ClusterError::MalformedInput(format!("{}:{line_number}: could not parse {name} ({:?})", path.display(), fields[idx]))
        })
    };

    let x_nm = parse(2, "x[nm]")?;
    let y_nm = parse(3, "y[nm]")?;
    let sigma_nm = parse(4, "sigma[nm]")?;
    let uncertainty_nm = parse(9, "uncertainty_xy[nm]")?;

    if sigma_nm < SIGMA_MIN_NM || sigma_nm > SIGMA_MAX_NM {
        return Ok(None);
    }

    Ok(Some(RawLocalization {
        x: x_nm * NM_TO_M,
        y: y_nm * NM_TO_M,
        sigma: sigma_nm, // kept in nm: Point uses s in the same units as x, y below.
        uncertainty_xy: uncertainty_nm * NM_TO_M,
    }))
}

/// Build the `Point`s for a manual rectangular window (spec §6.1,
/// `ManualRoi_*`): everything within `|x| < w/2, |y| < h/2` of the window
/// centre, re-expressed relative to that centre.
pub fn select_manual_roi(locs: &[RawLocalization], window: &ManualRoi) -> (Vec<Point>, f64) {
    let half_w = window.w / 2.0;
    let half_h = window.h / 2.0;
    let points: Vec<Point> = locs
        .iter()
        .filter_map(|loc| {
            let dx = loc.x - window.x;
            let dy = loc.y - window.y;
            if dx.abs() < half_w && dy.abs() < half_h {
                Some(Point::new(dx, dy, loc.uncertainty_xy))
            } else {
                None
            }
        })
        .collect();
    (points, window.w * window.h)
}

/// Parse a `--cfg` file of `x,y,w,h` lines (metres) into one `ManualRoi`
/// window per non-empty, non-comment line.
pub fn load_manual_roi_config(path: impl AsRef<Path>) -> Result<Vec<ManualRoi>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(ClusterError::IoFailure)?;
    let mut out = Vec::new();
    for (line_number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(ClusterError::MalformedInput(format!(
                "{}:{}: expected 4 comma-separated fields (x,y,w,h), found {}",
                path.display(),
                line_number + 1,
                fields.len()
            )));
        }
        let parse = |s: &str| -> Result<f64> {
            s.parse::<f64>().map_err(|_| ClusterError::MalformedInput(format!("{}:{}: could not parse {s:?}", path.display(), line_number + 1)))
        };
        out.push(ManualRoi { x: parse(fields[0])?, y: parse(fields[1])?, w: parse(fields[2])?, h: parse(fields[3])? });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_sample_csv(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("sample.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "frame,id,x[nm],y[nm],sigma[nm],bg,intensity,chi2,unused,uncertainty_xy[nm]").unwrap();
        writeln!(f, "1,1,100.0,200.0,150.0,0,0,0,0,5.0").unwrap();
        writeln!(f, "1,2,110.0,210.0,50.0,0,0,0,0,5.0").unwrap(); // filtered: sigma < 100
        writeln!(f, "1,3,120.0,220.0,350.0,0,0,0,0,5.0").unwrap(); // filtered: sigma > 300
        writeln!(f, "1,4,130.0,230.0,200.0,0,0,0,0,6.0").unwrap();
        path
    }

    #[test]
    fn loads_and_filters_by_sigma_bounds() {
        let dir = std::env::temp_dir().join(format!("clusters-csv-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = write_sample_csv(&dir);

        let rows = load_csv(&path, 1).unwrap();
        assert_eq!(rows.len(), 2);
        assert!((rows[0].x - 100.0e-9).abs() < 1e-15);
        assert!((rows[0].y - 200.0e-9).abs() < 1e-15);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn manual_roi_window_filters_and_recentres() {
        let locs = vec![
            RawLocalization { x: 0.0, y: 0.0, sigma: 150.0, uncertainty_xy: 5e-9 },
            RawLocalization { x: 10.0, y: 10.0, sigma: 150.0, uncertainty_xy: 5e-9 },
        ];
        let window = ManualRoi { x: 0.0, y: 0.0, w: 2.0, h: 2.0 };
        let (points, area) = select_manual_roi(&locs, &window);
        assert_eq!(points.len(), 1);
        assert_eq!(area, 4.0);
    }

    #[test]
    fn manual_roi_config_parses_lines_and_skips_comments() {
        let dir = std::env::temp_dir().join(format!("clusters-cfg-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rois.cfg");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "# window id 1").unwrap();
        writeln!(f, "0.0, 0.0, 1.0, 1.0").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "2.0,2.0,0.5,0.5").unwrap();
        let windows = load_manual_roi_config(&path).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].x, 2.0);
        std::fs::remove_dir_all(&dir).ok();
    }
}
