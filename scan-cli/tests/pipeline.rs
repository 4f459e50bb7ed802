//! End-to-end ingest -> scan -> JSON report pipeline (SPEC_FULL §8).

use std::io::Write;

use clusters::callback::ScanCollector;
use clusters::RoI;
use scan_cli::ingest::{self, ManualRoi};
use scan_cli::json;

fn write_square_csv(path: &std::path::Path) {
    let mut f = std::fs::File::create(path).unwrap();
    writeln!(f, "frame,id,x[nm],y[nm],sigma[nm],bg,intensity,chi2,unused,uncertainty_xy[nm]").unwrap();
    for &(x, y) in &[(100.0, 100.0), (100.0, -100.0), (-100.0, 100.0), (-100.0, -100.0)] {
        writeln!(f, "1,1,{x},{y},150.0,0,0,0,0,5.0").unwrap();
    }
}

#[test]
fn csv_ingest_feeds_a_scan_whose_json_report_round_trips() {
    let dir = std::env::temp_dir().join(format!("scan-cli-pipeline-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let csv_path = dir.join("square.csv");
    write_square_csv(&csv_path);

    let locs = ingest::load_csv(&csv_path, 1).unwrap();
    assert_eq!(locs.len(), 4);

    let window = ManualRoi { x: 0.0, y: 0.0, w: 1.0e-6, h: 1.0e-6 };
    let (points, area) = ingest::select_manual_roi(&locs, &window);
    assert_eq!(points.len(), 4);

    let mut roi = RoI::new("square", points, (0.0, 0.0), area);
    let config = clusters::ScanConfiguration::new(1, 0.02, 0.02, |_| 1.0, 1, 1.5e-7, 1.5e-7, 1, 0.0, 0.0, 0.2, 20.0).unwrap();

    let collector = std::sync::Mutex::new(ScanCollector::default());
    roi.scan_rt(&config, 1, false, |_proxy, r, t| {
        collector.lock().unwrap().push(r, t, _proxy.log_p());
    })
    .unwrap();
    let entries = collector.into_inner().unwrap().into_sorted();
    assert_eq!(entries.len(), 1);

    let value = json::scan_entries_to_json(&entries);
    let out_path = dir.join("out.json");
    json::write_json(&out_path, &value).unwrap();

    let text = std::fs::read_to_string(&out_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    let array = parsed.as_array().unwrap();
    assert_eq!(array.len(), 1);
    assert!(array[0].get("logP").is_some());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn single_clusterization_reports_one_convex_cluster_for_the_square() {
    let dir = std::env::temp_dir().join(format!("scan-cli-pipeline-cluster-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let csv_path = dir.join("square.csv");
    write_square_csv(&csv_path);

    let locs = ingest::load_csv(&csv_path, 2).unwrap();
    let window = ManualRoi { x: 0.0, y: 0.0, w: 1.0e-6, h: 1.0e-6 };
    let (points, area) = ingest::select_manual_roi(&locs, &window);
    let mut roi = RoI::new("square", points, (0.0, 0.0), area);

    let mut proxy = roi.clusterize(1.5e-7, 0.0, 2).unwrap();
    let summaries = json::summarize_clusters(&mut proxy);
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].localizations, 4);
    assert!(summaries[0].area > 0.0);

    std::fs::remove_dir_all(&dir).ok();
}
