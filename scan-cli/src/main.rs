//! Entry point: parse CLI flags, ingest CSV localizations, build RoIs, run
//! either a full (R, T) scan or a single clusterization, and write JSON
//! reports (SPEC_FULL §4.11–§4.15).

use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use clusters::callback::ScanCollector;
use clusters::RoI;

use scan_cli::cli::Cli;
use scan_cli::ingest::{self, ManualRoi};
use scan_cli::json::{self, ClusterSummary};

fn main() -> Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let threads = cli.worker_threads();
    let locs = ingest::load_csv(&cli.input_file, threads).with_context(|| format!("loading {}", cli.input_file.display()))?;
    log::info!("loaded {} localizations from {}", locs.len(), cli.input_file.display());

    let windows = match &cli.cfg {
        Some(path) => ingest::load_manual_roi_config(path).with_context(|| format!("reading RoI config {}", path.display()))?,
        None => vec![bounding_window(&locs)],
    };

    for (idx, window) in windows.iter().enumerate() {
        let roi_id = format!("roi{idx}");
        let (points, area) = ingest::select_manual_roi(&locs, window);
        let mut roi = RoI::new(roi_id.clone(), points, (window.x, window.y), area);
        log::info!("RoI {roi_id}: {} localizations, area {area:.3e}", roi.points.len());

        if let (Some(r), Some(t)) = (cli.r, cli.t) {
            run_single_clusterization(cli, &mut roi, r, t)?;
        } else {
            run_full_scan(cli, &mut roi)?;
        }
    }

    Ok(())
}

fn bounding_window(locs: &[ingest::RawLocalization]) -> ManualRoi {
    if locs.is_empty() {
        return ManualRoi { x: 0.0, y: 0.0, w: 0.0, h: 0.0 };
    }
    let min_x = locs.iter().map(|l| l.x).fold(f64::INFINITY, f64::min);
    let max_x = locs.iter().map(|l| l.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = locs.iter().map(|l| l.y).fold(f64::INFINITY, f64::min);
    let max_y = locs.iter().map(|l| l.y).fold(f64::NEG_INFINITY, f64::max);
    ManualRoi { x: (min_x + max_x) / 2.0, y: (min_y + max_y) / 2.0, w: max_x - min_x, h: max_y - min_y }
}

fn run_full_scan(cli: &Cli, roi: &mut RoI) -> Result<()> {
    let config = cli.build_scan_configuration().context("building scan configuration")?;
    let threads = cli.worker_threads();

    let total = (config.r_bounds().bins * config.t_bounds().bins) as u64;
    let progress = ProgressBar::new(total);
    progress.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} ({eta})").unwrap_or_else(|_| ProgressStyle::default_bar()));

    let collector: Mutex<ScanCollector> = Mutex::new(ScanCollector::default());
    roi.scan_rt(&config, threads, cli.validate, |proxy, r, t| {
        collector.lock().unwrap().push(r, t, proxy.log_p());
        progress.inc(1);
    })
    .with_context(|| format!("scanning RoI {}", roi.id))?;
    progress.finish_and_clear();

    let entries = collector.into_inner().unwrap().into_sorted();
    let out_path = json::render_output_path(&cli.output_file, &cli.input_file, &roi.id);
    json::write_json(&out_path, &json::scan_entries_to_json(&entries)).with_context(|| format!("writing {}", out_path.display()))?;
    log::info!("wrote {} scan entries to {}", entries.len(), out_path.display());
    Ok(())
}

fn run_single_clusterization(cli: &Cli, roi: &mut RoI, r: f64, t: f64) -> Result<()> {
    let threads = cli.worker_threads();
    let mut proxy = roi.clusterize(r, t, threads).with_context(|| format!("clusterizing RoI {} at R={r}, T={t}", roi.id))?;
    let summaries: Vec<ClusterSummary> = json::summarize_clusters(&mut proxy);

    let out_path = json::render_output_path(&cli.output_file, &cli.input_file, &proxy.roi().id.clone());
    json::write_json(&out_path, &json::clusters_to_json(&summaries)).with_context(|| format!("writing {}", out_path.display()))?;
    log::info!("wrote {} clusters to {}", summaries.len(), out_path.display());
    Ok(())
}
