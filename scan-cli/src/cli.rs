//! CLI surface (W4, SPEC_FULL §4.14): exactly the flags in spec §6.4.

use std::path::PathBuf;

use clap::Parser;
use clusters::error::{ClusterError, Result};
use clusters::ScanConfiguration;

/// Bayesian (R, T) cluster scan over 2D SMLM localization data.
#[derive(Parser, Debug)]
#[command(name = "bayes-cluster-scan", version, about)]
pub struct Cli {
    /// Number of σ-grid bins.
    #[arg(long, default_value_t = 11)]
    pub sigma_bins: usize,
    /// Lower σ bound (metres).
    #[arg(long, default_value_t = 0.0)]
    pub sigma_low: f64,
    /// Upper σ bound (metres).
    #[arg(long, default_value_t = 0.1)]
    pub sigma_high: f64,
    /// `size:prob` pairs defining the σ prior curve, interpolated with a
    /// natural cubic spline. Flat prior (`1.0` everywhere) if omitted.
    #[arg(long = "sigma-curve", value_delimiter = ',')]
    pub sigma_curve: Vec<String>,

    /// Number of R-grid bins.
    #[arg(long, default_value_t = 20)]
    pub r_bins: usize,
    /// Lower R bound (metres).
    #[arg(long, default_value_t = 0.01)]
    pub r_low: f64,
    /// Upper R bound (metres).
    #[arg(long, default_value_t = 0.2)]
    pub r_high: f64,

    /// Number of T-grid bins.
    #[arg(long, default_value_t = 20)]
    pub t_bins: usize,
    /// Lower T bound.
    #[arg(long, default_value_t = 0.0)]
    pub t_low: f64,
    /// Upper T bound.
    #[arg(long, default_value_t = 1.0)]
    pub t_high: f64,

    /// Background point probability prior.
    #[arg(long, default_value_t = 0.5)]
    pub pb: f64,
    /// Dirichlet-process concentration parameter.
    #[arg(long, default_value_t = 1.0)]
    pub alpha: f64,

    /// Run structural and log-score cross-checks after every (R, T) point.
    #[arg(long, default_value_t = false)]
    pub validate: bool,

    /// Input localization CSV.
    #[arg(long)]
    pub input_file: PathBuf,
    /// Output JSON path template (`{input}`, `{roi}` substitutions).
    #[arg(long)]
    pub output_file: String,

    /// Optional path to a `ManualRoi` window config (`x,y,w,h`, one per
    /// line); absent means scan the whole input as a single RoI of its
    /// bounding area.
    #[arg(long)]
    pub cfg: Option<PathBuf>,

    /// Single-point clusterization radius; when set with `--t`, runs one
    /// `Clusterize(R, T)` instead of a full scan.
    #[arg(long)]
    pub r: Option<f64>,
    /// Single-point clusterization threshold.
    #[arg(long)]
    pub t: Option<f64>,

    /// Worker thread count; defaults to the number of logical CPUs.
    #[arg(long)]
    pub threads: Option<usize>,
}

impl Cli {
    pub fn worker_threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Parse `--sigma-curve size:prob,size:prob,...` into a natural cubic
    /// spline prior, or a flat `1.0` prior when absent.
    pub fn sigma_prior(&self) -> Result<Box<dyn Fn(f64) -> f64>> {
        if self.sigma_curve.is_empty() {
            return Ok(Box::new(|_| 1.0));
        }
        let mut points = Vec::with_capacity(self.sigma_curve.len());
        for entry in &self.sigma_curve {
            let (size, prob) = entry.split_once(':').ok_or_else(|| {
                ClusterError::InvalidConfig(format!("sigma-curve entry {entry:?} must be formatted size:prob"))
            })?;
            let size: f64 = size.parse().map_err(|_| ClusterError::InvalidConfig(format!("bad size in sigma-curve entry {entry:?}")))?;
            let prob: f64 = prob.parse().map_err(|_| ClusterError::InvalidConfig(format!("bad prob in sigma-curve entry {entry:?}")))?;
            points.push((size, prob));
        }
        let prior = ScanConfiguration::interpolated_prior(&points);
        Ok(Box::new(prior))
    }

    pub fn build_scan_configuration(&self) -> Result<ScanConfiguration> {
        let prior = self.sigma_prior()?;
        ScanConfiguration::new(
            self.sigma_bins,
            self.sigma_low,
            self.sigma_high,
            prior,
            self.r_bins,
            self.r_low,
            self.r_high,
            self.t_bins,
            self.t_low,
            self.t_high,
            self.pb,
            self.alpha,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_required_flags() {
        let cli = Cli::parse_from(["bayes-cluster-scan", "--input-file", "in.csv", "--output-file", "out.json"]);
        assert_eq!(cli.input_file, PathBuf::from("in.csv"));
        assert_eq!(cli.sigma_bins, 11);
        assert!(cli.r.is_none());
    }

    #[test]
    fn sigma_curve_entries_build_a_usable_prior() {
        let cli = Cli::parse_from([
            "bayes-cluster-scan",
            "--input-file",
            "in.csv",
            "--output-file",
            "out.json",
            "--sigma-curve",
            "0:0.1,0.02:1.0,0.05:0.1",
        ]);
        let prior = cli.sigma_prior().unwrap();
        assert!(prior(0.02) > prior(0.0));
    }

    #[test]
    fn malformed_sigma_curve_entry_is_rejected() {
        let cli = Cli::parse_from(["bayes-cluster-scan", "--input-file", "in.csv", "--output-file", "out.json", "--sigma-curve", "bad-entry"]);
        assert!(cli.sigma_prior().is_err());
    }
}
