mod app;

use std::path::PathBuf;

use clap::Parser;
use raman_review::analysis::verdict::RunMode;

/// Point-by-point Raman mineral detection with operator review.
#[derive(Parser, Debug)]
#[command(name = "raman-review", version, about)]
pub struct Cli {
    /// Scan file (.csv, .json or .parquet)
    #[arg(long)]
    pub scan: PathBuf,

    /// Settings file (.csv or .json)
    #[arg(long)]
    pub settings: PathBuf,

    /// Directory holding the stowed-arm noise tables
    #[arg(long, default_value = "Noise")]
    pub noise_dir: PathBuf,

    /// Root directory for result tables
    #[arg(long, default_value = "Results")]
    pub results: PathBuf,

    /// Override the run mode from the settings (automatic, semiautomatic, manual)
    #[arg(long)]
    pub mode: Option<RunMode>,

    /// Name for the result directory; defaults to the scan file stem
    #[arg(long)]
    pub name: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    app::run(cli)
}
