use std::env;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use phi_rec::{load_report, reconstruct_report, IterationTable, Params};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod chart;
mod export;

/// Environment variable naming an optional JSON file of [`Params`] overrides.
const CONFIG_ENV: &str = "PHI_REC_CONFIG";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Chart per-group Phi contributions from a PEST run record",
    long_about = None
)]
struct Cli {
    /// PEST case name, without the .rec extension
    run: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let params = match env::var_os(CONFIG_ENV) {
        Some(path) => load_params(Path::new(&path))?,
        None => Params::default(),
    };
    run(&cli.run, &params)
}

fn load_params(path: &Path) -> Result<Params> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let params: Params = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid phi-rec config", path.display()))?;
    debug!("Loaded parameters from {}: {:?}", path.display(), params);
    Ok(params)
}

fn run(case: &str, params: &Params) -> Result<()> {
    let report_path = params.report_path(case);
    let text = load_report(&report_path)?;
    let table = reconstruct_report(&text, params)
        .with_context(|| format!("failed to reconstruct {}", report_path.display()))?;
    info!(
        "Reconstructed {} iterations across {} groups from {}",
        table.len(),
        table.groups().len(),
        report_path.display()
    );
    log_phi_summary(&table);

    let chart_path = params.chart_path(case);
    let size = (params.chart_width, params.chart_height);
    if let Err(err) = chart::render_phi_chart(&table, case, &chart_path, size) {
        discard_partial(&chart_path);
        return Err(err.context(format!("failed to render {}", chart_path.display())));
    }
    info!("Wrote plot: {}", chart_path.display());

    let table_path = params.table_path(case);
    if let Err(err) = export::write_table_csv(&table, &table_path) {
        discard_partial(&chart_path);
        discard_partial(&table_path);
        return Err(err);
    }
    info!("Wrote data table: {}", table_path.display());
    Ok(())
}

/// Remove an output left behind by a failed run.
fn discard_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!("Could not remove {}: {}", path.display(), err),
    }
}

fn log_phi_summary(table: &IterationTable) {
    let net = table.net_phi_column();
    let (Some(first), Some(last)) = (net.first(), net.last()) else {
        return;
    };
    let reduction = if *first != 0.0 {
        (first - last) / first * 100.0
    } else {
        0.0
    };
    info!(
        "NetPhi {:.6e} at iteration 1, {:.6e} at iteration {} ({:.1}% reduction)",
        first,
        last,
        net.len(),
        reduction
    );

    if let Some(row) = table.rows().last() {
        let top = table
            .groups()
            .iter()
            .zip(&row.values)
            .max_by(|a, b| a.1.total_cmp(b.1));
        if let Some((group, value)) = top {
            let share = if *last != 0.0 { value / last * 100.0 } else { 0.0 };
            info!(
                "Largest final contributor: {} ({:.6e}, {:.1}% of NetPhi)",
                group, value, share
            );
        }
    }
}
