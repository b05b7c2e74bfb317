use std::path::PathBuf;

use anyhow::Error;
use clap::Parser;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use contribution_tracker::{
    Config, ContributionInput, ExcelSink, GoogleSheetsSink, LimitTable, Report, ReportSink,
    evaluate_all, run_sinks,
};

#[derive(Parser, Debug)]
#[command(name = "contribution-tracker")]
#[command(about = "Calculate remaining HSA and 401(k) contributions against annual limits")]
struct Args {
    /// Plan year to evaluate
    #[arg(long)]
    year: i32,

    /// Amount contributed to the HSA so far in the selected year
    #[arg(long)]
    hsa: Decimal,

    /// Amount contributed to the 401(k) so far in the selected year
    #[arg(long)]
    k401: Decimal,

    /// HSA is a family plan (individual if not set)
    #[arg(long)]
    family: bool,

    /// Path to the run configuration
    #[arg(short, long, default_value = "input.yaml")]
    config: PathBuf,

    /// Log level when RUST_LOG is not set (debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = Config::load(&args.config)?;
    let table = match &config.limits_file {
        Some(path) => LimitTable::load(path)?,
        None => LimitTable::builtin(),
    };

    let input = ContributionInput::new(args.year, args.hsa, args.k401, args.family)?;
    let statuses = evaluate_all(&input, &table)?;
    for status in &statuses {
        println!("{}: {}", status.kind.label(), status.summary());
    }

    let run_date = OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date();
    let report = Report::new(args.year, &statuses, run_date)?;

    let mut sinks: Vec<Box<dyn ReportSink>> = Vec::new();
    if let Some(dir) = &config.file_path {
        sinks.push(Box::new(ExcelSink::new(dir)));
    }
    if let (Some(url), Some(credentials)) = (&config.google_sheet_url, &config.credentials_file) {
        sinks.push(Box::new(GoogleSheetsSink::new(url, credentials)?));
    }

    // One sink failing must not stop the others; exit non-zero afterwards.
    let failed = run_sinks(&sinks, &report);
    if failed > 0 {
        return Err(Error::msg(format!(
            "{failed} of {} report destinations failed",
            sinks.len()
        )));
    }

    Ok(())
}
