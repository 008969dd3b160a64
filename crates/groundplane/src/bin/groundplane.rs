use std::{error::Error, path::PathBuf, process::ExitCode};

use clap::Parser;
use groundplane::{CalibrationJob, CalibrationReport};

/// Run a ground-plane calibration job and write the report as JSON.
#[derive(Debug, Parser)]
#[command(author, version, about = "Ground-plane calibration for a tilted depth sensor")]
struct Args {
    /// Path to a JSON calibration job.
    job: PathBuf,

    /// Where to write the report. Overrides `output_path` in the job;
    /// the report goes to stdout when neither is set.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit JSON log lines.
    #[cfg(feature = "tracing")]
    #[arg(long)]
    json_log: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match try_main(&args) {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(report) => {
            eprintln!(
                "calibration failed: {}",
                report.error.as_deref().unwrap_or("unknown error")
            );
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn try_main(args: &Args) -> Result<CalibrationReport, Box<dyn Error>> {
    let job = CalibrationJob::load_json(&args.job)?;
    let report = job.run();

    match args.output.clone().or_else(|| job.output_path()) {
        Some(path) => {
            report.write_json(&path)?;
            log::info!("report written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(report)
}

#[cfg(not(feature = "tracing"))]
fn init_logging(args: &Args) {
    if let Err(err) = groundplane::core::init_with_verbosity(args.verbose) {
        eprintln!("failed to install logger: {err}");
    }
}

#[cfg(feature = "tracing")]
fn init_logging(args: &Args) {
    let level = groundplane::core::level_for_verbosity(args.verbose);
    let _ = tracing_log::LogTracer::init();
    if std::env::var_os("RUST_LOG").is_none() {
        log::set_max_level(level);
    }
    groundplane::core::init_tracing(level, args.json_log);
}
