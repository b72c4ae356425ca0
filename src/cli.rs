use crate::config::types::{Deadline, SupervisorConfig, SupervisorError};
use crate::core::outcome::{Outcome, WorkError};
use crate::core::supervisor::Supervisor;
use crate::core::timer::Timer;
use crate::observability::sink::{FanoutSink, JsonLinesSink, LogSink};
use crate::workload::prime::{nth_prime, PrimeError};
use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const EXIT_COMPLETED: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_TIMED_OUT: i32 = 124;
pub const EXIT_TERMINATION_FAILURE: i32 = 125;

const DEFAULT_LABEL: &str = "get_nth_prime";

/// Finds the n-th prime number within a time quota.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Prime number index (1-based)
    #[arg(short = 'n', allow_negative_numbers = true)]
    pub index: i64,
    /// Time quota in seconds
    #[arg(short = 't', default_value_t = 5.0, allow_negative_numbers = true)]
    pub timeout: f64,
    /// Label attached to log records and events
    #[arg(long)]
    pub label: Option<String>,
    /// Append log records to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
    /// Append one JSON line per execution event to this file
    #[arg(long, value_name = "PATH")]
    pub events: Option<PathBuf>,
    /// Supervisor settings (JSON)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Parse arguments, run the search under supervision and return the process
/// exit code.
pub fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let (code, _) = Timer::profile("get_wrapped_finder", || execute(&cli));
    code
}

pub fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} :: {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            record.level(),
            record.args()
        )
    });

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("failed to initialise logging")?;
    Ok(())
}

/// Exit code for a failed `run` call.
pub fn exit_code_for(err: &SupervisorError) -> i32 {
    match err {
        SupervisorError::Config(_) => EXIT_CONFIG,
        SupervisorError::TerminationFailure { .. } => EXIT_TERMINATION_FAILURE,
        _ => EXIT_FAILED,
    }
}

/// Exit code for a classified outcome.
pub fn exit_code_for_outcome<T, E>(outcome: &Outcome<T, E>) -> i32 {
    match outcome {
        Outcome::Completed { .. } => EXIT_COMPLETED,
        Outcome::Failed { .. } => EXIT_FAILED,
        Outcome::TimedOut { .. } => EXIT_TIMED_OUT,
    }
}

fn execute(cli: &Cli) -> Result<i32> {
    let supervisor = match build_supervisor(cli) {
        Ok(supervisor) => supervisor,
        Err(e) => return Ok(report_error(&e)),
    };

    let deadline = match Deadline::from_secs_f64(cli.timeout) {
        Ok(deadline) => deadline,
        Err(e) => return Ok(report_error(&e)),
    };

    let index = cli.index;
    let label = cli.label.as_deref().unwrap_or(DEFAULT_LABEL);
    let outcome: Outcome<u64, PrimeError> =
        match supervisor.run_with_deadline(Some(label), || nth_prime(index), deadline) {
            Ok(outcome) => outcome,
            Err(e) => return Ok(report_error(&e)),
        };

    match &outcome {
        Outcome::Completed { value, .. } => println!("\t{}-th prime number is {}", index, value),
        Outcome::Failed {
            error: WorkError::Returned(e),
            ..
        } => println!("\t{}", e),
        Outcome::Failed { error, .. } => eprintln!("\tSearch failed: {}", error.describe()),
        Outcome::TimedOut { .. } => {}
    }

    Ok(exit_code_for_outcome(&outcome))
}

fn build_supervisor(cli: &Cli) -> crate::config::types::Result<Supervisor> {
    let config = match &cli.config {
        Some(path) => SupervisorConfig::load(path)?,
        None => SupervisorConfig::default(),
    };

    let mut sinks = FanoutSink::default();
    sinks.push(Arc::new(LogSink::with_fallback_label(DEFAULT_LABEL)));
    if let Some(path) = &cli.events {
        sinks.push(Arc::new(JsonLinesSink::open(path).map_err(|e| {
            SupervisorError::Config(format!("cannot open event file {}: {}", path.display(), e))
        })?));
    }

    Supervisor::builder()
        .config(config)
        .sink(Arc::new(sinks))
        .build()
}

fn report_error(err: &SupervisorError) -> i32 {
    eprintln!("Error: {}", err);
    exit_code_for(err)
}
