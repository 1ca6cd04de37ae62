mod http_attacker;

use std::path::PathBuf;
use std::sync::Arc;

use attackctl::config::{self, GeneratorConfig};
use attackctl::error::AppResult;
use attackctl::registry::AttackerRegistry;
use attackctl::shutdown;
use attackctl::sinks::{CallLogWriter, ScalingCsvWriter};
use attackctl::suite::{self, SuiteRunParams, SuiteStatus};
use clap::Parser;

use http_attacker::HttpAttacker;

/// Runs a suite of load-test handles against the configured targets.
#[derive(Debug, Parser)]
#[command(name = "attackctl", version, about)]
struct Cli {
    /// Path to the suite config (YAML or JSON; §6).
    suite: PathBuf,

    /// Path to the host/generator config (YAML or JSON; §6). Defaults to
    /// built-in defaults when omitted.
    #[arg(long)]
    generator_config: Option<PathBuf>,

    /// Directory reports are written to (§6).
    #[arg(long, default_value = "reports")]
    report_dir: PathBuf,

    /// Path to the scaling CSV appended to by validation replays (§4.6).
    #[arg(long)]
    scaling_csv: Option<PathBuf>,

    /// Path to the per-call log CSV (§6). Omit to skip per-call logging.
    #[arg(long)]
    call_log: Option<PathBuf>,

    /// Raise the default log level to debug.
    #[arg(short, long)]
    verbose: bool,

    /// Disable ANSI colour in log output.
    #[arg(long)]
    no_color: bool,
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let generator_config = match cli.generator_config.as_deref() {
        Some(path) => config::load_generator_config(path)?,
        None => GeneratorConfig::default(),
    };

    attackctl::logger::init_logging(cli.verbose, cli.no_color, Some(&generator_config.logging.level));

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let status = runtime.block_on(run(&cli, &generator_config))?;

    std::process::exit(status.exit_code());
}

async fn run(cli: &Cli, generator_config: &GeneratorConfig) -> AppResult<SuiteStatus> {
    let suite = config::load_suite_config(&cli.suite)?;

    let mut registry = AttackerRegistry::new();
    registry.register("http", HttpAttacker::factory(reqwest::Client::new()));

    let scaling_csv_path = cli.scaling_csv.clone().unwrap_or_else(config::default_scaling_csv_path);
    let scaling_csv = ScalingCsvWriter::open(scaling_csv_path)?;
    let call_log = cli
        .call_log
        .clone()
        .map(CallLogWriter::open)
        .transpose()?
        .map(Arc::new);

    let (shutdown_tx, shutdown_rx) = shutdown::shutdown_channel();
    let signal_handle = shutdown::setup_signal_shutdown_handler(&shutdown_tx);

    let params = SuiteRunParams {
        registry: &registry,
        report_dir: &cli.report_dir,
        handle_threshold_percent: generator_config.checks.handle_threshold_percent,
        scaling_csv: &scaling_csv,
        external: None,
        custom_stops: std::collections::HashMap::new(),
        call_log,
        shutdown_rx,
    };

    let status = suite::run_suite(&suite, &params).await?;
    signal_handle.abort();
    Ok(status)
}
