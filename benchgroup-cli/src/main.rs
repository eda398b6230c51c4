mod output;
mod suites;

use anyhow::{Context, Result};
use benchgroup_runtime::{
    baseline_bundle_basic, registry, run_and_report, BenchmarkConfig, ConsolePrinter, MemoryPrinter, Printer,
    ReportError, RunOptions, Suite, SuiteRunner,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// benchgroup CLI arguments
#[derive(Parser, Debug)]
#[command(name = "benchgroup")]
#[command(author, version, about = "benchgroup - nested benchmark groups with a live result table")]
struct Cli {
    /// Optional subcommand (Run, List, Baseline); defaults to Run
    #[command(subcommand)]
    command: Option<Commands>,

    /// Redraws per second of the live table; `inf` redraws on every update
    #[arg(long, global = true)]
    framerate: Option<f64>,

    /// Redraw after every sample instead of after every finished benchmark
    #[arg(long, global = true)]
    print_on_cycle: bool,

    /// Print the final results as JSON instead of drawing the table
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (defaults to benchgroup.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Samples per benchmark before the time budget may end it
    #[arg(long, global = true)]
    min_samples: Option<usize>,

    /// Time budget per benchmark in milliseconds
    #[arg(long, global = true)]
    max_time_ms: Option<u64>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Run every registered suite followed by the baseline bundle (default)
    Run,
    /// Print the declared groups and tests without running them
    List,
    /// Run only the baseline bundle
    Baseline,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("benchgroup_runtime=debug,benchgroup=debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("benchgroup_runtime=info,benchgroup=info")
            .with_writer(std::io::stderr)
            .init();
    }

    let config = load_config(&cli)?;
    let command = cli.command.unwrap_or(Commands::Run);
    let suite = declare(command).context("Failed to declare benchmark suites")?;

    match command {
        Commands::List => {
            output::print_tree(suite.forest());
            Ok(())
        }
        Commands::Run | Commands::Baseline => run(&cli, config, suite).await,
    }
}

/// Load configuration with priority: CLI flags > env vars > config file > defaults
fn load_config(cli: &Cli) -> Result<BenchmarkConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = BenchmarkConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => BenchmarkConfig::load(),
    };

    if let Some(framerate) = cli.framerate {
        config.reporter.framerate = framerate;
    }
    if cli.print_on_cycle {
        config.reporter.print_on_cycle = true;
    }
    if let Some(min_samples) = cli.min_samples {
        config.measurement.min_samples = min_samples;
    }
    if let Some(max_time_ms) = cli.max_time_ms {
        config.measurement.max_time_ms = max_time_ms;
    }

    config
        .measurement
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid measurement configuration")?;

    Ok(config)
}

fn declare(command: Commands) -> Result<Suite> {
    let mut suite = Suite::new();

    if command != Commands::Baseline {
        let count = registry::collect(&mut suite)?;
        tracing::debug!(count, "registered suites declared");
    }
    baseline_bundle_basic(&mut suite)?;

    Ok(suite)
}

async fn run(cli: &Cli, config: BenchmarkConfig, suite: Suite) -> Result<()> {
    let runner = SuiteRunner::with_config(suite, config.measurement.clone());

    let printer: Arc<dyn Printer> = if cli.json {
        Arc::new(MemoryPrinter::new())
    } else {
        output::print_banner(&runner, &config);
        Arc::new(ConsolePrinter::new())
    };

    let outcome = run_and_report(&runner, &config.reporter, RunOptions::default(), printer).await;

    if cli.json {
        let results = runner.extract_results();
        println!(
            "{}",
            serde_json::to_string_pretty(&results).context("Failed to serialize results")?
        );
    }

    match outcome {
        Ok(true) => {
            if !cli.json {
                output::print_success(&runner);
            }
            Ok(())
        }
        Ok(false) => {
            output::print_nothing_to_run();
            Ok(())
        }
        Err(err) => {
            // the live table already printed the failing benchmark
            let shown = !cli.json && matches!(err, ReportError::Run(_));
            output::print_failure(&err, shown);
            std::process::exit(1);
        }
    }
}
