//! phrasegen CLI: run the generation pipeline or inspect remaining work.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use phrasegen::config::Config;
use phrasegen::engine::{DispatchConfig, Dispatcher};
use phrasegen::llm::OllamaClient;
use phrasegen::source::WorkSource;
use phrasegen::telemetry::{TelemetryConfig, init_telemetry};
use phrasegen::writer::BufferedLogWriter;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "phrasegen", about = "Generate example phrases for ranked characters")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate phrases for every remaining character
    Run {
        /// Highest rank to process (overrides PHRASEGEN_CUTOFF)
        #[arg(long)]
        cutoff: Option<u32>,
        /// Maximum concurrent requests (overrides PHRASEGEN_CONCURRENCY)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Show how much work is left
    Status {
        /// Highest rank to consider (overrides PHRASEGEN_CUTOFF)
        #[arg(long)]
        cutoff: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    let telemetry = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "phrasegen".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    let outcome = match cli.command {
        Command::Run {
            cutoff,
            concurrency,
        } => {
            if let Some(cutoff) = cutoff {
                config.cutoff_rank = cutoff;
            }
            if let Some(concurrency) = concurrency {
                anyhow::ensure!(concurrency > 0, "--concurrency must be at least 1");
                config.max_concurrency = concurrency;
            }
            cmd_run(config).await
        }
        Command::Status { cutoff } => {
            if let Some(cutoff) = cutoff {
                config.cutoff_rank = cutoff;
            }
            cmd_status(config).await
        }
    };

    // Export the run's tail before the guard shuts the providers down.
    telemetry.force_flush();
    outcome
}

async fn cmd_run(config: Config) -> anyhow::Result<()> {
    let source = WorkSource::new(&config.input_path, &config.processed_path);
    let work = source.load(config.cutoff_rank).await?;
    if work.is_empty() {
        println!("Nothing to do: every character up to rank {} is processed.", config.cutoff_rank);
        return Ok(());
    }

    let results = BufferedLogWriter::open_append(&config.output_path, config.flush_interval).await?;
    let processed =
        BufferedLogWriter::open_append(&config.processed_path, config.flush_interval).await?;

    let client = OllamaClient::from_config(&config)?;
    info!(model = client.model(), url = %config.ollama_url, "using generation service");

    let dispatcher = Dispatcher::new(
        Arc::new(client),
        results.sink(),
        processed.sink(),
        DispatchConfig {
            max_concurrency: config.max_concurrency,
            failure_reporting: config.failure_reporting,
        },
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling in-flight requests");
            on_signal.cancel();
        }
    });

    let summary = dispatcher.run(work, cancel).await;

    // Both writers drain before the process exits, even if one fails.
    let results_written = results.stop().await;
    let processed_written = processed.stop().await;
    let results_written = results_written?;
    let processed_written = processed_written?;

    println!(
        "Completed {} (timeouts {}, failures {}, cancelled {}, not started {}).",
        summary.completed, summary.timed_out, summary.failed, summary.cancelled, summary.not_started
    );
    println!(
        "Wrote {results_written} phrase line(s) to {} and {processed_written} marker(s) to {}.",
        config.output_path.display(),
        config.processed_path.display()
    );
    Ok(())
}

async fn cmd_status(config: Config) -> anyhow::Result<()> {
    let source = WorkSource::new(&config.input_path, &config.processed_path);
    let status = source.status(config.cutoff_rank).await?;

    println!("Input:      {}", config.input_path.display());
    println!("Rows:       {} ({} malformed)", status.rows, status.malformed);
    println!("Cutoff:     {}", config.cutoff_rank);
    println!("Eligible:   {}", status.eligible);
    println!("Processed:  {}", status.processed);
    println!("Remaining:  {}", status.remaining);
    Ok(())
}
