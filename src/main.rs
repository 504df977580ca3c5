use clap::Parser;
use knowrag::cli::handle_aggregate_command;
use knowrag::cli::handle_config_command;
use knowrag::cli::handle_ingest_command;
use knowrag::cli::handle_init_command;
use knowrag::cli::handle_recovery_command;
use knowrag::cli::handle_search_command;
use knowrag::cli::print_error;
use knowrag::cli::Cli;
use knowrag::cli::Commands;
use knowrag::config::AppConfig;
use knowrag::KnowRag;
use knowrag::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("[{}] {}", e.error_type(), e));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    if cli.verbose {
        knowrag::logging::init_logging_with_level("debug")?;
    } else {
        knowrag::logging::init_logging_with_config(Some(&config))?;
    }
    info!("Configuration loaded successfully");

    if let Commands::Config = cli.command {
        return handle_config_command(&config);
    }

    let knowrag = KnowRag::from_config(config).await?;

    // Ctrl-C cancels in-flight work; partial results are still reported
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Init { force } => handle_init_command(&knowrag, force).await,
        Commands::Ingest {
            batch_id,
            project,
            location,
            json,
        } => handle_ingest_command(&knowrag, batch_id, project, location, json, &cancel).await,
        Commands::Search {
            campaign,
            query,
            limit,
            min_score,
            filters,
            json,
        } => {
            handle_search_command(
                &knowrag, campaign, query, limit, min_score, filters, json, &cancel,
            )
            .await
        }
        Commands::Aggregate {
            campaign,
            filters,
            json,
        } => handle_aggregate_command(&knowrag, campaign, filters, json, &cancel).await,
        Commands::Recovery(command) => handle_recovery_command(&knowrag, command).await,
        Commands::Config => handle_config_command(knowrag.config()),
    }
}
