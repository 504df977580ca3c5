//! CLI command definitions and argument parsing

use chrono::DateTime;
use chrono::Utc;
use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(name = "knowrag")]
#[command(about = "knowrag CLI for batch ingestion, campaign search and index recovery")]
#[command(version)]
pub struct Cli {
    /// Enable verbose debug logging (default: info level)
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize database schema and indexes
    Init {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Ingest one newline-delimited batch file
    Ingest {
        /// Batch identifier recorded on tracking rows
        #[arg(long)]
        batch_id: String,
        /// Project (partition) every record belongs to
        #[arg(long)]
        project: String,
        /// Batch location, s3://bucket/key
        location: String,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Semantic search within a campaign
    Search {
        /// Campaign ID
        campaign: String,
        /// Search query
        query: String,
        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
        /// Minimum similarity score (0.0-1.0)
        #[arg(long)]
        min_score: Option<f32>,
        #[command(flatten)]
        filters: FilterArgs,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Campaign-wide sentiment, platform and negative-aspect breakdown
    Aggregate {
        /// Campaign ID
        campaign: String,
        #[command(flatten)]
        filters: FilterArgs,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Failure recovery commands
    #[command(subcommand)]
    Recovery(RecoveryCommands),
    /// Show current configuration
    Config,
}

#[derive(clap::Args, Debug, Default)]
pub struct FilterArgs {
    /// Only these platforms (repeatable)
    #[arg(long = "platform")]
    pub platforms: Vec<String>,
    /// Only these overall sentiments (repeatable)
    #[arg(long = "sentiment")]
    pub sentiments: Vec<String>,
    /// Only these risk levels (repeatable)
    #[arg(long = "risk")]
    pub risk_levels: Vec<String>,
    /// Require every listed aspect (repeatable)
    #[arg(long = "aspect")]
    pub aspects: Vec<String>,
    /// Content created at or after (RFC 3339)
    #[arg(long)]
    pub from: Option<DateTime<Utc>>,
    /// Content created at or before (RFC 3339)
    #[arg(long)]
    pub to: Option<DateTime<Utc>>,
    /// Minimum engagement score
    #[arg(long)]
    pub min_engagement: Option<f64>,
}

#[derive(Subcommand)]
pub enum RecoveryCommands {
    /// Requeue failed records that have retries left
    RetryFailed {
        #[arg(long, default_value = "3")]
        max_retries: i32,
        #[arg(short, long, default_value = "100")]
        limit: i64,
    },
    /// Flag records stuck in PENDING as failed
    Reconcile {
        /// Minutes a record may stay PENDING
        #[arg(long, default_value = "30")]
        stale_minutes: i64,
        #[arg(short, long, default_value = "100")]
        limit: i64,
    },
    /// Indexing statistics
    Stats {
        /// Restrict to one project
        #[arg(short, long)]
        project: Option<String>,
        /// Export statistics to JSON
        #[arg(short, long)]
        export: Option<String>,
    },
    /// Most recent dead letters
    DeadLetters {
        #[arg(short, long)]
        project: Option<String>,
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
}
