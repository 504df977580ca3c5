//! Recovery handlers (retry, reconcile, stats, dead letters)

use crate::cli::commands::RecoveryCommands;
use crate::cli::output::print_dead_letters;
use crate::cli::output::print_reconcile_report;
use crate::cli::output::print_retry_report;
use crate::cli::output::print_statistics;
use crate::cli::output::print_success;
use crate::KnowRag;
use crate::Result;

pub async fn handle_recovery_command(knowrag: &KnowRag, command: RecoveryCommands) -> Result<()> {
    let recovery = knowrag.recovery();
    match command {
        RecoveryCommands::RetryFailed { max_retries, limit } => {
            let report = recovery.retry_failed(max_retries, limit).await?;
            print_retry_report(&report);
        }
        RecoveryCommands::Reconcile {
            stale_minutes,
            limit,
        } => {
            let report = recovery
                .reconcile(chrono::Duration::minutes(stale_minutes), limit)
                .await?;
            print_reconcile_report(&report);
        }
        RecoveryCommands::Stats { project, export } => {
            let stats = recovery.statistics(project.as_deref()).await?;
            print_statistics(&stats);

            if let Some(export_path) = export {
                let json = serde_json::to_string_pretty(&stats)?;
                std::fs::write(&export_path, json)?;
                print_success(&format!("Statistics exported to: {export_path}"));
            }
        }
        RecoveryCommands::DeadLetters { project, limit } => {
            let entries = recovery.dead_letters(project.as_deref(), limit).await?;
            print_dead_letters(&entries);
        }
    }
    Ok(())
}
