//! Batch ingestion handler

use tokio_util::sync::CancellationToken;

use crate::cli::output::print_batch_summary;
use crate::cli::output::print_info;
use crate::cli::output::print_warning;
use crate::ingest::BatchRequest;
use crate::KnowRag;
use crate::Result;

pub async fn handle_ingest_command(
    knowrag: &KnowRag,
    batch_id: String,
    project_id: String,
    location: String,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let request = BatchRequest {
        batch_id,
        project_id,
        location,
    };
    if !json {
        print_info(&format!("📥 Ingesting {} ...", request.location));
    }

    let summary = knowrag.ingest(&request, cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_batch_summary(&summary);
    }
    if cancel.is_cancelled() {
        print_warning("Ingestion was interrupted; undispatched records are reported as CANCELLED");
    }
    Ok(())
}
