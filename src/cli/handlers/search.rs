//! Campaign search and aggregate handlers

use tokio_util::sync::CancellationToken;

use crate::cli::commands::FilterArgs;
use crate::cli::output::print_campaign_aggregate;
use crate::cli::output::print_search_output;
use crate::retrieval::SearchFilters;
use crate::retrieval::SearchRequest;
use crate::KnowRag;
use crate::Result;

impl From<FilterArgs> for SearchFilters {
    fn from(args: FilterArgs) -> Self {
        Self {
            platforms: args.platforms,
            sentiments: args.sentiments,
            date_from: args.from,
            date_to: args.to,
            risk_levels: args.risk_levels,
            min_engagement: args.min_engagement,
            aspects: args.aspects,
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_search_command(
    knowrag: &KnowRag,
    campaign_id: String,
    query: String,
    limit: Option<usize>,
    min_score: Option<f32>,
    filters: FilterArgs,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let request = SearchRequest {
        campaign_id,
        query,
        filters: filters.into(),
        limit,
        min_score,
    };

    let output = knowrag.search(&request, cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_search_output(&request.query, &output);
    }
    Ok(())
}

pub async fn handle_aggregate_command(
    knowrag: &KnowRag,
    campaign_id: String,
    filters: FilterArgs,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let aggregate = knowrag
        .aggregate(&campaign_id, &filters.into(), cancel)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&aggregate)?);
    } else {
        print_campaign_aggregate(&aggregate);
    }
    Ok(())
}
