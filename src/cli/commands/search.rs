//! Search command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Pipeline;
use anyhow::Result;

/// Run the search command.
pub async fn run_search(
    query: &str,
    channel: Option<&str>,
    limit: Option<usize>,
    mut settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Search, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    if let Some(limit) = limit {
        settings.retrieval.results_to_retrieve = limit;
    }
    let pipeline = Pipeline::new(settings).await?;
    let retriever = pipeline.build_retriever()?;

    let spinner = Output::spinner("Searching...");
    let results = retriever.retrieve(query, channel).await;
    spinner.finish_and_clear();

    match results {
        Ok(chunks) => {
            if chunks.is_empty() {
                Output::warning("No results found matching your query.");
            } else {
                Output::success(&format!("Found {} results ({} metric)", chunks.len(), retriever.metric()));

                for chunk in &chunks {
                    Output::search_result(
                        &chunk.title,
                        &chunk.publish_time,
                        chunk.score,
                        &chunk.content,
                        &chunk.url(),
                    );
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
