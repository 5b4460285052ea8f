//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Pipeline;
use crate::rag::format_context_for_display;
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    question: &str,
    channel: Option<&str>,
    model: Option<String>,
    mut settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    if let Some(model) = model {
        settings.rag.model = model;
    }

    let spinner = Output::spinner("Loading models...");
    let pipeline = Pipeline::new(settings).await;
    let engine = match pipeline {
        Ok(pipeline) => pipeline.build_rag_engine().await,
        Err(e) => Err(e),
    };
    let engine = match engine {
        Ok(engine) => engine,
        Err(e) => {
            spinner.finish_and_clear();
            Output::error(&format!("Failed to start: {}", e));
            return Err(e.into());
        }
    };

    spinner.set_message("Searching transcripts...");
    let result = engine.answer_query(question, channel).await;
    spinner.finish_and_clear();

    match result {
        Ok(response) => {
            println!("\n{}\n", response.answer);

            if !response.context.is_empty() {
                Output::header("Sources");
                println!("{}", format_context_for_display(&response.context));
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to generate answer: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
