//! Index command implementation.

use crate::cli::{IndexAction, Output};
use crate::config::Settings;
use crate::index::{build_index, drop_index, refresh_index, BuildOutcome};
use crate::store::CorpusStore;
use anyhow::Result;

/// Run the index command.
pub fn run_index(action: &IndexAction, settings: Settings) -> Result<()> {
    let store = CorpusStore::new(&settings.sqlite_path(), settings.embedding.dimensions)?;
    let mut params = settings.index_params()?;

    match action {
        IndexAction::Build { name } => {
            if let Some(name) = name {
                params.name = name.clone();
            }
            let spinner = Output::spinner(&format!("Building index {}...", params.name));
            let outcome = build_index(&store, &params);
            spinner.finish_and_clear();

            match outcome? {
                BuildOutcome::Created { indexed } => {
                    Output::success(&format!("Built index {} over {} chunks", params.name, indexed));
                }
                BuildOutcome::AlreadyExists => {
                    let added = refresh_index(&store, &params.name)?;
                    Output::info(&format!(
                        "Index {} already exists, {} new chunks added",
                        params.name, added
                    ));
                }
            }
        }

        IndexAction::Drop { name } => {
            let name = name.as_deref().unwrap_or(&params.name);
            if drop_index(&store, name)? {
                Output::success(&format!("Dropped index {}", name));
            } else {
                Output::info(&format!("Index {} does not exist", name));
            }
        }
    }

    Ok(())
}
