use clap::Subcommand;
use serde_json::Value;

use taskwarden_core::triggers::{apply_event, normalize, SqliteTriggerStore};

use crate::common::read_json;

#[derive(Subcommand)]
pub enum WebhookAction {
    /// Normalize and apply a change-event payload from a file
    Ingest {
        /// Event source (e.g. "github", "jira")
        source: String,
        /// Path to the payload JSON file ("-" for stdin)
        file: String,
    },
}

pub fn run(action: WebhookAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        WebhookAction::Ingest { source, file } => {
            let payload: Value = read_json(&file)?;
            let event = normalize(&source, &payload)?;
            let store = SqliteTriggerStore::open_default()?;
            let outcome = apply_event(&store, &event, chrono::Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }
    Ok(())
}
