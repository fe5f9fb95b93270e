use std::path::PathBuf;
use std::sync::Arc;

use clap::Subcommand;

use taskwarden_core::config::Config;
use taskwarden_core::delegation::ConfigRoster;
use taskwarden_core::triggers::{
    SqliteTriggerStore, SystemClock, TriggerScheduler, TriggerStore,
};

use crate::common::{parse_at, FileContextProvider, PrintNotifier};

#[derive(Subcommand)]
pub enum TriggerAction {
    /// Schedule (or re-plan) a re-evaluation
    Schedule {
        /// Work-item reference
        item: String,
        /// Owning user id
        user: String,
        /// When to evaluate (RFC3339); defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// Cancel a pending trigger
    Cancel {
        /// Trigger id
        id: String,
    },
    /// List stored triggers
    List {
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one scheduler tick now
    Tick {
        /// Path to a LiveContext JSON snapshot standing in for the
        /// calendar/tracker clients
        #[arg(long)]
        context: Option<PathBuf>,
    },
}

type CliScheduler =
    TriggerScheduler<SqliteTriggerStore, FileContextProvider, PrintNotifier, ConfigRoster>;

fn make_scheduler(
    config: &Config,
    context: Option<PathBuf>,
) -> Result<CliScheduler, Box<dyn std::error::Error>> {
    let store = SqliteTriggerStore::open_default()?;
    Ok(TriggerScheduler::new(
        config,
        store,
        FileContextProvider::new(context),
        PrintNotifier,
        ConfigRoster::from_entries(&config.teammates),
        Arc::new(SystemClock),
    ))
}

pub fn run(action: TriggerAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    match action {
        TriggerAction::Schedule { item, user, at } => {
            let scheduler = make_scheduler(&config, None)?;
            let at = match at {
                Some(raw) => parse_at(&raw)?,
                None => chrono::Utc::now(),
            };
            let id = scheduler.schedule(item, at, user)?;
            println!("trigger scheduled: {id}");
        }
        TriggerAction::Cancel { id } => {
            let scheduler = make_scheduler(&config, None)?;
            if scheduler.cancel(&id)? {
                println!("trigger cancelled: {id}");
            } else {
                println!("trigger already fired or cancelled: {id}");
            }
        }
        TriggerAction::List { json } => {
            let scheduler = make_scheduler(&config, None)?;
            let triggers = scheduler.store().all()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&triggers)?);
            } else {
                for t in triggers {
                    println!(
                        "{}  {:<10} {:<12} {} @ {}",
                        t.id,
                        format!("{:?}", t.state).to_lowercase(),
                        t.item_ref,
                        t.user,
                        t.scheduled_at.to_rfc3339()
                    );
                }
            }
        }
        TriggerAction::Tick { context } => {
            let scheduler = make_scheduler(&config, context)?;
            let summary = scheduler.tick()?;
            println!(
                "tick: {} due, {} fired, {} skipped, {} failed",
                summary.due, summary.fired, summary.skipped, summary.failed
            );
        }
    }
    Ok(())
}
