use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use taskwarden_core::config::Config;
use taskwarden_core::context::ContextProvider;
use taskwarden_core::delegation::{ConfigRoster, Roster};
use taskwarden_core::notifier::{Notifier, TracingNotifier};
use taskwarden_core::triggers::{
    SqliteTriggerStore, SystemClock, TriggerScheduler, TriggerStore,
};

use crate::common::FileContextProvider;

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, default_value_t = 3141)]
    pub port: u16,
    /// Path to a LiveContext JSON snapshot standing in for the
    /// calendar/tracker clients; omit to run with unknown context
    #[arg(long)]
    pub context: Option<PathBuf>,
}

pub fn run(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let store: Arc<dyn TriggerStore> = Arc::new(SqliteTriggerStore::open_default()?);
    let context: Arc<dyn ContextProvider> = Arc::new(FileContextProvider::new(args.context));
    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
    let roster: Arc<dyn Roster> = Arc::new(ConfigRoster::from_entries(&config.teammates));

    let scheduler = Arc::new(TriggerScheduler::new(
        &config,
        store,
        context,
        notifier,
        roster,
        Arc::new(SystemClock),
    ));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(taskwarden_server::serve(scheduler, args.port))?;
    Ok(())
}
