use clap::Subcommand;

use taskwarden_core::config::Config;
use taskwarden_core::delegation::{ConfigRoster, Roster};

#[derive(Subcommand)]
pub enum RosterAction {
    /// Show the configured teammate roster
    List {
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: RosterAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        RosterAction::List { json } => {
            let config = Config::load()?;
            let roster = ConfigRoster::from_entries(&config.teammates);
            let teammates = roster.teammates();
            if json {
                println!("{}", serde_json::to_string_pretty(&teammates)?);
                return Ok(());
            }
            if teammates.is_empty() {
                println!("no teammates configured");
                return Ok(());
            }
            for t in teammates {
                println!(
                    "{:<12} workload {:<3} availability {:<3} paths {:?} components {:?}",
                    t.id, t.workload, t.availability, t.path_prefixes, t.components
                );
            }
        }
    }
    Ok(())
}
