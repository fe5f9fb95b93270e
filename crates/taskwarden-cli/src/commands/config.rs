use clap::Subcommand;

use taskwarden_core::config::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file if none exists
    Init,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            println!("{}", Config::default_path().display());
        }
        ConfigAction::Init => {
            let path = Config::default_path();
            if path.exists() {
                println!("config already exists at {}", path.display());
                return Ok(());
            }
            Config::default().save_to(&path)?;
            println!("wrote defaults to {}", path.display());
        }
    }
    Ok(())
}
