use clap::{Parser, Subcommand};

mod commands;
mod common;

#[derive(Parser)]
#[command(name = "taskwarden", version, about = "Taskwarden decision layer CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a work item (criticality / automation feasibility)
    Score(commands::score::ScoreArgs),
    /// Decide what happens to a work item
    Decide(commands::decide::DecideArgs),
    /// Trigger management
    Trigger {
        #[command(subcommand)]
        action: commands::trigger::TriggerAction,
    },
    /// Webhook payload ingestion
    Webhook {
        #[command(subcommand)]
        action: commands::webhook::WebhookAction,
    },
    /// Teammate roster
    Roster {
        #[command(subcommand)]
        action: commands::roster::RosterAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Run the webhook/scheduling server
    Serve(commands::serve::ServeArgs),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Score(args) => commands::score::run(args),
        Commands::Decide(args) => commands::decide::run(args),
        Commands::Trigger { action } => commands::trigger::run(action),
        Commands::Webhook { action } => commands::webhook::run(action),
        Commands::Roster { action } => commands::roster::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Serve(args) => commands::serve::run(args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
