use clap::Args;

use taskwarden_core::config::Config;
use taskwarden_core::decision::{DecisionEngine, DecisionInput};
use taskwarden_core::delegation::ConfigRoster;
use taskwarden_core::item::WorkItem;
use taskwarden_core::scoring::ScoringEngine;

use crate::common::{parse_at, read_json};

#[derive(Args)]
pub struct DecideArgs {
    /// Path to a work-item JSON file ("-" for stdin)
    pub file: String,
    /// Treat the owning user as available
    #[arg(long)]
    pub available: bool,
    /// Treat the owner as opted into automation (in addition to config)
    #[arg(long)]
    pub opted_in: bool,
    /// Next known free window (RFC3339), for the reschedule path
    #[arg(long)]
    pub free_window: Option<String>,
    /// Emit the decision as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: DecideArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let item: WorkItem = read_json(&args.file)?;
    let now = chrono::Utc::now();

    let scoring = ScoringEngine::with_weights(config.scoring.clone());
    let scores = scoring.score(&item, now);

    let opted_in = args.opted_in || config.guardrails.opted_in_owners.contains(&item.owner);
    let roster = ConfigRoster::from_entries(&config.teammates);
    let engine = DecisionEngine::new(config.rules, config.guardrails, roster);

    let input = DecisionInput {
        item: &item,
        scores: &scores,
        user_available: args.available,
        availability_known: true,
        automation_opted_in: opted_in,
        next_free_window: args.free_window.as_deref().map(parse_at).transpose()?,
        now,
    };
    let outcome = engine.decide(&input);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.decision)?);
        return Ok(());
    }

    let decision = &outcome.decision;
    println!(
        "action: {}  (CS {:.1} / AFS {:.1})",
        decision.action, decision.criticality, decision.feasibility
    );
    println!("rule:   {}", decision.matched_rule);
    println!("why:    {}", decision.reasoning);
    if let Some(delegate) = &decision.delegate {
        println!("delegate: {delegate}");
    }
    for check in &decision.guardrails {
        let mark = if check.passed { "pass" } else { "FAIL" };
        println!("  guardrail {:<18} {}", check.name, mark);
    }
    Ok(())
}
