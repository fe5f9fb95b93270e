use clap::Args;

use taskwarden_core::config::Config;
use taskwarden_core::item::WorkItem;
use taskwarden_core::scoring::ScoringEngine;

use crate::common::read_json;

#[derive(Args)]
pub struct ScoreArgs {
    /// Path to a work-item JSON file ("-" for stdin)
    pub file: String,
    /// Emit the full breakdown as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ScoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let item: WorkItem = read_json(&args.file)?;
    let engine = ScoringEngine::with_weights(config.scoring);
    let scores = engine.score(&item, chrono::Utc::now());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&scores)?);
        return Ok(());
    }

    println!("item: {} ({})", item.id, item.title);
    println!("criticality:  {:.1}", scores.criticality);
    for factor in &scores.breakdown.criticality {
        println!("  {:<14} {:+.1}", factor.name, factor.points);
    }
    println!("feasibility:  {:.1}", scores.feasibility);
    for factor in &scores.breakdown.feasibility {
        println!("  {:<14} {:+.1}", factor.name, factor.points);
    }
    Ok(())
}
