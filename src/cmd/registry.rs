use anyhow::Result;
use console::style;
use std::path::Path;

use gavel::config::EngineConfig;
use gavel::phase::PhaseCode;
use gavel::tier::ExecutionTier;

/// Print the full phase-by-tier routing table.
pub fn run(routes_file: Option<&Path>) -> Result<()> {
    let config = match routes_file {
        Some(path) => EngineConfig::with_route_overrides(path)?,
        None => EngineConfig::default(),
    };

    println!(
        "{:<6} {:<24} {:<14} {:<22} {:>9} {:>7} {:>6}",
        "Phase", "Name", "Tier", "Model", "Reasoning", "Tokens", "Batch"
    );
    for phase in PhaseCode::ALL {
        for tier in ExecutionTier::ALL {
            let route = config.registry.lookup(phase, tier)?;
            let reasoning = route
                .reasoning_budget
                .map(|b| b.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<6} {:<24} {:<14} {:<22} {:>9} {:>7} {:>6}",
                style(phase.code()).bold(),
                phase.name(),
                tier.as_str(),
                route.model,
                reasoning,
                route.max_tokens,
                route.citation_batch_size,
            );
        }
    }
    Ok(())
}
