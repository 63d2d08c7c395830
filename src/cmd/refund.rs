use anyhow::Result;
use console::style;

use gavel::refund::calculate_refund_suggestion;

/// Compute and print the advisory refund for a cancellation.
pub fn run(paid_cents: i64, phase: &str) -> Result<()> {
    let suggestion = calculate_refund_suggestion(paid_cents, phase);

    println!(
        "Suggested refund: {} ({}%)",
        style(format!("${:.2}", suggestion.amount_cents as f64 / 100.0)).bold(),
        suggestion.percentage
    );
    println!("Justification: {}", suggestion.justification);
    if suggestion.needs_manual_review {
        println!("{}", style("Flagged for manual review").yellow());
    }
    Ok(())
}
