use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use gavel::citations::caselaw::extract_case_citations;
use gavel::citations::statutory::{extract_statutory, group_by_jurisdiction};

/// Run both citation pipelines over a motion text file.
pub fn run(file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read motion text: {}", file.display()))?;

    let statutory = extract_statutory(&text);
    println!(
        "{} ({} found)",
        style("Statutory citations").bold(),
        statutory.len()
    );
    for (jurisdiction, citations) in group_by_jurisdiction(&statutory) {
        println!("  {jurisdiction}:");
        for citation in citations {
            println!("    {} {} [{}]", citation.family, citation.article, citation.raw);
        }
    }

    let caselaw = extract_case_citations(&text);
    println!(
        "{} ({} found)",
        style("Case-law citations").bold(),
        caselaw.len()
    );
    for citation in &caselaw {
        let pins = if citation.pinpoints.is_empty() {
            String::new()
        } else {
            format!(
                " at {}",
                citation
                    .pinpoints
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        println!(
            "    {} {} {}{}",
            citation.volume, citation.reporter, citation.page, pins
        );
    }
    Ok(())
}
