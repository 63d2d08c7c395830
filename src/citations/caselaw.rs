//! Case-law citation parsing and pinpoint merging.
//!
//! Raw citation strings ("123 So.3d 456, 460") are parsed into volume,
//! reporter, page, and pinpoint pages. Grouping ignores pinpoints: two
//! citations differing only by pinpoint collapse into one record carrying
//! the ordered, de-duplicated union of pinpoints.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

/// "volume reporter page[, pin[, pin...]]" with reporter abbreviations like
/// "So.3d", "F. Supp. 2d", "U.S.".
static CASE_CITATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?P<vol>\d+)\s+(?P<rep>[A-Za-z][A-Za-z0-9.'\s]*?)\s+(?P<page>\d+)(?P<pins>(?:\s*,\s*\d+)*)\s*$",
    )
    .unwrap()
});

/// Non-anchored variant for scanning citations out of running text.
static CASE_SCAN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?P<vol>\d{1,4})\s+(?P<rep>(?:[A-Z][A-Za-z0-9.']*\s?)+?)\s*(?P<page>\d+)(?P<pins>(?:,\s*\d+)*)",
    )
    .unwrap()
});

/// One parsed case-law citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseLawCitation {
    pub raw: String,
    pub volume: u32,
    pub reporter: String,
    pub page: u32,
    /// Pinpoint pages, ascending and de-duplicated.
    pub pinpoints: Vec<u32>,
}

impl CaseLawCitation {
    /// Base-citation grouping key: (volume, reporter, page), ignoring
    /// pinpoints. Reporter comparison is case- and whitespace-insensitive.
    pub fn base_key(&self) -> (u32, String, u32) {
        let reporter = self
            .reporter
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        (self.volume, reporter, self.page)
    }
}

/// Parse a single raw citation string.
///
/// Returns `None` for strings that do not carry the volume/reporter/page
/// shape; callers decide whether unparsed strings are worth surfacing.
pub fn parse_case_citation(raw: &str) -> Option<CaseLawCitation> {
    let cap = CASE_CITATION_REGEX.captures(raw)?;
    let mut pinpoints: Vec<u32> = cap
        .name("pins")
        .map(|m| {
            m.as_str()
                .split(',')
                .filter_map(|p| p.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default();
    pinpoints.sort_unstable();
    pinpoints.dedup();

    Some(CaseLawCitation {
        raw: raw.trim().to_string(),
        volume: cap.name("vol")?.as_str().parse().ok()?,
        reporter: cap.name("rep")?.as_str().trim().to_string(),
        page: cap.name("page")?.as_str().parse().ok()?,
        pinpoints,
    })
}

/// Parse a batch of raw strings, dropping unparseable entries.
pub fn parse_case_citations<'a, I>(raw_strings: I) -> Vec<CaseLawCitation>
where
    I: IntoIterator<Item = &'a str>,
{
    raw_strings
        .into_iter()
        .filter_map(parse_case_citation)
        .collect()
}

/// Scan running motion text for case citations and return the
/// deduplicated set.
pub fn extract_case_citations(text: &str) -> Vec<CaseLawCitation> {
    let parsed = CASE_SCAN_REGEX
        .captures_iter(text)
        .filter_map(|cap| parse_case_citation(cap.get(0).unwrap().as_str()))
        .collect();
    dedup_case_citations(parsed)
}

/// Merge citations that share a base key into one record per authority.
///
/// First-seen order of base keys is preserved; pinpoints are merged into an
/// ascending de-duplicated union. Idempotent.
pub fn dedup_case_citations(citations: Vec<CaseLawCitation>) -> Vec<CaseLawCitation> {
    let mut order: Vec<(u32, String, u32)> = Vec::new();
    let mut merged: HashMap<(u32, String, u32), CaseLawCitation> = HashMap::new();

    for citation in citations {
        let key = citation.base_key();
        match merged.get_mut(&key) {
            Some(existing) => {
                existing.pinpoints.extend(&citation.pinpoints);
                existing.pinpoints.sort_unstable();
                existing.pinpoints.dedup();
            }
            None => {
                order.push(key.clone());
                merged.insert(key, citation);
            }
        }
    }

    order
        .into_iter()
        .map(|key| merged.remove(&key).unwrap())
        .collect()
}
