//! Statutory citation extraction over motion text.
//!
//! An ordered table of (pattern, citation family, jurisdiction) entries is
//! applied in registration order. Deduplication key is (family, article),
//! case-insensitive, first match wins. Extending coverage to a new
//! jurisdiction means appending table entries, not adding branches.
//!
//! This extractor is advisory only: `verified` is always false here —
//! authority checking is a separate, external concern.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

/// Jurisdiction a statutory citation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jurisdiction {
    Louisiana,
    California,
    Federal,
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Jurisdiction::Louisiana => "louisiana",
            Jurisdiction::California => "california",
            Jurisdiction::Federal => "federal",
        };
        f.write_str(s)
    }
}

/// Citation family within a jurisdiction's code scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationFamily {
    LaCodeCivilProcedure,
    LaCivilCode,
    LaRevisedStatutes,
    CalCodeCivilProcedure,
    CalCivilCode,
    UnitedStatesCode,
    FedRulesCivilProcedure,
}

impl fmt::Display for CitationFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CitationFamily::LaCodeCivilProcedure => "la_ccp",
            CitationFamily::LaCivilCode => "la_cc",
            CitationFamily::LaRevisedStatutes => "la_rs",
            CitationFamily::CalCodeCivilProcedure => "cal_ccp",
            CitationFamily::CalCivilCode => "cal_civ",
            CitationFamily::UnitedStatesCode => "usc",
            CitationFamily::FedRulesCivilProcedure => "frcp",
        };
        f.write_str(s)
    }
}

/// One extracted statutory citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatutoryCitation {
    pub raw: String,
    pub jurisdiction: Jurisdiction,
    pub family: CitationFamily,
    pub article: String,
    /// Always false in this version; extraction is advisory, not
    /// authority-checked.
    pub verified: bool,
}

impl StatutoryCitation {
    /// Case-insensitive deduplication key.
    pub fn dedup_key(&self) -> (CitationFamily, String) {
        (self.family, self.article.to_lowercase())
    }
}

/// A table entry: the article is captured either as a single `art` group or
/// as `title` + `sec` groups joined with a colon.
struct PatternEntry {
    regex: Regex,
    family: CitationFamily,
    jurisdiction: Jurisdiction,
}

static PATTERN_TABLE: LazyLock<Vec<PatternEntry>> = LazyLock::new(|| {
    let entry = |pattern: &str, family, jurisdiction| PatternEntry {
        regex: Regex::new(pattern).unwrap(),
        family,
        jurisdiction,
    };
    vec![
        // Louisiana Code of Civil Procedure: "La. C.C.P. Art. 966"
        entry(
            r"(?i)La\.?\s*C\.?\s*C\.?\s*P\.?\s*[Aa]rts?\.?\s*(?P<art>\d+(?:\.\d+)?)",
            CitationFamily::LaCodeCivilProcedure,
            Jurisdiction::Louisiana,
        ),
        // Louisiana Civil Code: "La. C.C. Art. 2315" (after CCP so the
        // longer form wins the overlap)
        entry(
            r"(?i)La\.?\s*C\.?\s*C\.?\s*[Aa]rts?\.?\s*(?P<art>\d+(?:\.\d+)?)",
            CitationFamily::LaCivilCode,
            Jurisdiction::Louisiana,
        ),
        // Louisiana Revised Statutes: "La. R.S. 9:2794"
        entry(
            r"(?i)La\.?\s*R\.?\s*S\.?\s*(?P<title>\d+):(?P<sec>\d+(?:\.\d+)?)",
            CitationFamily::LaRevisedStatutes,
            Jurisdiction::Louisiana,
        ),
        // California Code of Civil Procedure: "Cal. Civ. Proc. § 437c" or
        // "Cal. Code Civ. Proc. § 437c"
        entry(
            r"(?i)Cal\.?\s*(?:Code\s*)?Civ\.?\s*Proc\.?\s*(?:Code\s*)?§?\s*(?P<art>\d+[a-z]?(?:\.\d+)?)",
            CitationFamily::CalCodeCivilProcedure,
            Jurisdiction::California,
        ),
        // California Civil Code: "Cal. Civ. Code § 1714"
        entry(
            r"(?i)Cal\.?\s*Civ\.?\s*Code\s*§?\s*(?P<art>\d+[a-z]?(?:\.\d+)?)",
            CitationFamily::CalCivilCode,
            Jurisdiction::California,
        ),
        // United States Code: "42 U.S.C. § 1983"
        entry(
            r"(?i)(?P<title>\d+)\s*U\.?\s*S\.?\s*C\.?\s*§?\s*(?P<sec>\d+[a-z]?(?:\([a-z0-9]\))*)",
            CitationFamily::UnitedStatesCode,
            Jurisdiction::Federal,
        ),
        // Federal Rules of Civil Procedure: "Fed. R. Civ. P. 56(c)"
        entry(
            r"(?i)Fed\.?\s*R\.?\s*Civ\.?\s*P\.?\s*(?P<art>\d+(?:\([a-z0-9]\))*)",
            CitationFamily::FedRulesCivilProcedure,
            Jurisdiction::Federal,
        ),
    ]
});

/// Extract statutory citations from motion text.
///
/// Patterns run in registration order; the first entry to claim a
/// (family, article) key wins and later matches on that key are dropped.
pub fn extract_statutory(text: &str) -> Vec<StatutoryCitation> {
    let mut seen: HashSet<(CitationFamily, String)> = HashSet::new();
    let mut out = Vec::new();

    for entry in PATTERN_TABLE.iter() {
        for cap in entry.regex.captures_iter(text) {
            let article = match (cap.name("art"), cap.name("title"), cap.name("sec")) {
                (Some(art), _, _) => art.as_str().to_string(),
                (None, Some(title), Some(sec)) => {
                    format!("{}:{}", title.as_str(), sec.as_str())
                }
                _ => continue,
            };
            let citation = StatutoryCitation {
                raw: cap.get(0).unwrap().as_str().trim().to_string(),
                jurisdiction: entry.jurisdiction,
                family: entry.family,
                article,
                verified: false,
            };
            if seen.insert(citation.dedup_key()) {
                out.push(citation);
            }
        }
    }
    out
}

/// Deduplicate an already-extracted citation list by (family, article),
/// keeping the first occurrence. Idempotent.
pub fn dedup_statutory(citations: Vec<StatutoryCitation>) -> Vec<StatutoryCitation> {
    let mut seen = HashSet::new();
    citations
        .into_iter()
        .filter(|c| seen.insert(c.dedup_key()))
        .collect()
}

/// Group citations by jurisdiction, preserving extraction order per group.
pub fn group_by_jurisdiction(
    citations: &[StatutoryCitation],
) -> BTreeMap<Jurisdiction, Vec<&StatutoryCitation>> {
    let mut groups: BTreeMap<Jurisdiction, Vec<&StatutoryCitation>> = BTreeMap::new();
    for citation in citations {
        groups.entry(citation.jurisdiction).or_default().push(citation);
    }
    groups
}

/// Group citations by family, preserving extraction order per group.
pub fn group_by_family(
    citations: &[StatutoryCitation],
) -> BTreeMap<CitationFamily, Vec<&StatutoryCitation>> {
    let mut groups: BTreeMap<CitationFamily, Vec<&StatutoryCitation>> = BTreeMap::new();
    for citation in citations {
        groups.entry(citation.family).or_default().push(citation);
    }
    groups
}
