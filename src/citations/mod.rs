//! Citation extraction and deduplication.
//!
//! Two structurally separate pipelines feed the phase quality gates:
//! - [`statutory`] — per-jurisdiction pattern tables over motion text
//! - [`caselaw`] — volume/reporter/page parsing with pinpoint merging
//!
//! The pipelines share nothing but this parent module: statutory citations
//! dedup by (family, article) and case-law citations by (volume, reporter,
//! page), and the two record kinds are never cross-merged.
//!
//! [`search`] is an unrelated pure scorer used for free-text search over
//! order records; it is independent of citation verification.

pub mod caselaw;
pub mod search;
pub mod statutory;

pub use caselaw::{dedup_case_citations, parse_case_citation, CaseLawCitation};
pub use search::similarity;
pub use statutory::{
    dedup_statutory, extract_statutory, CitationFamily, Jurisdiction, StatutoryCitation,
};
