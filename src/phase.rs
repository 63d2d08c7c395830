//! The fixed 14-step motion generation pipeline.
//!
//! Every phase is identified by a Roman-numeral ordinal code (`I`..`XIV`).
//! Phase codes appear in the routing registry, the cost ledger, the refund
//! table, and persisted execution rows, so parsing and ordering live here
//! and nowhere else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One step of the motion generation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhaseCode {
    #[serde(rename = "I")]
    IntakeReview,
    #[serde(rename = "II")]
    ConflictScreen,
    #[serde(rename = "III")]
    EvidenceInventory,
    #[serde(rename = "IV")]
    ResearchPlan,
    #[serde(rename = "V")]
    StatutoryResearch,
    #[serde(rename = "VI")]
    CaseLawResearch,
    #[serde(rename = "VII")]
    AuthorityOutline,
    #[serde(rename = "VIII")]
    ArgumentDraft,
    #[serde(rename = "IX")]
    CitationAudit,
    #[serde(rename = "X")]
    CounterArgument,
    #[serde(rename = "XI")]
    RevisionCycle,
    #[serde(rename = "XII")]
    Assembly,
    #[serde(rename = "XIII")]
    FinalReview,
    #[serde(rename = "XIV")]
    DeliveryPackage,
}

/// Unknown phase code encountered while parsing persisted or caller input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown phase code: {0}")]
pub struct UnknownPhase(pub String);

impl PhaseCode {
    /// All phases in pipeline order.
    pub const ALL: [PhaseCode; 14] = [
        PhaseCode::IntakeReview,
        PhaseCode::ConflictScreen,
        PhaseCode::EvidenceInventory,
        PhaseCode::ResearchPlan,
        PhaseCode::StatutoryResearch,
        PhaseCode::CaseLawResearch,
        PhaseCode::AuthorityOutline,
        PhaseCode::ArgumentDraft,
        PhaseCode::CitationAudit,
        PhaseCode::CounterArgument,
        PhaseCode::RevisionCycle,
        PhaseCode::Assembly,
        PhaseCode::FinalReview,
        PhaseCode::DeliveryPackage,
    ];

    /// The Roman-numeral ordinal code.
    pub fn code(self) -> &'static str {
        match self {
            PhaseCode::IntakeReview => "I",
            PhaseCode::ConflictScreen => "II",
            PhaseCode::EvidenceInventory => "III",
            PhaseCode::ResearchPlan => "IV",
            PhaseCode::StatutoryResearch => "V",
            PhaseCode::CaseLawResearch => "VI",
            PhaseCode::AuthorityOutline => "VII",
            PhaseCode::ArgumentDraft => "VIII",
            PhaseCode::CitationAudit => "IX",
            PhaseCode::CounterArgument => "X",
            PhaseCode::RevisionCycle => "XI",
            PhaseCode::Assembly => "XII",
            PhaseCode::FinalReview => "XIII",
            PhaseCode::DeliveryPackage => "XIV",
        }
    }

    /// Human-readable phase name.
    pub fn name(self) -> &'static str {
        match self {
            PhaseCode::IntakeReview => "Intake review",
            PhaseCode::ConflictScreen => "Conflict screen",
            PhaseCode::EvidenceInventory => "Evidence inventory",
            PhaseCode::ResearchPlan => "Research plan",
            PhaseCode::StatutoryResearch => "Statutory research",
            PhaseCode::CaseLawResearch => "Case-law research",
            PhaseCode::AuthorityOutline => "Authority outline",
            PhaseCode::ArgumentDraft => "Argument draft",
            PhaseCode::CitationAudit => "Citation audit",
            PhaseCode::CounterArgument => "Counter-argument pass",
            PhaseCode::RevisionCycle => "Revision cycle",
            PhaseCode::Assembly => "Formatting and assembly",
            PhaseCode::FinalReview => "Final quality review",
            PhaseCode::DeliveryPackage => "Delivery package",
        }
    }

    /// 1-based position in the pipeline.
    pub fn ordinal(self) -> u8 {
        Self::ALL.iter().position(|p| *p == self).unwrap() as u8 + 1
    }

    /// The next phase, or `None` after the final one.
    pub fn next(self) -> Option<PhaseCode> {
        let idx = Self::ALL.iter().position(|p| *p == self).unwrap();
        Self::ALL.get(idx + 1).copied()
    }

    /// Whether the citation pipelines run after this phase's model call.
    ///
    /// Research, drafting, and review phases produce or rework citation-
    /// bearing text; administrative phases do not.
    pub fn runs_citation_pipelines(self) -> bool {
        matches!(
            self,
            PhaseCode::StatutoryResearch
                | PhaseCode::CaseLawResearch
                | PhaseCode::ArgumentDraft
                | PhaseCode::CitationAudit
                | PhaseCode::CounterArgument
                | PhaseCode::RevisionCycle
        )
    }

    /// Whether a deliverable draft exists by the time this phase runs.
    ///
    /// Used at Protocol-exit to decide between a human-review checkpoint
    /// and an automatic full-refund cancellation.
    pub fn has_deliverable(self) -> bool {
        self >= PhaseCode::ArgumentDraft
    }

    pub fn parse(code: &str) -> Result<PhaseCode, UnknownPhase> {
        let normalized = code.trim().to_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.code() == normalized)
            .ok_or_else(|| UnknownPhase(code.to_string()))
    }
}

impl fmt::Display for PhaseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for PhaseCode {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhaseCode::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_has_fourteen_phases_in_order() {
        assert_eq!(PhaseCode::ALL.len(), 14);
        for (i, phase) in PhaseCode::ALL.iter().enumerate() {
            assert_eq!(phase.ordinal() as usize, i + 1);
        }
    }

    #[test]
    fn test_code_roundtrip() {
        for phase in PhaseCode::ALL {
            assert_eq!(PhaseCode::parse(phase.code()).unwrap(), phase);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive_and_trims() {
        assert_eq!(
            PhaseCode::parse(" viii ").unwrap(),
            PhaseCode::ArgumentDraft
        );
        assert_eq!(PhaseCode::parse("x").unwrap(), PhaseCode::CounterArgument);
    }

    #[test]
    fn test_parse_unknown_code() {
        let err = PhaseCode::parse("XV").unwrap_err();
        assert_eq!(err, UnknownPhase("XV".to_string()));
    }

    #[test]
    fn test_next_walks_the_pipeline() {
        assert_eq!(
            PhaseCode::IntakeReview.next(),
            Some(PhaseCode::ConflictScreen)
        );
        assert_eq!(PhaseCode::DeliveryPackage.next(), None);
    }

    #[test]
    fn test_citation_phases() {
        assert!(PhaseCode::ArgumentDraft.runs_citation_pipelines());
        assert!(PhaseCode::CitationAudit.runs_citation_pipelines());
        assert!(!PhaseCode::IntakeReview.runs_citation_pipelines());
        assert!(!PhaseCode::DeliveryPackage.runs_citation_pipelines());
    }

    #[test]
    fn test_deliverable_boundary() {
        assert!(!PhaseCode::AuthorityOutline.has_deliverable());
        assert!(PhaseCode::ArgumentDraft.has_deliverable());
        assert!(PhaseCode::DeliveryPackage.has_deliverable());
    }

    #[test]
    fn test_serde_uses_ordinal_codes() {
        let json = serde_json::to_string(&PhaseCode::ArgumentDraft).unwrap();
        assert_eq!(json, "\"VIII\"");
        let parsed: PhaseCode = serde_json::from_str("\"XIV\"").unwrap();
        assert_eq!(parsed, PhaseCode::DeliveryPackage);
    }
}
