//! Refund suggestion calculator.
//!
//! Pure advisory math used at cancellation: the current phase indexes a
//! fixed descending table (large refund while little work has been done,
//! zero/discretionary once the draft exists and the pipeline is winding
//! down). Admins may override the suggested amount, but only with a
//! justification; the audit record captures suggested vs. actual.

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::phase::PhaseCode;

/// Minimum justification length for an overridden refund amount.
pub const MIN_JUSTIFICATION_CHARS: usize = 10;

/// Suggested percentage when the phase code is unrecognized.
const FALLBACK_PERCENTAGE: u8 = 50;

/// Advisory refund for an order cancelled at a given phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundSuggestion {
    pub percentage: u8,
    pub amount_cents: i64,
    pub justification: String,
    /// Set when the phase code fell back to the conservative default.
    pub needs_manual_review: bool,
}

/// Percentage refunded per phase, descending through the pipeline.
fn refund_percentage(phase: PhaseCode) -> u8 {
    match phase {
        PhaseCode::IntakeReview => 85,
        PhaseCode::ConflictScreen => 80,
        PhaseCode::EvidenceInventory => 75,
        PhaseCode::ResearchPlan => 70,
        PhaseCode::StatutoryResearch => 60,
        PhaseCode::CaseLawResearch => 50,
        PhaseCode::AuthorityOutline => 40,
        PhaseCode::ArgumentDraft => 30,
        PhaseCode::CitationAudit => 15,
        PhaseCode::CounterArgument
        | PhaseCode::RevisionCycle
        | PhaseCode::Assembly
        | PhaseCode::FinalReview
        | PhaseCode::DeliveryPackage => 0,
    }
}

/// Compute the advisory refund for a cancellation at `phase_code`.
///
/// An unrecognized phase code is not an error: it falls back to a
/// conservative 50% suggestion flagged for manual review.
pub fn calculate_refund_suggestion(paid_cents: i64, phase_code: &str) -> RefundSuggestion {
    match PhaseCode::parse(phase_code) {
        Ok(phase) => {
            let percentage = refund_percentage(phase);
            RefundSuggestion {
                percentage,
                amount_cents: paid_cents * percentage as i64 / 100,
                justification: format!(
                    "Cancelled during phase {} ({})",
                    phase.code(),
                    phase.name()
                ),
                needs_manual_review: false,
            }
        }
        Err(_) => RefundSuggestion {
            percentage: FALLBACK_PERCENTAGE,
            amount_cents: paid_cents * FALLBACK_PERCENTAGE as i64 / 100,
            justification: format!(
                "Unrecognized phase code {phase_code:?}; conservative default applied"
            ),
            needs_manual_review: true,
        },
    }
}

/// Validate the justification supplied with an overridden refund amount.
pub fn validate_override_justification(justification: &str) -> Result<(), EngineError> {
    if justification.trim().chars().count() >= MIN_JUSTIFICATION_CHARS {
        Ok(())
    } else {
        Err(EngineError::JustificationTooShort {
            min: MIN_JUSTIFICATION_CHARS,
        })
    }
}

/// Audit trail for a processed refund, suggested vs. actual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundAuditRecord {
    pub suggested_cents: i64,
    pub actual_cents: i64,
    pub deviated: bool,
    pub admin: String,
    pub justification: String,
}

impl RefundAuditRecord {
    /// Build the audit record for a refund decision.
    ///
    /// A deviated amount requires a valid override justification; taking
    /// the suggestion as-is does not.
    pub fn build(
        suggestion: &RefundSuggestion,
        actual_cents: i64,
        admin: &str,
        justification: &str,
    ) -> Result<Self, EngineError> {
        let deviated = actual_cents != suggestion.amount_cents;
        if deviated {
            validate_override_justification(justification)?;
        }
        Ok(Self {
            suggested_cents: suggestion.amount_cents,
            actual_cents,
            deviated,
            admin: admin.to_string(),
            justification: justification.to_string(),
        })
    }
}
