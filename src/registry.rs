//! Phase registry and model router.
//!
//! Single authority for `(phase, tier) -> route` resolution. Call sites
//! never redefine routing constants locally; they delegate to
//! [`PhaseRegistry::lookup`], which is pure, deterministic, and fails with a
//! fatal [`LookupError`] on unknown keys rather than silently defaulting.
//!
//! Routes are built through [`RouteConfig::standard`] and
//! [`RouteConfig::extended`] only, so the token-ceiling coupling (extended
//! ceiling iff a reasoning budget is present) cannot drift between entries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::LookupError;
use crate::phase::PhaseCode;
use crate::tier::ExecutionTier;

/// Output ceiling for calls without a reasoning budget.
pub const STANDARD_MAX_TOKENS: u32 = 8_192;

/// Output ceiling for calls carrying a reasoning budget.
pub const EXTENDED_MAX_TOKENS: u32 = 32_768;

const MODEL_BRIEF: &str = "claude-haiku-3-5";
const MODEL_DRAFT: &str = "claude-sonnet-4-5";
const MODEL_APEX: &str = "claude-opus-4-1";

/// Routing decision for one phase on one execution tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub model: String,
    pub reasoning_budget: Option<u32>,
    pub max_tokens: u32,
    pub citation_batch_size: usize,
}

impl RouteConfig {
    /// A route without extended reasoning, capped at the standard ceiling.
    pub fn standard(model: &str, citation_batch_size: usize) -> Self {
        Self {
            model: model.to_string(),
            reasoning_budget: None,
            max_tokens: STANDARD_MAX_TOKENS,
            citation_batch_size,
        }
    }

    /// A route with a reasoning budget, capped at the extended ceiling.
    pub fn extended(model: &str, reasoning_budget: u32, citation_batch_size: usize) -> Self {
        Self {
            model: model.to_string(),
            reasoning_budget: Some(reasoning_budget),
            max_tokens: EXTENDED_MAX_TOKENS,
            citation_batch_size,
        }
    }
}

/// Immutable phase-by-tier routing table, loaded once at process start.
#[derive(Debug, Clone)]
pub struct PhaseRegistry {
    routes: HashMap<(PhaseCode, ExecutionTier), RouteConfig>,
}

impl PhaseRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            routes: default_routes(),
        }
    }

    /// Resolve the route for a phase on an execution tier.
    ///
    /// Unknown keys are a fatal configuration error, never defaulted.
    pub fn lookup(
        &self,
        phase: PhaseCode,
        tier: ExecutionTier,
    ) -> Result<&RouteConfig, LookupError> {
        self.routes
            .get(&(phase, tier))
            .ok_or(LookupError::RouteNotFound { phase, tier })
    }

    /// Resolve a route from raw string codes (CLI / external callers).
    pub fn lookup_codes(&self, phase: &str, tier: &str) -> Result<&RouteConfig, LookupError> {
        let phase =
            PhaseCode::parse(phase).map_err(|e| LookupError::UnknownPhase(e.0))?;
        let tier =
            ExecutionTier::parse(tier).map_err(|e| LookupError::UnknownTier(e.0))?;
        self.lookup(phase, tier)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for PhaseRegistry {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder exposing the model/reasoning pairing as a configuration point.
///
/// Which model families accept which reasoning-budget levels shifts as
/// providers revise their APIs, so deployments can re-pair a route without
/// touching the table here.
pub struct RegistryBuilder {
    routes: HashMap<(PhaseCode, ExecutionTier), RouteConfig>,
}

impl RegistryBuilder {
    /// Replace the route for one (phase, tier) key.
    pub fn override_route(
        mut self,
        phase: PhaseCode,
        tier: ExecutionTier,
        route: RouteConfig,
    ) -> Self {
        self.routes.insert((phase, tier), route);
        self
    }

    pub fn build(self) -> PhaseRegistry {
        PhaseRegistry {
            routes: self.routes,
        }
    }
}

/// The authoritative default routing table: all 14 phases x 3 tiers.
fn default_routes() -> HashMap<(PhaseCode, ExecutionTier), RouteConfig> {
    use ExecutionTier::{Premium, Professional, Standard};
    use PhaseCode::*;

    let mut routes = HashMap::new();
    for phase in PhaseCode::ALL {
        // [standard, professional, premium] for this phase
        let per_tier: [RouteConfig; 3] = match phase {
            IntakeReview | ConflictScreen => [
                RouteConfig::standard(MODEL_BRIEF, 0),
                RouteConfig::standard(MODEL_BRIEF, 0),
                RouteConfig::standard(MODEL_DRAFT, 0),
            ],
            EvidenceInventory => [
                RouteConfig::standard(MODEL_BRIEF, 0),
                RouteConfig::standard(MODEL_DRAFT, 0),
                RouteConfig::standard(MODEL_DRAFT, 0),
            ],
            ResearchPlan => [
                RouteConfig::standard(MODEL_DRAFT, 0),
                RouteConfig::standard(MODEL_DRAFT, 0),
                RouteConfig::extended(MODEL_DRAFT, 16_000, 0),
            ],
            StatutoryResearch | CaseLawResearch => [
                RouteConfig::standard(MODEL_DRAFT, 15),
                RouteConfig::extended(MODEL_DRAFT, 16_000, 25),
                RouteConfig::extended(MODEL_APEX, 24_000, 40),
            ],
            AuthorityOutline => [
                RouteConfig::standard(MODEL_DRAFT, 0),
                RouteConfig::standard(MODEL_DRAFT, 0),
                RouteConfig::extended(MODEL_APEX, 16_000, 0),
            ],
            ArgumentDraft | RevisionCycle => [
                RouteConfig::extended(MODEL_DRAFT, 16_000, 10),
                RouteConfig::extended(MODEL_APEX, 24_000, 20),
                RouteConfig::extended(MODEL_APEX, 32_000, 30),
            ],
            CitationAudit => [
                RouteConfig::standard(MODEL_DRAFT, 20),
                RouteConfig::extended(MODEL_DRAFT, 16_000, 35),
                RouteConfig::extended(MODEL_APEX, 24_000, 50),
            ],
            CounterArgument => [
                RouteConfig::standard(MODEL_DRAFT, 10),
                RouteConfig::extended(MODEL_DRAFT, 16_000, 20),
                RouteConfig::extended(MODEL_APEX, 32_000, 30),
            ],
            Assembly | DeliveryPackage => [
                RouteConfig::standard(MODEL_BRIEF, 0),
                RouteConfig::standard(MODEL_BRIEF, 0),
                RouteConfig::standard(MODEL_BRIEF, 0),
            ],
            FinalReview => [
                RouteConfig::standard(MODEL_DRAFT, 0),
                RouteConfig::extended(MODEL_APEX, 16_000, 0),
                RouteConfig::extended(MODEL_APEX, 24_000, 0),
            ],
        };

        let [std_route, pro_route, prem_route] = per_tier;
        routes.insert((phase, Standard), std_route);
        routes.insert((phase, Professional), pro_route);
        routes.insert((phase, Premium), prem_route);
    }
    routes
}
