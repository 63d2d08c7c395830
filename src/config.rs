//! Engine configuration.
//!
//! Routing and tier policy are immutable configuration assembled once at
//! process start and passed by reference; nothing mutates them at runtime.
//! An optional TOML file re-pairs individual routes (model id and
//! reasoning budget) without code changes.
//!
//! ```toml
//! [[routes]]
//! phase = "VIII"
//! tier = "premium"
//! model = "claude-opus-4-5"
//! reasoning_budget = 48000
//! citation_batch_size = 30
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::phase::PhaseCode;
use crate::registry::{PhaseRegistry, RegistryBuilder, RouteConfig};
use crate::tier::{ExecutionTier, TierTable};

/// Immutable engine configuration, loaded once at process start.
#[derive(Debug)]
pub struct EngineConfig {
    pub registry: PhaseRegistry,
    pub tiers: TierTable,
    /// Hold age at which the reminder escalation fires.
    pub hold_escalation: chrono::Duration,
    /// Hold age at which the order auto-cancels.
    pub hold_expiry: chrono::Duration,
    /// Model call attempts per phase step before the step fails.
    pub max_call_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            registry: PhaseRegistry::default(),
            tiers: TierTable::default(),
            hold_escalation: chrono::Duration::days(3),
            hold_expiry: chrono::Duration::days(7),
            max_call_attempts: 3,
        }
    }
}

impl EngineConfig {
    /// Default configuration with route overrides applied from a TOML file.
    pub fn with_route_overrides(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read route overrides: {}", path.display()))?;
        let overrides: RouteOverridesFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse route overrides: {}", path.display()))?;

        let mut builder = PhaseRegistry::builder();
        for entry in overrides.routes {
            builder = entry.apply(builder)?;
        }

        Ok(Self {
            registry: builder.build(),
            ..Self::default()
        })
    }
}

#[derive(Debug, Deserialize)]
struct RouteOverridesFile {
    #[serde(default)]
    routes: Vec<RouteOverride>,
}

#[derive(Debug, Deserialize)]
struct RouteOverride {
    phase: String,
    tier: String,
    model: String,
    reasoning_budget: Option<u32>,
    #[serde(default)]
    citation_batch_size: usize,
}

impl RouteOverride {
    fn apply(self, builder: RegistryBuilder) -> Result<RegistryBuilder> {
        let phase = PhaseCode::parse(&self.phase)
            .with_context(|| format!("Invalid phase in route override: {}", self.phase))?;
        let tier = ExecutionTier::parse(&self.tier)
            .with_context(|| format!("Invalid tier in route override: {}", self.tier))?;
        let route = match self.reasoning_budget {
            Some(budget) => RouteConfig::extended(&self.model, budget, self.citation_batch_size),
            None => RouteConfig::standard(&self.model, self.citation_batch_size),
        };
        Ok(builder.override_route(phase, tier, route))
    }
}
