//! The external model-call collaborator.
//!
//! The engine supplies a routed request (model id, optional reasoning
//! budget, output ceiling, prompt) and receives token usage plus the
//! drafted output. Provider SDKs, transport, and retry backoff live behind
//! this trait; the engine only decides *when* to call and records every
//! attempt in the cost ledger.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outbound request, built from the registry route for the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub model: String,
    pub reasoning_budget: Option<u32>,
    pub max_tokens: u32,
    pub prompt: String,
}

/// Response from a completed model call.
///
/// `quality_score` comes from the external evaluation collaborator that
/// scores drafts; phases without scoring return `None` and pass the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub output: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub quality_score: Option<f64>,
}

/// Failure modes of a model call.
#[derive(Debug, Clone, Error)]
pub enum ModelCallError {
    /// Provider-side capacity exhaustion; the order parks in
    /// `AwaitingModelCapacity` instead of burning retry budget.
    #[error("model capacity exhausted")]
    CapacityExhausted,

    /// Any other failure. Partial token usage is still billed: the failed
    /// attempt becomes a `source=retry` ledger entry.
    #[error("model call failed: {message}")]
    Failed {
        message: String,
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// Collaborator performing the actual model invocation.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ModelCallError>;
}
