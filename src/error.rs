//! Error taxonomy for the extraction pipeline.
//!
//! Failures local to a single engine are recovered by the fallback chain
//! and never surface individually; only total exhaustion reaches the
//! caller, carrying the full per-engine failure history. Context-store
//! errors never escalate out of the store (fail-open, see [`crate::store`]).

use thiserror::Error;

/// Why one engine could not produce a result.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Dependency missing or insufficient memory; the engine is excluded
    /// from the candidate list rather than attempted.
    #[error("engine '{name}' unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    /// The engine ran and failed, or returned unusable output.
    #[error("engine '{name}' failed: {reason}")]
    Execution { name: String, reason: String },
}

impl EngineError {
    pub fn engine_name(&self) -> &str {
        match self {
            EngineError::Unavailable { name, .. } => name,
            EngineError::Execution { name, .. } => name,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            EngineError::Unavailable { reason, .. } => reason,
            EngineError::Execution { reason, .. } => reason,
        }
    }
}

/// One entry of the aggregate failure history.
#[derive(Debug, Clone)]
pub struct EngineFailure {
    pub engine: String,
    pub reason: String,
}

/// Errors surfaced by selection and fallback extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A forced engine was requested but is not usable.
    #[error("forced engine '{name}' unavailable: {reason}")]
    ForcedUnavailable { name: String, reason: String },

    /// No engine passed the dependency and memory checks.
    #[error("no extraction engine available: {0}")]
    NoCandidates(String),

    /// Every candidate was tried or excluded. Carries one reason per
    /// engine so the caller can diagnose which precondition blocked what.
    #[error("all {} extraction engines exhausted:\n{}", .failures.len(), format_failures(.failures))]
    AllEnginesExhausted { failures: Vec<EngineFailure> },

    /// The document could not be opened or analyzed at all.
    #[error("document analysis failed: {0}")]
    Analysis(String),
}

fn format_failures(failures: &[EngineFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  {}: {}", f.engine, f.reason))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Context-store failure. Always recovered locally by the public store
/// API; callers of extraction never see this type.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("context store query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("context store unavailable: {0}")]
    Unavailable(String),
}
