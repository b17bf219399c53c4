//! Extraction engine trait and registry.
//!
//! Engines are pluggable, resource-typed strategies over a fixed set of
//! capabilities: fast native-text extraction, plain OCR, and
//! layout-preserving OCR. Each engine declares a minimum-memory
//! requirement and its external-dependency preconditions through an
//! [`EngineSpec`]; the [`EngineRegistry`] evaluates every dependency check
//! eagerly at construction and caches the verdict for the process
//! lifetime.
//!
//! The registry is append-only: engines are registered once at pipeline
//! construction and never mutated afterwards. Variants that exist but are
//! not yet usable (e.g. a layout model whose weights are not installed)
//! are still registered and simply report unavailable, keeping the
//! registry closed over a fixed set of variants.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::error::EngineError;
use crate::models::ExtractionResult;

/// Broad capability class of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Reads the embedded text layer directly; fast, low memory.
    NativeText,
    /// Rasterizes pages and runs character recognition.
    Ocr,
    /// OCR that also reconstructs page layout; highest fidelity,
    /// highest memory.
    LayoutOcr,
}

/// Static description of an engine: identity, capability class, resource
/// floor, fidelity rank, and declared external dependencies.
#[derive(Debug, Clone)]
pub struct EngineSpec {
    pub name: &'static str,
    pub kind: EngineKind,
    /// Minimum free RAM (GB) the engine needs to run.
    pub min_ram_gb: f64,
    /// Fidelity rank in (0, 1]. Fixed at configuration time; a total
    /// order (ties broken by name) used to arbitrate learned patterns.
    pub quality: f32,
    /// External binaries/libraries the engine requires.
    pub dependencies: &'static [&'static str],
}

/// Outcome of an engine's dependency check: a boolean plus a
/// human-readable reason, never an error.
#[derive(Debug, Clone)]
pub struct Availability {
    pub available: bool,
    pub reason: String,
}

impl Availability {
    pub fn available() -> Self {
        Self {
            available: true,
            reason: "ok".to_string(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            reason: reason.into(),
        }
    }
}

/// A text extraction strategy.
///
/// Implementations may take seconds to tens of seconds per page (OCR
/// backends); the caller bounds each invocation with a timeout and drops
/// the future when it fires. The `extract` future must therefore release
/// the engine's external resources on drop: subprocess-backed engines
/// spawn children through `tokio::process` with `kill_on_drop` rather
/// than `std::process` inside `spawn_blocking`, and scratch space is
/// owned by the future so cancellation removes it. `check_dependencies`
/// must never panic: a probe that fails is reported as unavailable with
/// its reason.
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Static spec: name, kind, memory floor, rank, dependencies.
    fn spec(&self) -> &EngineSpec;

    /// Probe the declared external dependencies. Called once, at
    /// registry construction; the result is cached.
    fn check_dependencies(&self) -> Availability;

    /// Extract text from the document at `path`.
    async fn extract(&self, path: &Path) -> Result<ExtractionResult, EngineError>;
}

impl std::fmt::Debug for dyn ExtractionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionEngine")
            .field("name", &self.spec().name)
            .finish()
    }
}

/// One registered engine together with its cached availability verdict.
pub struct RegisteredEngine {
    pub engine: Arc<dyn ExtractionEngine>,
    pub availability: Availability,
}

impl RegisteredEngine {
    pub fn name(&self) -> &'static str {
        self.engine.spec().name
    }
}

/// Append-only registry of extraction engines, queried by the selector.
#[derive(Default)]
pub struct EngineRegistry {
    engines: Vec<RegisteredEngine>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine, evaluating its dependency check once.
    pub fn register(&mut self, engine: Arc<dyn ExtractionEngine>) {
        let availability = engine.check_dependencies();
        if availability.available {
            log::debug!("registered engine: {}", engine.spec().name);
        } else {
            log::debug!(
                "registered engine {} (unavailable: {})",
                engine.spec().name,
                availability.reason
            );
        }
        self.engines.push(RegisteredEngine {
            engine,
            availability,
        });
    }

    /// The built-in engine set: native text, tesseract OCR, and the
    /// layout-preserving OCR variant.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::engine_native::NativeTextEngine::new()));
        registry.register(Arc::new(crate::engine_tesseract::TesseractOcrEngine::new()));
        registry.register(Arc::new(crate::engine_layout::LayoutOcrEngine::new()));
        registry
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredEngine> {
        self.engines.iter().find(|e| e.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredEngine> {
        self.engines.iter()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Fidelity rank of a registered engine, if known.
    pub fn quality_of(&self, name: &str) -> Option<f32> {
        self.get(name).map(|e| e.engine.spec().quality)
    }
}
