//! Resource-aware engine selection and fallback extraction.
//!
//! Selection intersects three constraints: what the document needs (from
//! the page analysis), what each engine requires (dependencies, memory
//! floor), and what the host can spare right now. The winner runs first;
//! on failure the remaining candidates are tried in descending fidelity
//! order until one succeeds or the chain is exhausted. Exhaustion is the
//! only error the caller sees, and it carries the full per-engine
//! failure history including engines excluded before any attempt.
//!
//! Each attempt, successful or not, is reported to the context store when
//! a learning context is supplied. Store trouble never interrupts the
//! chain.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SelectorConfig;
use crate::engine::{EngineKind, EngineRegistry, ExtractionEngine};
use crate::error::{EngineFailure, ExtractError};
use crate::models::{DocumentAnalysis, ExtractionResult, Observation};
use crate::resources::SystemResources;
use crate::signature::PageSignature;
use crate::store::ContextStore;

/// Handle the selector uses to report per-attempt outcomes.
pub struct LearningContext<'a> {
    pub store: &'a ContextStore,
    pub case_id: &'a str,
    pub signature: &'a PageSignature,
}

pub struct EngineSelector {
    registry: Arc<EngineRegistry>,
    config: SelectorConfig,
}

impl EngineSelector {
    pub fn new(registry: Arc<EngineRegistry>, config: SelectorConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    /// Engines whose dependencies check out and whose memory floor fits
    /// within the current snapshot, highest fidelity first.
    pub fn candidates(&self, resources: &SystemResources) -> Vec<Arc<dyn ExtractionEngine>> {
        let mut fits: Vec<_> = self
            .registry
            .iter()
            .filter(|e| e.availability.available)
            .filter(|e| e.engine.spec().min_ram_gb <= resources.available_ram_gb)
            .map(|e| Arc::clone(&e.engine))
            .collect();
        fits.sort_by(|a, b| {
            b.spec()
                .quality
                .partial_cmp(&a.spec().quality)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.spec().name.cmp(b.spec().name))
        });
        fits
    }

    /// Engines excluded from the candidate list, with the reason each one
    /// was excluded. Feeds the exhaustion error.
    fn exclusions(&self, resources: &SystemResources) -> Vec<EngineFailure> {
        self.registry
            .iter()
            .filter_map(|e| {
                if !e.availability.available {
                    Some(EngineFailure {
                        engine: e.name().to_string(),
                        reason: format!("excluded: {}", e.availability.reason),
                    })
                } else if e.engine.spec().min_ram_gb > resources.available_ram_gb {
                    Some(EngineFailure {
                        engine: e.name().to_string(),
                        reason: format!(
                            "excluded: needs {:.1} GB free, {:.1} GB available",
                            e.engine.spec().min_ram_gb,
                            resources.available_ram_gb
                        ),
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Pick the engine to try first.
    ///
    /// A forced engine bypasses routing but not its own preconditions.
    /// Otherwise text-native documents route to the native-text engine
    /// when it is a candidate, scanned documents to the best rasterizing
    /// candidate, and either falls back to the best candidate overall.
    pub fn select(
        &self,
        analysis: &DocumentAnalysis,
        resources: &SystemResources,
        force: Option<&str>,
    ) -> Result<Arc<dyn ExtractionEngine>, ExtractError> {
        if let Some(name) = force {
            let entry = self
                .registry
                .get(name)
                .ok_or_else(|| ExtractError::ForcedUnavailable {
                    name: name.to_string(),
                    reason: "no such engine".to_string(),
                })?;
            if !entry.availability.available {
                return Err(ExtractError::ForcedUnavailable {
                    name: name.to_string(),
                    reason: entry.availability.reason.clone(),
                });
            }
            if entry.engine.spec().min_ram_gb > resources.available_ram_gb {
                return Err(ExtractError::ForcedUnavailable {
                    name: name.to_string(),
                    reason: format!(
                        "needs {:.1} GB free, {:.1} GB available",
                        entry.engine.spec().min_ram_gb,
                        resources.available_ram_gb
                    ),
                });
            }
            return Ok(Arc::clone(&entry.engine));
        }

        let candidates = self.candidates(resources);
        if candidates.is_empty() {
            return Err(ExtractError::NoCandidates(format!(
                "{:.1} GB available, no engine fits",
                resources.available_ram_gb
            )));
        }

        let chosen = if analysis.is_native {
            candidates
                .iter()
                .find(|e| e.spec().kind == EngineKind::NativeText)
        } else {
            candidates
                .iter()
                .find(|e| e.spec().kind != EngineKind::NativeText)
        };

        let engine = chosen.unwrap_or(&candidates[0]);
        log::info!(
            "selected engine {} (native_ratio={:.2}, {:.1} GB free)",
            engine.spec().name,
            analysis.native_text_ratio,
            resources.available_ram_gb
        );
        Ok(Arc::clone(engine))
    }

    /// Run the fallback chain: the selected engine first, then the
    /// remaining candidates in descending fidelity order, at most
    /// `max_retries` attempts in total.
    pub async fn extract_with_fallback(
        &self,
        document: &Path,
        analysis: &DocumentAnalysis,
        resources: &SystemResources,
        learning: Option<&LearningContext<'_>>,
    ) -> Result<ExtractionResult, ExtractError> {
        // With every engine excluded up front there is nothing to try,
        // but the caller still gets the full per-engine history of why.
        let selected = match self.select(analysis, resources, None) {
            Ok(engine) => engine,
            Err(ExtractError::NoCandidates(_)) => {
                let failures = self.exclusions(resources);
                if failures.is_empty() {
                    return Err(ExtractError::NoCandidates(
                        "no engines registered".to_string(),
                    ));
                }
                return Err(ExtractError::AllEnginesExhausted { failures });
            }
            Err(e) => return Err(e),
        };

        let mut chain: Vec<Arc<dyn ExtractionEngine>> = vec![Arc::clone(&selected)];
        chain.extend(
            self.candidates(resources)
                .into_iter()
                .filter(|e| e.spec().name != selected.spec().name),
        );
        chain.truncate(self.config.max_retries);

        let timeout = Duration::from_secs(self.config.engine_timeout_secs);
        let mut failures = self.exclusions(resources);

        for engine in &chain {
            let name = engine.spec().name;
            // On timeout the attempt future is dropped, which per the
            // engine trait contract kills child processes and releases
            // scratch space before the next engine runs.
            let outcome = tokio::time::timeout(timeout, engine.extract(document)).await;

            let error = match outcome {
                Ok(Ok(result)) => {
                    if let Some(ctx) = learning {
                        let observation = Observation {
                            engine: name.to_string(),
                            engine_rank: engine.spec().quality,
                            success: true,
                            confidence: result.confidence,
                            text_len: result.text.len() as i64,
                        };
                        ctx.store
                            .record_outcome(ctx.case_id, ctx.signature, &observation)
                            .await;
                    }
                    return Ok(result);
                }
                Ok(Err(e)) => e.reason().to_string(),
                Err(_) => format!("timed out after {}s", self.config.engine_timeout_secs),
            };

            log::warn!("engine {name} failed, trying next: {error}");

            if let Some(ctx) = learning {
                let observation = Observation {
                    engine: name.to_string(),
                    engine_rank: engine.spec().quality,
                    success: false,
                    confidence: 0.0,
                    text_len: 0,
                };
                ctx.store
                    .record_outcome(ctx.case_id, ctx.signature, &observation)
                    .await;
            }

            failures.push(EngineFailure {
                engine: name.to_string(),
                reason: error,
            });
        }

        Err(ExtractError::AllEnginesExhausted { failures })
    }
}
