//! The extraction pipeline facade.
//!
//! Wires the analyzer, the engine registry and selector, the learned
//! pattern store, and the boundary detector into one entry point. The
//! store is strictly optional at runtime: if it cannot be opened the
//! pipeline logs the reason and runs without learning, never refusing to
//! extract.

use anyhow::{Context, Result};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;

use crate::analyzer::PageAnalyzer;
use crate::boundary::BoundaryDetector;
use crate::config::Config;
use crate::engine::EngineRegistry;
use crate::error::ExtractError;
use crate::models::{ExtractionResult, PageText, RegionMap, Section, Segment};
use crate::resources::SystemResources;
use crate::selector::{EngineSelector, LearningContext};
use crate::signature::PageSignature;
use crate::store::{ContextStore, Hint};

pub struct Pipeline {
    analyzer: PageAnalyzer,
    selector: EngineSelector,
    store: Option<ContextStore>,
    detector: BoundaryDetector,
}

impl Pipeline {
    /// Build a pipeline with the built-in engine set.
    pub async fn new(config: Config) -> Self {
        Self::with_registry(config, Arc::new(EngineRegistry::builtin())).await
    }

    /// Build a pipeline over a caller-supplied engine registry.
    pub async fn with_registry(config: Config, registry: Arc<EngineRegistry>) -> Self {
        let store = match ContextStore::open(&config.store).await {
            Ok(store) => Some(store),
            Err(e) => {
                log::warn!("context store unavailable, running without learning: {e}");
                None
            }
        };

        Self {
            analyzer: PageAnalyzer::new(&config.selector),
            selector: EngineSelector::new(registry, config.selector.clone()),
            store,
            detector: BoundaryDetector::new(&config.boundary),
        }
    }

    pub fn store(&self) -> Option<&ContextStore> {
        self.store.as_ref()
    }

    pub fn detector(&self) -> &BoundaryDetector {
        &self.detector
    }

    /// Stable SHA-256 fingerprint of the document bytes, used as the case
    /// key in the pattern store.
    pub fn document_fingerprint(path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read document: {}", path.display()))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Extract the document at `path`, routing through the best engine
    /// and falling back on failure.
    ///
    /// When a page signature is supplied and the store is up, a learned
    /// pattern hint is looked up first (advisory only, recorded in the
    /// result metadata) and every attempt's outcome feeds back into the
    /// store. A region map, if supplied, contributes cleaning-failure
    /// warnings to the result.
    pub async fn process_document(
        &self,
        path: &Path,
        region_map: Option<&RegionMap>,
        signature: Option<&PageSignature>,
    ) -> Result<ExtractionResult, ExtractError> {
        let analysis = self
            .analyzer
            .analyze(path)
            .await
            .map_err(|e| ExtractError::Analysis(e.to_string()))?;
        let resources = SystemResources::detect();

        let case_id = match (&self.store, signature) {
            (Some(store), Some(_)) => match Self::document_fingerprint(path) {
                Ok(fingerprint) => match store.get_or_create_case(&fingerprint).await {
                    Ok(case) => Some(case.id),
                    Err(e) => {
                        log::warn!("case lookup failed, continuing without learning: {e}");
                        None
                    }
                },
                Err(e) => {
                    log::warn!("fingerprint failed, continuing without learning: {e}");
                    None
                }
            },
            _ => None,
        };

        let mut hint_meta = None;
        if let (Some(store), Some(sig), Some(case_id)) = (&self.store, signature, &case_id) {
            match store.find_similar_pattern(case_id, sig).await {
                Hint::Found(hint) => {
                    log::info!(
                        "pattern hint for case {case_id}: engine {} (similarity {:.2})",
                        hint.engine,
                        hint.similarity
                    );
                    hint_meta = Some(json!({
                        "engine": hint.engine,
                        "similarity": hint.similarity,
                        "confidence": hint.confidence,
                    }));
                }
                Hint::Miss | Hint::Unavailable => {}
            }
        }

        let learning = match (&self.store, signature, &case_id) {
            (Some(store), Some(sig), Some(case_id)) => Some(LearningContext {
                store,
                case_id,
                signature: sig,
            }),
            _ => None,
        };

        let mut result = self
            .selector
            .extract_with_fallback(path, &analysis, &resources, learning.as_ref())
            .await?;

        if let Some(hint) = hint_meta {
            if let Some(map) = result.metadata.as_object_mut() {
                map.insert("pattern_hint".to_string(), hint);
            }
        }

        if let Some(regions) = region_map {
            for page in &regions.pages {
                if page.needs_cleaning && page.cleaning_passed == Some(false) {
                    result
                        .warnings
                        .push(format!("page {}: region cleaning failed", page.page_num));
                }
            }
        }

        Ok(result)
    }

    /// Split a composite section into sub-document segments. Sections not
    /// flagged composite come back empty, meaning "leave as-is".
    pub fn refine_composite(&self, section: &Section, pages: &[PageText]) -> Vec<Segment> {
        self.detector.refine_section(section, pages)
    }
}
