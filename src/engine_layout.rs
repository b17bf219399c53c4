//! Layout-preserving OCR engine.
//!
//! The highest-fidelity variant: OCR plus page-layout reconstruction,
//! backed by a large local model. The model bundle ships separately and
//! is not wired in yet, so the engine registers as permanently
//! unavailable. It still occupies its registry slot so selection,
//! ranking, and learned patterns treat the variant set as closed.

use async_trait::async_trait;
use std::path::Path;

use crate::engine::{Availability, EngineKind, EngineSpec, ExtractionEngine};
use crate::error::EngineError;
use crate::models::ExtractionResult;

static SPEC: EngineSpec = EngineSpec {
    name: "layout-ocr",
    kind: EngineKind::LayoutOcr,
    min_ram_gb: 8.0,
    quality: 1.0,
    dependencies: &["layout-model-bundle"],
};

pub struct LayoutOcrEngine;

impl LayoutOcrEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LayoutOcrEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionEngine for LayoutOcrEngine {
    fn spec(&self) -> &EngineSpec {
        &SPEC
    }

    fn check_dependencies(&self) -> Availability {
        Availability::unavailable("layout model bundle not installed")
    }

    async fn extract(&self, _path: &Path) -> Result<ExtractionResult, EngineError> {
        Err(EngineError::Unavailable {
            name: SPEC.name.into(),
            reason: "layout model bundle not installed".into(),
        })
    }
}
