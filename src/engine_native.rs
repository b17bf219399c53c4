//! Native text-layer extraction engine.
//!
//! The cheapest path: reads the embedded text layer of a text-native PDF
//! without rasterizing anything. Produces nothing useful on scanned
//! documents, which the fallback chain handles by moving on to OCR.
//!
//! The parse runs on the blocking pool and holds no external resources
//! (no child processes, no scratch files); if a caller timeout drops the
//! extract future, the parse finishes in the background and its result
//! is discarded.

use async_trait::async_trait;
use serde_json::json;
use std::path::Path;

use crate::engine::{Availability, EngineKind, EngineSpec, ExtractionEngine};
use crate::error::EngineError;
use crate::models::ExtractionResult;

static SPEC: EngineSpec = EngineSpec {
    name: "native-text",
    kind: EngineKind::NativeText,
    min_ram_gb: 0.5,
    quality: 0.9,
    dependencies: &[],
};

pub struct NativeTextEngine;

impl NativeTextEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeTextEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionEngine for NativeTextEngine {
    fn spec(&self) -> &EngineSpec {
        &SPEC
    }

    fn check_dependencies(&self) -> Availability {
        // Pure Rust, no external binaries.
        Availability::available()
    }

    async fn extract(&self, path: &Path) -> Result<ExtractionResult, EngineError> {
        let path_buf = path.to_path_buf();

        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path_buf))
            .await
            .map_err(|e| EngineError::Execution {
                name: SPEC.name.into(),
                reason: format!("extraction task panicked: {e}"),
            })?
            .map_err(|e| EngineError::Execution {
                name: SPEC.name.into(),
                reason: format!("text layer read failed: {e}"),
            })?;

        if text.trim().is_empty() {
            return Err(EngineError::Execution {
                name: SPEC.name.into(),
                reason: "document has no usable text layer".into(),
            });
        }

        // pdf-extract separates pages with form feeds.
        let page_count = text.matches('\u{c}').count().max(1);

        Ok(ExtractionResult {
            text,
            page_count,
            engine: SPEC.name.into(),
            confidence: SPEC.quality,
            metadata: json!({ "method": "text-layer" }),
            warnings: Vec::new(),
        })
    }
}
