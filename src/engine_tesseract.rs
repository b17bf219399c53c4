//! Tesseract OCR engine.
//!
//! Rasterizes pages with `pdftoppm` into a scratch directory, then runs
//! `tesseract` over each page image. Both binaries are external
//! dependencies probed once at registry construction; a missing binary
//! makes the engine unavailable with the probe error as the reason.
//!
//! Children spawn through `tokio::process` with `kill_on_drop`, so when
//! the selector's timeout drops the extract future any in-flight
//! `pdftoppm`/`tesseract` process is killed and the scratch directory is
//! removed before the next engine runs.

use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::process::Command;

use crate::engine::{Availability, EngineKind, EngineSpec, ExtractionEngine};
use crate::error::EngineError;
use crate::models::ExtractionResult;

static SPEC: EngineSpec = EngineSpec {
    name: "tesseract-ocr",
    kind: EngineKind::Ocr,
    min_ram_gb: 1.0,
    quality: 0.7,
    dependencies: &["tesseract", "pdftoppm"],
};

pub struct TesseractOcrEngine {
    /// Tesseract language pack, e.g. "por" for Brazilian legal documents.
    language: String,
}

impl TesseractOcrEngine {
    pub fn new() -> Self {
        Self {
            language: "por".to_string(),
        }
    }

    pub fn with_language(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    fn probe(binary: &str) -> Result<(), String> {
        match Command::new(binary).arg("--version").output() {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => Err(format!(
                "{binary} --version exited with {}",
                output.status
            )),
            Err(e) => Err(format!("{binary} not found: {e}")),
        }
    }

    async fn run_ocr(&self, path: &Path) -> Result<(String, usize), String> {
        // The scratch dir lives in this future; dropping the future on
        // timeout removes it.
        let scratch = tempfile::tempdir().map_err(|e| format!("scratch dir: {e}"))?;
        let prefix = scratch.path().join("page");

        let status = tokio::process::Command::new("pdftoppm")
            .args(["-png", "-r", "300"])
            .arg(path)
            .arg(&prefix)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| format!("pdftoppm spawn failed: {e}"))?;
        if !status.success() {
            return Err(format!("pdftoppm exited with {status}"));
        }

        let mut images: Vec<_> = std::fs::read_dir(scratch.path())
            .map_err(|e| format!("scratch dir read: {e}"))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        images.sort();

        if images.is_empty() {
            return Err("pdftoppm produced no page images".to_string());
        }

        let mut text = String::new();
        for image in &images {
            let output = tokio::process::Command::new("tesseract")
                .arg(image)
                .arg("stdout")
                .args(["-l", &self.language])
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| format!("tesseract spawn failed: {e}"))?;
            if !output.status.success() {
                return Err(format!(
                    "tesseract failed on {}: {}",
                    image.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ));
            }
            text.push_str(&String::from_utf8_lossy(&output.stdout));
            text.push('\u{c}');
        }

        Ok((text, images.len()))
    }
}

impl Default for TesseractOcrEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionEngine for TesseractOcrEngine {
    fn spec(&self) -> &EngineSpec {
        &SPEC
    }

    fn check_dependencies(&self) -> Availability {
        for binary in SPEC.dependencies {
            if let Err(reason) = Self::probe(binary) {
                return Availability::unavailable(reason);
            }
        }
        Availability::available()
    }

    async fn extract(&self, path: &Path) -> Result<ExtractionResult, EngineError> {
        let (text, page_count) =
            self.run_ocr(path)
                .await
                .map_err(|reason| EngineError::Execution {
                    name: SPEC.name.into(),
                    reason,
                })?;

        if text.trim().is_empty() {
            return Err(EngineError::Execution {
                name: SPEC.name.into(),
                reason: "OCR produced no text".into(),
            });
        }

        Ok(ExtractionResult {
            text,
            page_count,
            engine: SPEC.name.into(),
            confidence: SPEC.quality,
            metadata: json!({ "method": "ocr", "language": self.language }),
            warnings: Vec::new(),
        })
    }
}
