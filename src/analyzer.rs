//! Per-page document analysis.
//!
//! Probes each page of a PDF for directly extractable text and derives
//! the native-text ratio the selector routes on. The probe is cheap and
//! deliberately coarse: a page counts as text-native when it yields more
//! than a configured number of non-whitespace characters, which is enough
//! to separate born-digital documents from scans without touching any
//! OCR machinery.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::SelectorConfig;
use crate::models::DocumentAnalysis;

pub struct PageAnalyzer {
    native_text_threshold: f32,
    probe_min_chars: usize,
}

impl PageAnalyzer {
    pub fn new(config: &SelectorConfig) -> Self {
        Self {
            native_text_threshold: config.native_text_threshold,
            probe_min_chars: config.probe_min_chars,
        }
    }

    /// Analyze the document at `path`, probing every page.
    ///
    /// A document with zero readable pages analyzes as fully scanned
    /// (ratio 0.0) rather than as an error; the OCR path handles it.
    pub async fn analyze(&self, path: &Path) -> Result<DocumentAnalysis> {
        let path_buf = path.to_path_buf();
        let threshold = self.native_text_threshold;
        let min_chars = self.probe_min_chars;

        tokio::task::spawn_blocking(move || analyze_blocking(&path_buf, threshold, min_chars))
            .await
            .context("analysis task panicked")?
    }
}

fn analyze_blocking(path: &Path, threshold: f32, min_chars: usize) -> Result<DocumentAnalysis> {
    let doc = lopdf::Document::load(path)
        .with_context(|| format!("failed to open document: {}", path.display()))?;

    let pages = doc.get_pages();
    let page_count = pages.len();

    if page_count == 0 {
        return Ok(DocumentAnalysis {
            page_count: 0,
            native_text_ratio: 0.0,
            is_native: false,
            avg_chars_per_page: 0,
        });
    }

    let mut native_pages = 0usize;
    let mut total_chars = 0usize;

    for &page_no in pages.keys() {
        // Pages with broken content streams count as scanned.
        let text = doc.extract_text(&[page_no]).unwrap_or_default();
        let chars = text.chars().filter(|c| !c.is_whitespace()).count();
        total_chars += chars;
        if chars > min_chars {
            native_pages += 1;
        }
    }

    let native_text_ratio = native_pages as f32 / page_count as f32;

    Ok(DocumentAnalysis {
        page_count,
        native_text_ratio,
        is_native: native_text_ratio >= threshold,
        avg_chars_per_page: total_chars / page_count,
    })
}
