//! Core data models used throughout the extraction pipeline.
//!
//! These types represent the analyses, extraction results, learned patterns,
//! and boundary candidates that flow between the analyzer, the engine
//! selector, the context store, and the boundary detector.

use serde_json::Value;

/// Result of a successful extraction, immutable once created.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// Full extracted text of the document.
    pub text: String,
    /// Number of pages the engine processed.
    pub page_count: usize,
    /// Identifier of the engine that produced this result.
    pub engine: String,
    /// Engine-reported confidence in [0, 1].
    pub confidence: f32,
    /// Free-form metadata (engine version, timing, hint usage).
    pub metadata: Value,
    /// Non-fatal warnings accumulated along the way.
    pub warnings: Vec<String>,
}

/// Per-document analysis produced by the page analyzer.
#[derive(Debug, Clone, Copy)]
pub struct DocumentAnalysis {
    pub page_count: usize,
    /// Fraction of pages with directly extractable text, in [0, 1].
    pub native_text_ratio: f32,
    /// True when `native_text_ratio` meets the configured threshold.
    pub is_native: bool,
    pub avg_chars_per_page: usize,
}

/// A single page of already-extracted text, as fed to the boundary detector.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-indexed page number within the bundle.
    pub page_num: usize,
    pub text: String,
}

/// A section of a document as labelled by the upstream classifier.
///
/// Only sections flagged `composite` are refined by the boundary detector;
/// single-instrument sections pass through untouched.
#[derive(Debug, Clone)]
pub struct Section {
    pub label: String,
    pub composite: bool,
    /// 1-indexed inclusive page range within the bundle.
    pub start_page: usize,
    pub end_page: usize,
}

/// Document classes the boundary detector can recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentClass {
    /// Procuração / instrumento de mandato.
    Procuration,
    /// Contrato (prestação de serviços, social, instrumento particular).
    Contract,
    /// Nota fiscal.
    Invoice,
    /// Comprovante bancário.
    Receipt,
    /// Boleto bancário.
    BankSlip,
    /// DOC. n / ANEXO n markers.
    NumberedExhibit,
    Unknown,
}

impl DocumentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentClass::Procuration => "procuration",
            DocumentClass::Contract => "contract",
            DocumentClass::Invoice => "invoice",
            DocumentClass::Receipt => "receipt",
            DocumentClass::BankSlip => "bank_slip",
            DocumentClass::NumberedExhibit => "numbered_exhibit",
            DocumentClass::Unknown => "unknown",
        }
    }
}

/// A detected probable start of an embedded sub-document.
///
/// A candidate always marks where the next sub-document *begins*, never
/// where the current one ends, so trailing content (signature blocks,
/// closing clauses) is never truncated.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryCandidate {
    /// 1-indexed page within the scanned sequence.
    pub page_num: usize,
    /// 1-indexed line within that page.
    pub line: usize,
    pub class: DocumentClass,
    pub confidence: f32,
    /// First characters of the matched opener line, for diagnostics.
    pub matched_text: String,
}

/// A contiguous run of pages/lines belonging to one sub-document,
/// assembled from boundary candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start_page: usize,
    pub start_line: usize,
    pub end_page: usize,
    pub end_line: usize,
    pub class: DocumentClass,
    pub confidence: f32,
}

/// Opaque per-document region map from the upstream layout stage.
///
/// The pipeline only consumes the pass/fail cleaning outcome per page and
/// surfaces failures as warnings on the extraction result.
#[derive(Debug, Clone, Default)]
pub struct RegionMap {
    pub pages: Vec<PageRegion>,
}

#[derive(Debug, Clone)]
pub struct PageRegion {
    pub page_num: usize,
    pub needs_cleaning: bool,
    /// None while cleaning has not run; Some(false) when it failed.
    pub cleaning_passed: Option<bool>,
}

/// A logical grouping of pages believed to share a template/source.
#[derive(Debug, Clone)]
pub struct Case {
    pub id: String,
    /// Stable fingerprint of the originating document (e.g. SHA-256).
    pub fingerprint: String,
    pub created_at: i64,
}

/// A learned pattern stored per case: the signature of a page shape, the
/// engine that handled it, and how often later pages agreed or disagreed.
#[derive(Debug, Clone)]
pub struct ObservedPattern {
    pub id: String,
    pub case_id: String,
    pub engine: String,
    /// Fidelity rank of the recording engine, in (0, 1].
    pub engine_rank: f32,
    pub confidence: f32,
    pub text_len: i64,
    pub confirmations: i64,
    pub divergence_count: i64,
    pub deprecated: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A recorded disagreement between two outcomes for similar signatures.
/// Append-only; retained for audit even after the pattern deprecates.
#[derive(Debug, Clone)]
pub struct Divergence {
    pub id: String,
    pub pattern_id: String,
    pub engine: String,
    pub engine_rank: f32,
    pub expected_confidence: f32,
    pub actual_confidence: f32,
    pub recorded_at: i64,
}

/// One page-level observation reported to the context store.
#[derive(Debug, Clone)]
pub struct Observation {
    pub engine: String,
    /// Fidelity rank of the observing engine, in (0, 1].
    pub engine_rank: f32,
    pub success: bool,
    pub confidence: f32,
    pub text_len: i64,
}

/// Advisory hint derived from a previously learned pattern.
#[derive(Debug, Clone)]
pub struct PatternHint {
    pub pattern_id: String,
    /// Cosine similarity between the query signature and the pattern.
    pub similarity: f32,
    pub engine: String,
    pub engine_rank: f32,
    pub confidence: f32,
}

/// Per-engine statistics derived from the store's SQL views.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub engine: String,
    pub pattern_count: i64,
    pub confirmations: i64,
    pub avg_confidence: f64,
    pub deprecated_count: i64,
    pub divergence_count: i64,
}
