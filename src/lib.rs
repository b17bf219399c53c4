//! # Legal Text Extractor
//!
//! A resource-aware, multi-engine text extraction pipeline for legal
//! document bundles.
//!
//! The pipeline probes each document for a native text layer, selects the
//! best extraction engine the host can currently afford, and falls back
//! through the remaining engines on failure. A per-case pattern store
//! remembers which engine handled which page shape and serves advisory
//! hints on later pages, deprecating patterns that repeatedly disagree
//! with reality. A conservative boundary detector splits composite
//! exhibit bundles at probable sub-document starts without ever
//! truncating trailing content.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Analyzer │──▶│   Selector   │──▶│    Engines    │
//! │ probe/pg │   │ RAM + deps   │   │ native/OCR/.. │
//! └──────────┘   └──────┬───────┘   └───────┬───────┘
//!                       │  hints     outcomes│
//!                       ▼                    ▼
//!                 ┌──────────────────────────────┐
//!                 │  Context store (SQLite)      │
//!                 │  cases / patterns / diverg.  │
//!                 └──────────────────────────────┘
//!
//!                 ┌──────────────────────────────┐
//!                 │  Boundary detector           │
//!                 │  composite bundle splitting  │
//!                 └──────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`analyzer`] | Per-page native-text probing |
//! | [`resources`] | System memory snapshots |
//! | [`engine`] | Engine trait and registry |
//! | [`engine_native`] | Text-layer extraction |
//! | [`engine_tesseract`] | Tesseract OCR |
//! | [`engine_layout`] | Layout-preserving OCR |
//! | [`selector`] | Engine selection and fallback |
//! | [`signature`] | Page signatures and similarity |
//! | [`store`] | Learned-pattern context store |
//! | [`boundary`] | Document boundary detection |
//! | [`boundary_patterns`] | Opener pattern set |
//! | [`pipeline`] | End-to-end facade |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analyzer;
pub mod boundary;
pub mod boundary_patterns;
pub mod config;
pub mod db;
pub mod engine;
pub mod engine_layout;
pub mod engine_native;
pub mod engine_tesseract;
pub mod error;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod resources;
pub mod selector;
pub mod signature;
pub mod store;
