//! Selection and fallback tests over scripted engines, plus the
//! learning loop against a real on-disk store.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use legal_text_extractor::config::{SelectorConfig, StoreConfig};
use legal_text_extractor::engine::{
    Availability, EngineKind, EngineRegistry, EngineSpec, ExtractionEngine,
};
use legal_text_extractor::error::{EngineError, ExtractError};
use legal_text_extractor::models::{DocumentAnalysis, ExtractionResult};
use legal_text_extractor::resources::SystemResources;
use legal_text_extractor::selector::{EngineSelector, LearningContext};
use legal_text_extractor::signature::PageSignature;
use legal_text_extractor::store::{ContextStore, Hint};

enum Behavior {
    Succeed { confidence: f32 },
    Fail { reason: &'static str },
    Unavailable { reason: &'static str },
    Hang,
}

struct ScriptedEngine {
    spec: EngineSpec,
    behavior: Behavior,
}

impl ScriptedEngine {
    fn new(
        name: &'static str,
        kind: EngineKind,
        min_ram_gb: f64,
        quality: f32,
        behavior: Behavior,
    ) -> Arc<Self> {
        Arc::new(Self {
            spec: EngineSpec {
                name,
                kind,
                min_ram_gb,
                quality,
                dependencies: &[],
            },
            behavior,
        })
    }
}

#[async_trait]
impl ExtractionEngine for ScriptedEngine {
    fn spec(&self) -> &EngineSpec {
        &self.spec
    }

    fn check_dependencies(&self) -> Availability {
        match &self.behavior {
            Behavior::Unavailable { reason } => Availability::unavailable(*reason),
            _ => Availability::available(),
        }
    }

    async fn extract(&self, _path: &Path) -> Result<ExtractionResult, EngineError> {
        match &self.behavior {
            Behavior::Succeed { confidence } => Ok(ExtractionResult {
                text: format!("extracted by {}", self.spec.name),
                page_count: 4,
                engine: self.spec.name.to_string(),
                confidence: *confidence,
                metadata: serde_json::json!({}),
                warnings: Vec::new(),
            }),
            Behavior::Fail { reason } => Err(EngineError::Execution {
                name: self.spec.name.to_string(),
                reason: reason.to_string(),
            }),
            Behavior::Unavailable { reason } => Err(EngineError::Unavailable {
                name: self.spec.name.to_string(),
                reason: reason.to_string(),
            }),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(EngineError::Execution {
                    name: self.spec.name.to_string(),
                    reason: "woke up".to_string(),
                })
            }
        }
    }
}

/// Engine that hangs while holding a marker, and sets it released only
/// when its extract future is dropped.
struct HoldingEngine {
    spec: EngineSpec,
    released: Arc<AtomicBool>,
}

struct ReleaseOnDrop(Arc<AtomicBool>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExtractionEngine for HoldingEngine {
    fn spec(&self) -> &EngineSpec {
        &self.spec
    }

    fn check_dependencies(&self) -> Availability {
        Availability::available()
    }

    async fn extract(&self, _path: &Path) -> Result<ExtractionResult, EngineError> {
        let _guard = ReleaseOnDrop(Arc::clone(&self.released));
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(EngineError::Execution {
            name: self.spec.name.to_string(),
            reason: "woke up".to_string(),
        })
    }
}

fn scanned_analysis() -> DocumentAnalysis {
    DocumentAnalysis {
        page_count: 4,
        native_text_ratio: 0.0,
        is_native: false,
        avg_chars_per_page: 3,
    }
}

fn native_analysis() -> DocumentAnalysis {
    DocumentAnalysis {
        page_count: 4,
        native_text_ratio: 1.0,
        is_native: true,
        avg_chars_per_page: 1800,
    }
}

fn selector(registry: EngineRegistry) -> EngineSelector {
    EngineSelector::new(Arc::new(registry), SelectorConfig::default())
}

fn selector_with_timeout(registry: EngineRegistry, timeout_secs: u64) -> EngineSelector {
    EngineSelector::new(
        Arc::new(registry),
        SelectorConfig {
            engine_timeout_secs: timeout_secs,
            ..SelectorConfig::default()
        },
    )
}

#[test]
fn test_memory_pressure_routes_to_lighter_engine() {
    let mut registry = EngineRegistry::new();
    registry.register(ScriptedEngine::new(
        "layout-heavy",
        EngineKind::LayoutOcr,
        8.0,
        1.0,
        Behavior::Succeed { confidence: 0.95 },
    ));
    registry.register(ScriptedEngine::new(
        "ocr-light",
        EngineKind::Ocr,
        1.0,
        0.7,
        Behavior::Succeed { confidence: 0.7 },
    ));

    let selector = selector(registry);
    let resources = SystemResources::with_available_gb(2.0);

    let engine = selector
        .select(&scanned_analysis(), &resources, None)
        .unwrap();
    assert_eq!(engine.spec().name, "ocr-light");
}

#[test]
fn test_native_document_prefers_text_layer_engine() {
    let mut registry = EngineRegistry::new();
    registry.register(ScriptedEngine::new(
        "ocr",
        EngineKind::Ocr,
        1.0,
        0.95,
        Behavior::Succeed { confidence: 0.95 },
    ));
    registry.register(ScriptedEngine::new(
        "native",
        EngineKind::NativeText,
        0.5,
        0.9,
        Behavior::Succeed { confidence: 0.9 },
    ));

    let selector = selector(registry);
    let resources = SystemResources::with_available_gb(16.0);

    // Despite the OCR engine's higher rank, a text-native document goes
    // to the text-layer engine.
    let engine = selector
        .select(&native_analysis(), &resources, None)
        .unwrap();
    assert_eq!(engine.spec().name, "native");

    let engine = selector
        .select(&scanned_analysis(), &resources, None)
        .unwrap();
    assert_eq!(engine.spec().name, "ocr");
}

#[test]
fn test_forced_engine_bypasses_routing_but_not_preconditions() {
    let mut registry = EngineRegistry::new();
    registry.register(ScriptedEngine::new(
        "native",
        EngineKind::NativeText,
        0.5,
        0.9,
        Behavior::Succeed { confidence: 0.9 },
    ));
    registry.register(ScriptedEngine::new(
        "broken-ocr",
        EngineKind::Ocr,
        1.0,
        0.7,
        Behavior::Unavailable {
            reason: "binary missing",
        },
    ));

    let selector = selector(registry);
    let resources = SystemResources::with_available_gb(16.0);

    let engine = selector
        .select(&native_analysis(), &resources, Some("native"))
        .unwrap();
    assert_eq!(engine.spec().name, "native");

    let err = selector
        .select(&native_analysis(), &resources, Some("broken-ocr"))
        .unwrap_err();
    assert!(matches!(err, ExtractError::ForcedUnavailable { .. }));

    let err = selector
        .select(&native_analysis(), &resources, Some("no-such-engine"))
        .unwrap_err();
    assert!(matches!(err, ExtractError::ForcedUnavailable { .. }));
}

#[tokio::test]
async fn test_fallback_recovers_from_first_engine_failure() {
    let mut registry = EngineRegistry::new();
    registry.register(ScriptedEngine::new(
        "flaky-ocr",
        EngineKind::Ocr,
        1.0,
        0.9,
        Behavior::Fail {
            reason: "recognizer crashed",
        },
    ));
    registry.register(ScriptedEngine::new(
        "steady-ocr",
        EngineKind::Ocr,
        1.0,
        0.7,
        Behavior::Succeed { confidence: 0.7 },
    ));

    let selector = selector(registry);
    let resources = SystemResources::with_available_gb(8.0);

    let result = selector
        .extract_with_fallback(Path::new("bundle.pdf"), &scanned_analysis(), &resources, None)
        .await
        .unwrap();
    assert_eq!(result.engine, "steady-ocr");
}

#[tokio::test]
async fn test_exhaustion_reports_every_engine_with_reasons() {
    let mut registry = EngineRegistry::new();
    registry.register(ScriptedEngine::new(
        "ocr-a",
        EngineKind::Ocr,
        1.0,
        0.9,
        Behavior::Fail { reason: "crash a" },
    ));
    registry.register(ScriptedEngine::new(
        "ocr-b",
        EngineKind::Ocr,
        1.0,
        0.7,
        Behavior::Fail { reason: "crash b" },
    ));
    registry.register(ScriptedEngine::new(
        "layout",
        EngineKind::LayoutOcr,
        8.0,
        1.0,
        Behavior::Unavailable {
            reason: "model bundle not installed",
        },
    ));

    let selector = selector(registry);
    let resources = SystemResources::with_available_gb(4.0);

    let err = selector
        .extract_with_fallback(Path::new("bundle.pdf"), &scanned_analysis(), &resources, None)
        .await
        .unwrap_err();

    match err {
        ExtractError::AllEnginesExhausted { failures } => {
            assert_eq!(failures.len(), 3);
            let by_name = |name: &str| failures.iter().find(|f| f.engine == name).unwrap();
            assert_eq!(by_name("ocr-a").reason, "crash a");
            assert_eq!(by_name("ocr-b").reason, "crash b");
            // The excluded engine still appears, with why it never ran.
            assert!(by_name("layout").reason.contains("excluded"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_no_usable_engine_is_reported_before_any_attempt() {
    let mut registry = EngineRegistry::new();
    registry.register(ScriptedEngine::new(
        "layout",
        EngineKind::LayoutOcr,
        8.0,
        1.0,
        Behavior::Succeed { confidence: 0.95 },
    ));

    let selector = selector(registry);
    let resources = SystemResources::with_available_gb(1.0);

    let err = selector
        .select(&scanned_analysis(), &resources, None)
        .unwrap_err();
    assert!(matches!(err, ExtractError::NoCandidates(_)));
}

#[tokio::test]
async fn test_all_engines_excluded_yields_aggregate_error_with_reasons() {
    let mut registry = EngineRegistry::new();
    registry.register(ScriptedEngine::new(
        "layout",
        EngineKind::LayoutOcr,
        8.0,
        1.0,
        Behavior::Succeed { confidence: 0.95 },
    ));
    registry.register(ScriptedEngine::new(
        "heavy-ocr",
        EngineKind::Ocr,
        4.0,
        0.7,
        Behavior::Succeed { confidence: 0.7 },
    ));

    let selector = selector(registry);
    let resources = SystemResources::with_available_gb(1.0);

    // Nothing fits in memory: the fallback entry point still reports the
    // aggregate error naming every engine and why it was excluded.
    let err = selector
        .extract_with_fallback(Path::new("bundle.pdf"), &scanned_analysis(), &resources, None)
        .await
        .unwrap_err();

    match err {
        ExtractError::AllEnginesExhausted { failures } => {
            assert_eq!(failures.len(), 2);
            let by_name = |name: &str| failures.iter().find(|f| f.engine == name).unwrap();
            assert!(by_name("layout").reason.contains("excluded"));
            assert!(by_name("layout").reason.contains("8.0 GB"));
            assert!(by_name("heavy-ocr").reason.contains("excluded"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_hung_engine_times_out_and_falls_back() {
    let mut registry = EngineRegistry::new();
    registry.register(ScriptedEngine::new(
        "hung-ocr",
        EngineKind::Ocr,
        1.0,
        0.9,
        Behavior::Hang,
    ));
    registry.register(ScriptedEngine::new(
        "steady-ocr",
        EngineKind::Ocr,
        1.0,
        0.7,
        Behavior::Succeed { confidence: 0.7 },
    ));

    let selector = selector_with_timeout(registry, 1);
    let resources = SystemResources::with_available_gb(8.0);

    let result = selector
        .extract_with_fallback(Path::new("bundle.pdf"), &scanned_analysis(), &resources, None)
        .await
        .unwrap();
    assert_eq!(result.engine, "steady-ocr");
}

#[tokio::test(start_paused = true)]
async fn test_every_engine_hanging_reports_timeouts() {
    let mut registry = EngineRegistry::new();
    registry.register(ScriptedEngine::new(
        "hung-a",
        EngineKind::Ocr,
        1.0,
        0.9,
        Behavior::Hang,
    ));
    registry.register(ScriptedEngine::new(
        "hung-b",
        EngineKind::Ocr,
        1.0,
        0.7,
        Behavior::Hang,
    ));

    let selector = selector_with_timeout(registry, 1);
    let resources = SystemResources::with_available_gb(8.0);

    let err = selector
        .extract_with_fallback(Path::new("bundle.pdf"), &scanned_analysis(), &resources, None)
        .await
        .unwrap_err();

    match err {
        ExtractError::AllEnginesExhausted { failures } => {
            assert_eq!(failures.len(), 2);
            assert!(failures.iter().all(|f| f.reason.contains("timed out")));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_releases_the_engine_before_fallback_proceeds() {
    let released = Arc::new(AtomicBool::new(false));
    let mut registry = EngineRegistry::new();
    registry.register(Arc::new(HoldingEngine {
        spec: EngineSpec {
            name: "holding-ocr",
            kind: EngineKind::Ocr,
            min_ram_gb: 1.0,
            quality: 0.9,
            dependencies: &[],
        },
        released: Arc::clone(&released),
    }));
    registry.register(ScriptedEngine::new(
        "steady-ocr",
        EngineKind::Ocr,
        1.0,
        0.7,
        Behavior::Succeed { confidence: 0.7 },
    ));

    let selector = selector_with_timeout(registry, 1);
    let resources = SystemResources::with_available_gb(8.0);

    let result = selector
        .extract_with_fallback(Path::new("bundle.pdf"), &scanned_analysis(), &resources, None)
        .await
        .unwrap();

    // The timed-out engine's future was dropped, releasing what it held,
    // before the fallback engine produced the result.
    assert_eq!(result.engine, "steady-ocr");
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_attempt_outcomes_feed_the_pattern_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = ContextStore::open(&StoreConfig {
        path: dir.path().join("patterns.sqlite"),
        similarity_threshold: 0.85,
        divergence_limit: 3,
    })
    .await
    .unwrap();
    let case = store.get_or_create_case("bundle-1").await.unwrap();
    let signature = PageSignature::new(vec![0.7, 0.2, 0.4]).unwrap();

    let mut registry = EngineRegistry::new();
    registry.register(ScriptedEngine::new(
        "flaky-ocr",
        EngineKind::Ocr,
        1.0,
        0.9,
        Behavior::Fail {
            reason: "recognizer crashed",
        },
    ));
    registry.register(ScriptedEngine::new(
        "steady-ocr",
        EngineKind::Ocr,
        1.0,
        0.7,
        Behavior::Succeed { confidence: 0.7 },
    ));

    let selector = selector(registry);
    let resources = SystemResources::with_available_gb(8.0);
    let learning = LearningContext {
        store: &store,
        case_id: &case.id,
        signature: &signature,
    };

    let result = selector
        .extract_with_fallback(
            Path::new("bundle.pdf"),
            &scanned_analysis(),
            &resources,
            Some(&learning),
        )
        .await
        .unwrap();
    assert_eq!(result.engine, "steady-ocr");

    // The failure never seeded a pattern; the success did.
    assert_eq!(store.pattern_count(&case.id, false).await.unwrap(), 1);
    match store.find_similar_pattern(&case.id, &signature).await {
        Hint::Found(hint) => assert_eq!(hint.engine, "steady-ocr"),
        other => panic!("expected hint, got {other:?}"),
    }
}
