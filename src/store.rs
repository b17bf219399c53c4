//! Learned-pattern context store.
//!
//! Persists per-case observations of which engine handled which page
//! shape, serves advisory hints back to the selector, and tracks
//! disagreement until a pattern stops being trustworthy. Three rules
//! govern every write:
//!
//! - a higher-fidelity engine's successful outcome overwrites a
//!   lower-fidelity pattern; the reverse never happens
//! - an equal-or-lower-fidelity outcome that materially disagrees is
//!   recorded as a divergence; at the configured limit the pattern is
//!   deprecated, atomically with the count update (SQL trigger)
//! - the store fails open: any storage trouble degrades to "no hint" /
//!   "outcome dropped" and never blocks extraction
//!
//! Writes for the same case are serialized through a per-case async lock
//! so the read-compare-write sequence in [`ContextStore::learn_from_page`]
//! cannot interleave.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::db;
use crate::error::StoreError;
use crate::migrate;
use crate::models::{Case, EngineStats, Observation, ObservedPattern, PatternHint};
use crate::signature::PageSignature;

/// Confidence gap beyond which an agreeing-engine outcome counts as a
/// material disagreement rather than noise.
const MATERIAL_CONFIDENCE_DROP: f32 = 0.3;

/// Result of a hint lookup. `Unavailable` means the store had trouble,
/// which callers treat exactly like a miss.
#[derive(Debug, Clone)]
pub enum Hint {
    Found(PatternHint),
    Miss,
    Unavailable,
}

pub struct ContextStore {
    pool: SqlitePool,
    config: StoreConfig,
    case_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ContextStore {
    /// Open the store, creating the database and schema as needed.
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let pool = db::connect(&config.path)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        migrate::run_migrations(&pool, config.divergence_limit)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            pool,
            config: config.clone(),
            case_locks: Mutex::new(HashMap::new()),
        })
    }

    async fn case_lock(&self, case_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.case_locks.lock().await;
        Arc::clone(
            locks
                .entry(case_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Look up the case for a document fingerprint, creating it on first
    /// sight.
    pub async fn get_or_create_case(&self, fingerprint: &str) -> Result<Case, StoreError> {
        if let Some(row) = sqlx::query("SELECT id, fingerprint, created_at FROM cases WHERE fingerprint = ?")
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(Case {
                id: row.get("id"),
                fingerprint: row.get("fingerprint"),
                created_at: row.get("created_at"),
            });
        }

        let case = Case {
            id: Uuid::new_v4().to_string(),
            fingerprint: fingerprint.to_string(),
            created_at: Utc::now().timestamp(),
        };

        // A concurrent insert of the same fingerprint loses on the UNIQUE
        // constraint; re-read in that case.
        let inserted = sqlx::query("INSERT OR IGNORE INTO cases (id, fingerprint, created_at) VALUES (?, ?, ?)")
            .bind(&case.id)
            .bind(&case.fingerprint)
            .bind(case.created_at)
            .execute(&self.pool)
            .await?;

        if inserted.rows_affected() == 0 {
            let row = sqlx::query("SELECT id, fingerprint, created_at FROM cases WHERE fingerprint = ?")
                .bind(fingerprint)
                .fetch_one(&self.pool)
                .await?;
            return Ok(Case {
                id: row.get("id"),
                fingerprint: row.get("fingerprint"),
                created_at: row.get("created_at"),
            });
        }

        Ok(case)
    }

    /// Fetch the non-deprecated patterns of a case together with their
    /// decoded signatures.
    async fn active_patterns(
        &self,
        case_id: &str,
    ) -> Result<Vec<(ObservedPattern, PageSignature)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, case_id, signature, engine, engine_rank, confidence,
                   text_len, confirmations, divergence_count, deprecated,
                   created_at, updated_at
            FROM observed_patterns
            WHERE case_id = ? AND deprecated = 0
            "#,
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        let mut patterns = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.get("signature");
            let signature = match PageSignature::from_blob(&blob) {
                Ok(sig) => sig,
                Err(e) => {
                    log::warn!("skipping pattern with undecodable signature: {e}");
                    continue;
                }
            };
            patterns.push((
                ObservedPattern {
                    id: row.get("id"),
                    case_id: row.get("case_id"),
                    engine: row.get("engine"),
                    engine_rank: row.get("engine_rank"),
                    confidence: row.get("confidence"),
                    text_len: row.get("text_len"),
                    confirmations: row.get("confirmations"),
                    divergence_count: row.get("divergence_count"),
                    deprecated: row.get::<i64, _>("deprecated") != 0,
                    created_at: row.get("created_at"),
                    updated_at: row.get("updated_at"),
                },
                signature,
            ));
        }
        Ok(patterns)
    }

    /// Best similar active pattern of the case, or `None` below the
    /// similarity threshold. Deprecated patterns are never considered.
    async fn best_match(
        &self,
        case_id: &str,
        signature: &PageSignature,
    ) -> Result<Option<(ObservedPattern, f32)>, StoreError> {
        let mut best: Option<(ObservedPattern, f32)> = None;
        for (pattern, stored_sig) in self.active_patterns(case_id).await? {
            let similarity = signature.similarity(&stored_sig);
            if similarity < self.config.similarity_threshold {
                continue;
            }
            if best.as_ref().is_none_or(|(_, s)| similarity > *s) {
                best = Some((pattern, similarity));
            }
        }
        Ok(best)
    }

    /// Advisory hint lookup. Fail-open: storage trouble yields
    /// [`Hint::Unavailable`], never an error.
    pub async fn find_similar_pattern(&self, case_id: &str, signature: &PageSignature) -> Hint {
        match self.best_match(case_id, signature).await {
            Ok(Some((pattern, similarity))) => Hint::Found(PatternHint {
                pattern_id: pattern.id,
                similarity,
                engine: pattern.engine,
                engine_rank: pattern.engine_rank,
                confidence: pattern.confidence,
            }),
            Ok(None) => Hint::Miss,
            Err(e) => {
                log::warn!("hint lookup failed, continuing without: {e}");
                Hint::Unavailable
            }
        }
    }

    /// Record one page observation against the case's learned patterns.
    ///
    /// Serialized per case. The arbitration rules, in order:
    /// - no similar pattern: a success creates one; a failure is dropped
    ///   (failed attempts never seed patterns)
    /// - similar pattern, strictly higher-rank success: overwrite the
    ///   pattern in place, keeping its divergence history
    /// - similar pattern, strictly higher-rank failure: logged only
    /// - similar pattern, equal-or-lower rank: a material disagreement
    ///   (failure, or confidence off by more than 0.3) records a
    ///   divergence; otherwise the pattern is confirmed
    pub async fn learn_from_page(
        &self,
        case_id: &str,
        signature: &PageSignature,
        observation: &Observation,
    ) -> Result<(), StoreError> {
        let lock = self.case_lock(case_id).await;
        let _guard = lock.lock().await;

        let now = Utc::now().timestamp();

        match self.best_match(case_id, signature).await? {
            None => {
                if !observation.success {
                    return Ok(());
                }
                sqlx::query(
                    r#"
                    INSERT INTO observed_patterns
                        (id, case_id, signature, engine, engine_rank, confidence,
                         text_len, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(case_id)
                .bind(signature.to_blob())
                .bind(&observation.engine)
                .bind(observation.engine_rank)
                .bind(observation.confidence)
                .bind(observation.text_len)
                .bind(now)
                .bind(now)
                .execute(&self.pool)
                .await?;
            }
            Some((pattern, _similarity)) => {
                if observation.engine_rank > pattern.engine_rank {
                    if !observation.success {
                        log::debug!(
                            "higher-rank engine {} failed where pattern {} succeeded; not recorded",
                            observation.engine,
                            pattern.id
                        );
                        return Ok(());
                    }
                    sqlx::query(
                        r#"
                        UPDATE observed_patterns
                        SET engine = ?, engine_rank = ?, confidence = ?,
                            text_len = ?, confirmations = confirmations + 1,
                            updated_at = ?
                        WHERE id = ?
                        "#,
                    )
                    .bind(&observation.engine)
                    .bind(observation.engine_rank)
                    .bind(observation.confidence)
                    .bind(observation.text_len)
                    .bind(now)
                    .bind(&pattern.id)
                    .execute(&self.pool)
                    .await?;
                } else if self.materially_different(&pattern, observation) {
                    // Count bump and deprecation flip happen in the
                    // insert trigger, atomically.
                    sqlx::query(
                        r#"
                        INSERT INTO divergences
                            (id, pattern_id, engine, engine_rank,
                             expected_confidence, actual_confidence, recorded_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(Uuid::new_v4().to_string())
                    .bind(&pattern.id)
                    .bind(&observation.engine)
                    .bind(observation.engine_rank)
                    .bind(pattern.confidence)
                    .bind(observation.confidence)
                    .bind(now)
                    .execute(&self.pool)
                    .await?;
                } else {
                    sqlx::query(
                        "UPDATE observed_patterns SET confirmations = confirmations + 1, updated_at = ? WHERE id = ?",
                    )
                    .bind(now)
                    .bind(&pattern.id)
                    .execute(&self.pool)
                    .await?;
                }
            }
        }
        Ok(())
    }

    fn materially_different(&self, pattern: &ObservedPattern, observation: &Observation) -> bool {
        !observation.success
            || (pattern.confidence - observation.confidence).abs() > MATERIAL_CONFIDENCE_DROP
    }

    /// Fail-open wrapper around [`learn_from_page`]: storage trouble is
    /// logged and dropped so extraction never stalls on the store.
    ///
    /// [`learn_from_page`]: ContextStore::learn_from_page
    pub async fn record_outcome(
        &self,
        case_id: &str,
        signature: &PageSignature,
        observation: &Observation,
    ) {
        if let Err(e) = self.learn_from_page(case_id, signature, observation).await {
            log::warn!(
                "dropping outcome for engine {} on case {case_id}: {e}",
                observation.engine
            );
        }
    }

    /// Per-engine aggregates from the store's SQL views.
    pub async fn engine_stats(&self) -> Result<Vec<EngineStats>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT p.engine, p.pattern_count, p.confirmations, p.avg_confidence,
                   p.deprecated_count,
                   COALESCE(d.divergence_count, 0) AS divergence_count
            FROM engine_pattern_stats p
            LEFT JOIN engine_divergence_stats d ON d.engine = p.engine
            ORDER BY p.engine
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| EngineStats {
                engine: row.get("engine"),
                pattern_count: row.get("pattern_count"),
                confirmations: row.get("confirmations"),
                avg_confidence: row.get("avg_confidence"),
                deprecated_count: row.get("deprecated_count"),
                divergence_count: row.get("divergence_count"),
            })
            .collect())
    }

    /// Number of patterns of a case, split by deprecation state.
    pub async fn pattern_count(&self, case_id: &str, deprecated: bool) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM observed_patterns WHERE case_id = ? AND deprecated = ?",
        )
        .bind(case_id)
        .bind(deprecated as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }
}
