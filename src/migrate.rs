//! Idempotent schema setup for the pattern store.
//!
//! Everything here is `IF NOT EXISTS` except the deprecation trigger,
//! which embeds the configured divergence limit and is therefore dropped
//! and recreated on every run so a config change takes effect.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool, divergence_limit: i64) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cases (
            id TEXT PRIMARY KEY,
            fingerprint TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create cases table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS observed_patterns (
            id TEXT PRIMARY KEY,
            case_id TEXT NOT NULL REFERENCES cases(id),
            signature BLOB NOT NULL,
            engine TEXT NOT NULL,
            engine_rank REAL NOT NULL,
            confidence REAL NOT NULL,
            text_len INTEGER NOT NULL,
            confirmations INTEGER NOT NULL DEFAULT 1,
            divergence_count INTEGER NOT NULL DEFAULT 0,
            deprecated INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create observed_patterns table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS divergences (
            id TEXT PRIMARY KEY,
            pattern_id TEXT NOT NULL REFERENCES observed_patterns(id),
            engine TEXT NOT NULL,
            engine_rank REAL NOT NULL,
            expected_confidence REAL NOT NULL,
            actual_confidence REAL NOT NULL,
            recorded_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create divergences table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_patterns_case ON observed_patterns(case_id)",
    )
    .execute(pool)
    .await
    .context("Failed to create patterns index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_divergences_pattern ON divergences(pattern_id)",
    )
    .execute(pool)
    .await
    .context("Failed to create divergences index")?;

    // The count bump and the deprecated flip happen in the same trigger
    // body, so a pattern crossing the limit can never be observed with
    // the count updated but the flag unset.
    sqlx::query("DROP TRIGGER IF EXISTS trg_divergence_deprecation")
        .execute(pool)
        .await
        .context("Failed to drop deprecation trigger")?;

    let trigger = format!(
        r#"
        CREATE TRIGGER trg_divergence_deprecation
        AFTER INSERT ON divergences
        BEGIN
            UPDATE observed_patterns
            SET divergence_count = divergence_count + 1,
                deprecated = CASE
                    WHEN divergence_count + 1 >= {divergence_limit} THEN 1
                    ELSE deprecated
                END
            WHERE id = NEW.pattern_id;
        END
        "#
    );
    sqlx::query(&trigger)
        .execute(pool)
        .await
        .context("Failed to create deprecation trigger")?;

    sqlx::query(
        r#"
        CREATE VIEW IF NOT EXISTS engine_pattern_stats AS
        SELECT
            engine,
            COUNT(*) AS pattern_count,
            SUM(confirmations) AS confirmations,
            AVG(confidence) AS avg_confidence,
            SUM(deprecated) AS deprecated_count
        FROM observed_patterns
        GROUP BY engine
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create engine_pattern_stats view")?;

    sqlx::query(
        r#"
        CREATE VIEW IF NOT EXISTS engine_divergence_stats AS
        SELECT
            engine,
            COUNT(*) AS divergence_count,
            AVG(expected_confidence - actual_confidence) AS avg_confidence_drop
        FROM divergences
        GROUP BY engine
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create engine_divergence_stats view")?;

    Ok(())
}
