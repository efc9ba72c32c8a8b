//! Database schema management for the probos backend.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::SqlitePool;

// ---

/// Create the database schema (idempotent).
///
/// Four tables: `sensors` (unique on external_id, indexed by zone),
/// `readings` (indexed by sensor and timestamp), `trust_results` (indexed
/// by sensor) and `tickets` (indexed by status and by sensor). Safe to call
/// on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensors (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id   TEXT    NOT NULL UNIQUE,
            zone          TEXT    NOT NULL,
            sensor_type   TEXT    NOT NULL,
            latitude      REAL,
            longitude     REAL,
            installed_at  TEXT    NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Append-only probe readings
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS readings (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            sensor_id          INTEGER NOT NULL REFERENCES sensors(id),
            timestamp          TEXT    NOT NULL,
            moisture           REAL,
            temperature        REAL,
            ec                 REAL,
            ph                 REAL,
            air_temp           REAL,
            is_raining         INTEGER,
            irrigation_active  INTEGER
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // One verdict per scored reading; scalar columns for filtering plus the
    // full JSON document in `detail`
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trust_results (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            sensor_id     INTEGER NOT NULL REFERENCES sensors(id),
            score         REAL    NOT NULL,
            status        TEXT    NOT NULL,
            severity      TEXT    NOT NULL,
            evaluated_at  TEXT    NOT NULL,
            detail        TEXT    NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tickets (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            sensor_id    INTEGER NOT NULL REFERENCES sensors(id),
            issue        TEXT    NOT NULL,
            severity     TEXT    NOT NULL,
            status       TEXT    NOT NULL,
            created_at   TEXT    NOT NULL,
            resolved_at  TEXT
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Basic indexes for common queries
    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_sensors_zone ON sensors (zone);",
        "CREATE INDEX IF NOT EXISTS idx_readings_sensor_ts ON readings (sensor_id, timestamp);",
        "CREATE INDEX IF NOT EXISTS idx_trust_results_sensor ON trust_results (sensor_id, id);",
        "CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets (status);",
        "CREATE INDEX IF NOT EXISTS idx_tickets_sensor ON tickets (sensor_id);",
    ] {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}
