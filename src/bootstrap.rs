//! Schema setup and first-run seeding.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::{fs, path::Path};

/// Schema embedded at build time so tests and `--migrate` share one source.
const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

/// Apply the embedded schema. Every statement is `IF NOT EXISTS`, so this is
/// safe to run on each start.
pub async fn apply_schema(db: &SqlitePool) -> Result<()> {
    tracing::info!("Applying embedded schema...");
    execute_script(db, SCHEMA)
        .await
        .context("applying embedded schema")
}

/// Execute the SQL script at `path` only if no redemption codes exist yet.
///
/// Returns whether the script ran.
pub async fn seed_if_empty(db: &SqlitePool, path: &Path) -> Result<bool> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM redemptions")
        .fetch_one(db)
        .await
        .context("checking for existing redemption codes")?;

    if existing > 0 {
        tracing::info!(
            "Database already contains {} redemption codes, skipping seed",
            existing
        );
        return Ok(false);
    }

    let sql = fs::read_to_string(path)
        .with_context(|| format!("reading seed script {}", path.display()))?;
    tracing::info!("Seeding database from {}", path.display());
    execute_script(db, &sql)
        .await
        .with_context(|| format!("executing seed script {}", path.display()))?;
    Ok(true)
}

/// Run a multi-statement script. SQLite does the statement splitting, so
/// comments and `;` inside string literals are handled.
async fn execute_script(db: &SqlitePool, sql: &str) -> Result<()> {
    tracing::debug!("Executing SQL script ({} bytes)", sql.len());
    sqlx::raw_sql(sql).execute(db).await?;
    Ok(())
}
