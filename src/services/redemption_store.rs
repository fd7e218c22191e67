//! src/services/redemption_store.rs
//!
//! RedemptionStore: durable storage for redemption codes backed by SQLite.
//! Uniqueness of `code` is enforced by the `idx_redemptions_code` UNIQUE
//! index, so concurrent inserts of the same code cannot both succeed.

use crate::{
    models::redemption::{NewRedemption, Redemption, RedemptionStatus},
    services::validation::{RedeemBlock, check_redeemable},
};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redemption {0} not found")]
    NotFound(i64),
    #[error("redemption code `{0}` already exists")]
    DuplicateCode(String),
    #[error("redemption {id} cannot be redeemed: {reason}")]
    NotRedeemable { id: i64, reason: RedeemBlock },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const COLUMNS: &str = "id, owner_id, name, code, quota, is_gift, max_uses, used_count, \
                       valid_from, valid_until, status, created_time";

/// RedemptionStore provides the persistence operations behind code
/// generation and lifecycle management:
/// - insert with unique-code enforcement
/// - lookup by id or code
/// - paged listing and case-sensitive substring search on `name`
/// - exact-name bulk count/delete, bulk disable, delete-all-disabled
/// - the atomic usage increment used by redemption
///
/// Pages are ordered by `id ASC`; ids only grow, so rows inserted elsewhere
/// never shift earlier pages.
#[derive(Clone)]
pub struct RedemptionStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl RedemptionStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Persist a new record and return it with its assigned id.
    ///
    /// Returns DuplicateCode when the UNIQUE index on `code` rejects the row.
    pub async fn insert(&self, draft: &NewRedemption) -> StoreResult<Redemption> {
        let result = sqlx::query_as::<_, Redemption>(
            r#"
            INSERT INTO redemptions (
                owner_id, name, code, quota, is_gift, max_uses, used_count,
                valid_from, valid_until, status, created_time
            ) VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
            RETURNING id, owner_id, name, code, quota, is_gift, max_uses, used_count,
                      valid_from, valid_until, status, created_time
            "#,
        )
        .bind(draft.owner_id)
        .bind(&draft.name)
        .bind(&draft.code)
        .bind(draft.quota)
        .bind(draft.is_gift)
        .bind(draft.max_uses)
        .bind(draft.valid_from)
        .bind(draft.valid_until)
        .bind(RedemptionStatus::Unused)
        .bind(draft.created_time)
        .fetch_one(&*self.db)
        .await;

        match result {
            Ok(rec) => Ok(rec),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::DuplicateCode(draft.code.clone()))
            }
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    /// Fetch a record by id. Returns NotFound if missing.
    pub async fn get_by_id(&self, id: i64) -> StoreResult<Redemption> {
        sqlx::query_as::<_, Redemption>(&format!(
            "SELECT {COLUMNS} FROM redemptions WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NotFound(id),
            other => StoreError::Sqlx(other),
        })
    }

    /// Fetch a record by its code value, if any.
    pub async fn get_by_code(&self, code: &str) -> StoreResult<Option<Redemption>> {
        let rec = sqlx::query_as::<_, Redemption>(&format!(
            "SELECT {COLUMNS} FROM redemptions WHERE code = ?"
        ))
        .bind(code)
        .fetch_optional(&*self.db)
        .await?;
        Ok(rec)
    }

    /// Page through every record in id order.
    pub async fn list(&self, offset: i64, limit: i64) -> StoreResult<(Vec<Redemption>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM redemptions")
            .fetch_one(&*self.db)
            .await?;

        let rows = sqlx::query_as::<_, Redemption>(&format!(
            "SELECT {COLUMNS} FROM redemptions ORDER BY id ASC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.db)
        .await?;

        debug!(offset, limit, total, "listed redemptions");
        Ok((rows, total))
    }

    /// Case-sensitive substring search on `name`.
    ///
    /// `instr` is used instead of `LIKE` so the match is case-sensitive for
    /// all of Unicode and `%`/`_` in the keyword are literal.
    pub async fn search(
        &self,
        keyword: &str,
        offset: i64,
        limit: i64,
    ) -> StoreResult<(Vec<Redemption>, i64)> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM redemptions WHERE instr(name, ?) > 0")
                .bind(keyword)
                .fetch_one(&*self.db)
                .await?;

        let rows = sqlx::query_as::<_, Redemption>(&format!(
            "SELECT {COLUMNS} FROM redemptions WHERE instr(name, ?) > 0 \
             ORDER BY id ASC LIMIT ? OFFSET ?"
        ))
        .bind(keyword)
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.db)
        .await?;

        debug!(keyword, offset, limit, total, "searched redemptions");
        Ok((rows, total))
    }

    /// Write the mutable fields of `record` back to its row.
    ///
    /// Mutable columns are `name, quota, valid_from, valid_until, status`.
    /// A new mutable field has to be added here and to the lifecycle
    /// `UpdateRequest` allow-list.
    pub async fn update(&self, record: &Redemption) -> StoreResult<Redemption> {
        sqlx::query_as::<_, Redemption>(&format!(
            "UPDATE redemptions
             SET name = ?, quota = ?, valid_from = ?, valid_until = ?, status = ?
             WHERE id = ?
             RETURNING {COLUMNS}"
        ))
        .bind(&record.name)
        .bind(record.quota)
        .bind(record.valid_from)
        .bind(record.valid_until)
        .bind(record.status)
        .bind(record.id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(StoreError::NotFound(record.id))
    }

    pub async fn delete_by_id(&self, id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM redemptions WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }

    /// Exact-match count on `name`.
    pub async fn count_by_name(&self, name: &str) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM redemptions WHERE name = ?")
            .bind(name)
            .fetch_one(&*self.db)
            .await?;
        Ok(count)
    }

    /// Exact-match bulk delete on `name`.
    pub async fn delete_by_name(&self, name: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM redemptions WHERE name = ?")
            .bind(name)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }

    /// Move every listed record that is not already disabled to Disabled.
    ///
    /// Unknown ids are skipped; the returned count covers only rows that
    /// actually changed.
    pub async fn disable_by_ids(&self, ids: &[i64]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE redemptions SET status = ");
        builder.push_bind(RedemptionStatus::Disabled);
        builder.push(" WHERE status <> ");
        builder.push_bind(RedemptionStatus::Disabled);
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&*self.db).await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_all_disabled(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM redemptions WHERE status = ?")
            .bind(RedemptionStatus::Disabled)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }

    /// Atomically count one redemption of `id` at Unix time `now`.
    ///
    /// The increment only applies while the code is Unused, inside its
    /// validity window and below `max_uses`; reaching a positive limit flips
    /// the status to Used in the same statement. Concurrent callers can
    /// therefore never push `used_count` past `max_uses`.
    ///
    /// Entry point for redemption execution, which runs outside this crate.
    pub async fn record_use(&self, id: i64, now: i64) -> StoreResult<Redemption> {
        let updated = sqlx::query_as::<_, Redemption>(&format!(
            "UPDATE redemptions
             SET used_count = used_count + 1,
                 status = CASE WHEN max_uses > 0 AND used_count + 1 >= max_uses
                               THEN ? ELSE status END
             WHERE id = ?
               AND status = ?
               AND (valid_from = 0 OR valid_from <= ?)
               AND (valid_until = 0 OR ? < valid_until)
               AND (max_uses = 0 OR used_count < max_uses)
             RETURNING {COLUMNS}"
        ))
        .bind(RedemptionStatus::Used)
        .bind(id)
        .bind(RedemptionStatus::Unused)
        .bind(now)
        .bind(now)
        .fetch_optional(&*self.db)
        .await?;

        if let Some(rec) = updated {
            return Ok(rec);
        }

        // Nothing matched: report why using the current row.
        let current = self.get_by_id(id).await?;
        let reason = match check_redeemable(&current, now) {
            Err(reason) => reason,
            // Lost a race with a concurrent redemption that just exhausted it.
            Ok(()) => RedeemBlock::Exhausted,
        };
        Err(StoreError::NotRedeemable { id, reason })
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
