//! Read, update and bulk lifecycle operations over stored redemption codes.
//!
//! Name-scoped count/delete match `name` exactly, while `search` matches a
//! substring. Empty names and empty id lists are rejected up front.

use crate::{
    models::redemption::{Redemption, RedemptionStatus},
    services::{
        redemption_store::{RedemptionStore, StoreError},
        validation::{self, ValidationError},
    },
};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// One page of records plus the total number of matches.
#[derive(Debug, Serialize)]
pub struct Page {
    pub items: Vec<Redemption>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

/// The two update modes.
///
/// `Fields` overwrites exactly `name, quota, valid_from, valid_until`. A new
/// mutable field must be added both here and to `RedemptionStore::update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateRequest {
    Status {
        id: i64,
        status: RedemptionStatus,
    },
    Fields {
        id: i64,
        name: String,
        quota: i64,
        valid_from: i64,
        valid_until: i64,
    },
}

impl UpdateRequest {
    pub fn id(&self) -> i64 {
        match self {
            Self::Status { id, .. } | Self::Fields { id, .. } => *id,
        }
    }
}

#[derive(Clone)]
pub struct LifecycleManager {
    store: RedemptionStore,
    default_page_size: i64,
}

impl LifecycleManager {
    pub fn new(store: RedemptionStore, default_page_size: i64) -> Self {
        Self {
            store,
            default_page_size: default_page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Normalize 0-based `page` and `page_size` into (page, size, offset).
    fn paging(&self, page: i64, page_size: i64) -> (i64, i64, i64) {
        let page = page.max(0);
        let size = if page_size < 1 {
            self.default_page_size
        } else {
            page_size.min(MAX_PAGE_SIZE)
        };
        (page, size, page.saturating_mul(size))
    }

    pub async fn list(&self, page: i64, page_size: i64) -> LifecycleResult<Page> {
        let (page, page_size, offset) = self.paging(page, page_size);
        let (items, total) = self.store.list(offset, page_size).await?;
        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    pub async fn search(&self, keyword: &str, page: i64, page_size: i64) -> LifecycleResult<Page> {
        let (page, page_size, offset) = self.paging(page, page_size);
        let (items, total) = self.store.search(keyword, offset, page_size).await?;
        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    pub async fn get(&self, id: i64) -> LifecycleResult<Redemption> {
        Ok(self.store.get_by_id(id).await?)
    }

    /// Load the record, apply exactly the fields the request variant owns,
    /// and persist.
    pub async fn update(&self, request: UpdateRequest) -> LifecycleResult<Redemption> {
        if let UpdateRequest::Fields {
            name,
            valid_from,
            valid_until,
            ..
        } = &request
        {
            validation::validate_name(name)?;
            validation::validate_window(*valid_from, *valid_until)?;
        }

        let mut record = self.store.get_by_id(request.id()).await?;
        match request {
            UpdateRequest::Status { status, .. } => {
                record.status = status;
            }
            UpdateRequest::Fields {
                name,
                quota,
                valid_from,
                valid_until,
                ..
            } => {
                record.name = name;
                record.quota = quota;
                record.valid_from = valid_from;
                record.valid_until = valid_until;
            }
        }

        let updated = self.store.update(&record).await?;
        info!(id = updated.id, status = %updated.status, "updated redemption code");
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> LifecycleResult<()> {
        if self.store.delete_by_id(id).await? == 0 {
            return Err(StoreError::NotFound(id).into());
        }
        info!(id, "deleted redemption code");
        Ok(())
    }

    pub async fn count_by_name(&self, name: &str) -> LifecycleResult<i64> {
        validation::require_name(name)?;
        Ok(self.store.count_by_name(name).await?)
    }

    pub async fn delete_by_name(&self, name: &str) -> LifecycleResult<u64> {
        validation::require_name(name)?;
        let deleted = self.store.delete_by_name(name).await?;
        info!(name, deleted, "deleted redemption codes by name");
        Ok(deleted)
    }

    /// Disable every listed code; the count may be lower than `ids.len()`.
    pub async fn disable(&self, ids: &[i64]) -> LifecycleResult<u64> {
        validation::require_ids(ids)?;
        let affected = self.store.disable_by_ids(ids).await?;
        info!(requested = ids.len(), affected, "disabled redemption codes");
        Ok(affected)
    }

    pub async fn delete_disabled(&self) -> LifecycleResult<u64> {
        let deleted = self.store.delete_all_disabled().await?;
        info!(deleted, "deleted disabled redemption codes");
        Ok(deleted)
    }
}
