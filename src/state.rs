use crate::services::{
    code_generator::CodeGenerator, lifecycle::LifecycleManager, redemption_store::RedemptionStore,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub generator: CodeGenerator,
    pub lifecycle: LifecycleManager,
}

impl AppState {
    pub fn new(db: Arc<SqlitePool>, items_per_page: i64) -> Self {
        let store = RedemptionStore::new(db.clone());
        Self {
            db,
            generator: CodeGenerator::new(store.clone()),
            lifecycle: LifecycleManager::new(store, items_per_page),
        }
    }
}
