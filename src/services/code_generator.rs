//! Creation of redemption codes: one explicit code, a batch of generated
//! codes, or a batch with per-code random quota.
//!
//! Batches insert sequentially and stop at the first failure. Codes inserted
//! before the failure stay persisted and are returned alongside the error.

use crate::{
    models::redemption::{CodeSpec, NewRedemption, Redemption},
    services::{
        redemption_store::{RedemptionStore, StoreError},
        validation::{self, ValidationError},
    },
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Attempts per generated code before a collision is surfaced.
const MAX_CODE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A batch that stopped early. `created` holds the codes persisted before
/// the failure, in insertion order.
#[derive(Debug, Error)]
#[error("batch stopped after {} codes: {error}", .created.len())]
pub struct BatchFailure {
    pub created: Vec<String>,
    #[source]
    pub error: GenerateError,
}

impl BatchFailure {
    fn before_start(error: impl Into<GenerateError>) -> Self {
        Self {
            created: Vec::new(),
            error: error.into(),
        }
    }
}

pub type BatchResult = Result<Vec<String>, BatchFailure>;

#[derive(Clone)]
pub struct CodeGenerator {
    store: RedemptionStore,
    next_code: CodeSource,
}

/// Produces candidate code values for generated records.
pub type CodeSource = Arc<dyn Fn() -> String + Send + Sync>;

impl CodeGenerator {
    /// Generator drawing codes from random v4 UUIDs.
    pub fn new(store: RedemptionStore) -> Self {
        Self::with_code_source(store, Arc::new(new_code))
    }

    pub fn with_code_source(store: RedemptionStore, next_code: CodeSource) -> Self {
        Self { store, next_code }
    }

    /// Create a single record with a caller-supplied code.
    ///
    /// The lookup short-circuits the common duplicate case; the UNIQUE index
    /// still decides concurrent races.
    pub async fn generate_explicit(
        &self,
        spec: &CodeSpec,
        code: &str,
        quota: i64,
    ) -> Result<Redemption, GenerateError> {
        validation::validate_spec(spec)?;
        if code.is_empty() {
            return Err(ValidationError::EmptyCode.into());
        }

        if self.store.get_by_code(code).await?.is_some() {
            return Err(StoreError::DuplicateCode(code.to_string()).into());
        }

        let rec = self
            .store
            .insert(&NewRedemption::from_spec(spec, code, quota))
            .await?;
        info!(id = rec.id, name = %rec.name, "created redemption code");
        Ok(rec)
    }

    /// Create `count` records sharing `spec` and `quota`, each with a fresh code.
    pub async fn generate_batch(&self, spec: &CodeSpec, count: usize, quota: i64) -> BatchResult {
        validation::validate_spec(spec).map_err(BatchFailure::before_start)?;
        validation::validate_count(count).map_err(BatchFailure::before_start)?;

        self.run_batch(spec, count, || quota).await
    }

    /// Create `count` records whose quota is drawn uniformly from
    /// `[min_quota, max_quota]`, using a generator seeded for this call only.
    pub async fn generate_random_quota_batch(
        &self,
        spec: &CodeSpec,
        count: usize,
        min_quota: i64,
        max_quota: i64,
    ) -> BatchResult {
        let mut rng = StdRng::from_os_rng();
        self.generate_random_quota_batch_with_rng(&mut rng, spec, count, min_quota, max_quota)
            .await
    }

    /// Same as [`Self::generate_random_quota_batch`] with a caller-provided RNG.
    pub async fn generate_random_quota_batch_with_rng<R>(
        &self,
        rng: &mut R,
        spec: &CodeSpec,
        count: usize,
        min_quota: i64,
        max_quota: i64,
    ) -> BatchResult
    where
        R: Rng + Send,
    {
        validation::validate_spec(spec).map_err(BatchFailure::before_start)?;
        validation::validate_count(count).map_err(BatchFailure::before_start)?;
        validation::validate_quota_range(min_quota, max_quota)
            .map_err(BatchFailure::before_start)?;

        self.run_batch(spec, count, || {
            if min_quota == max_quota {
                min_quota
            } else {
                rng.random_range(min_quota..=max_quota)
            }
        })
        .await
    }

    async fn run_batch<F>(&self, spec: &CodeSpec, count: usize, mut next_quota: F) -> BatchResult
    where
        F: FnMut() -> i64 + Send,
    {
        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let quota = next_quota();
            match self.insert_generated(spec, quota).await {
                Ok(code) => created.push(code),
                Err(error) => {
                    warn!(
                        name = %spec.name,
                        created = created.len(),
                        requested = count,
                        error = %error,
                        "redemption batch stopped early"
                    );
                    return Err(BatchFailure { created, error });
                }
            }
        }

        info!(name = %spec.name, count, "created redemption batch");
        Ok(created)
    }

    /// Insert one record with a freshly generated code, regenerating on
    /// collision up to MAX_CODE_ATTEMPTS times.
    async fn insert_generated(&self, spec: &CodeSpec, quota: i64) -> Result<String, GenerateError> {
        let mut attempt = 1;
        loop {
            let code = (self.next_code)();
            match self
                .store
                .insert(&NewRedemption::from_spec(spec, code, quota))
                .await
            {
                Ok(rec) => return Ok(rec.code),
                Err(StoreError::DuplicateCode(code)) if attempt < MAX_CODE_ATTEMPTS => {
                    warn!(%code, attempt, "generated code collided, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// 32 lowercase hex characters from a v4 UUID.
pub fn new_code() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::redemption_store::testing::{memory_store, spec};
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicUsize, Ordering},
    };

    async fn generator() -> (CodeGenerator, RedemptionStore) {
        let store = memory_store().await;
        (CodeGenerator::new(store.clone()), store)
    }

    #[tokio::test]
    async fn explicit_code_rejects_duplicates() {
        let (generator, store) = generator().await;
        let rec = generator
            .generate_explicit(&spec("vip"), "VIP-2025", -50)
            .await
            .unwrap();
        assert_eq!(rec.code, "VIP-2025");
        assert_eq!(rec.quota, -50);
        assert_eq!(rec.owner_id, 1);

        let err = generator
            .generate_explicit(&spec("vip"), "VIP-2025", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Store(StoreError::DuplicateCode(_))));
        assert_eq!(store.count_by_name("vip").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn explicit_code_validates_before_touching_the_store() {
        let (generator, store) = generator().await;

        let err = generator
            .generate_explicit(&spec(""), "a", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Invalid(ValidationError::NameLength(0))));

        let err = generator
            .generate_explicit(&spec(&"x".repeat(21)), "b", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Invalid(ValidationError::NameLength(21))));

        let mut bad_window = spec("w");
        bad_window.valid_from = 100;
        bad_window.valid_until = 50;
        let err = generator
            .generate_explicit(&bad_window, "c", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Invalid(ValidationError::InvalidWindow { .. })));

        let err = generator.generate_explicit(&spec("w"), "", 1).await.unwrap_err();
        assert!(matches!(err, GenerateError::Invalid(ValidationError::EmptyCode)));

        let (_, total) = store.list(0, 10).await.unwrap();
        assert_eq!(total, 0);

        assert!(generator.generate_explicit(&spec("a"), "d", 1).await.is_ok());
        assert!(
            generator
                .generate_explicit(&spec(&"x".repeat(20)), "e", 1)
                .await
                .is_ok()
        );

        let mut open_start = spec("w");
        open_start.valid_until = 50;
        assert!(generator.generate_explicit(&open_start, "f", 1).await.is_ok());
        let mut open_end = spec("w");
        open_end.valid_from = 50;
        assert!(generator.generate_explicit(&open_end, "g", 1).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_explicit_codes_have_one_winner() {
        let (generator, store) = generator().await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let generator = generator.clone();
            handles.push(tokio::spawn(async move {
                generator
                    .generate_explicit(&spec("race"), "SAME-CODE", 1)
                    .await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(GenerateError::Store(StoreError::DuplicateCode(code))) => {
                    assert_eq!(code, "SAME-CODE")
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.count_by_name("race").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn batch_count_bounds() {
        let (generator, store) = generator().await;

        for bad in [0, 101] {
            let failure = generator.generate_batch(&spec("b"), bad, 5).await.unwrap_err();
            assert!(failure.created.is_empty());
            assert!(matches!(
                failure.error,
                GenerateError::Invalid(ValidationError::InvalidCount(n)) if n == bad
            ));
        }

        let one = generator.generate_batch(&spec("one"), 1, 5).await.unwrap();
        assert_eq!(one.len(), 1);

        let hundred = generator.generate_batch(&spec("hundred"), 100, 5).await.unwrap();
        assert_eq!(hundred.len(), 100);
        let unique: HashSet<_> = hundred.iter().collect();
        assert_eq!(unique.len(), 100);
        assert!(hundred.iter().all(|c| c.len() == 32));

        assert_eq!(store.count_by_name("hundred").await.unwrap(), 100);
        let rec = store.get_by_code(&hundred[0]).await.unwrap().unwrap();
        assert_eq!(rec.quota, 5);
    }

    #[tokio::test]
    async fn batch_reports_prefix_on_store_failure() {
        let (generator, store) = generator().await;
        sqlx::query(
            "CREATE TRIGGER fail_third BEFORE INSERT ON redemptions
             WHEN (SELECT COUNT(*) FROM redemptions) >= 2
             BEGIN SELECT RAISE(ABORT, 'simulated store failure'); END",
        )
        .execute(&*store.db)
        .await
        .unwrap();

        let failure = generator.generate_batch(&spec("partial"), 5, 1).await.unwrap_err();
        assert_eq!(failure.created.len(), 2);
        assert!(matches!(failure.error, GenerateError::Store(StoreError::Sqlx(_))));

        let (rows, total) = store.list(0, 10).await.unwrap();
        assert_eq!(total, 2);
        let stored: Vec<_> = rows.into_iter().map(|r| r.code).collect();
        assert_eq!(stored, failure.created);
    }

    #[tokio::test]
    async fn fixed_range_assigns_exact_quota() {
        let (generator, store) = generator().await;
        let codes = generator
            .generate_random_quota_batch(&spec("fixed"), 5, 10, 10)
            .await
            .unwrap();
        assert_eq!(codes.len(), 5);
        for code in &codes {
            let rec = store.get_by_code(code).await.unwrap().unwrap();
            assert_eq!(rec.quota, 10);
        }
    }

    #[tokio::test]
    async fn random_quota_stays_in_range() {
        let (generator, store) = generator().await;
        let mut rng = StdRng::seed_from_u64(7);
        let codes = generator
            .generate_random_quota_batch_with_rng(&mut rng, &spec("rand"), 50, 5, 15)
            .await
            .unwrap();

        let mut seen = HashSet::new();
        for code in &codes {
            let rec = store.get_by_code(code).await.unwrap().unwrap();
            assert!((5..=15).contains(&rec.quota), "quota {} out of range", rec.quota);
            seen.insert(rec.quota);
        }
        assert!(seen.len() > 1);

        let negative = generator
            .generate_random_quota_batch(&spec("debit"), 10, -20, -10)
            .await
            .unwrap();
        for code in &negative {
            let rec = store.get_by_code(code).await.unwrap().unwrap();
            assert!((-20..=-10).contains(&rec.quota));
        }
    }

    #[tokio::test]
    async fn inverted_range_is_rejected_before_generation() {
        let (generator, store) = generator().await;
        let failure = generator
            .generate_random_quota_batch(&spec("bad"), 5, 15, 5)
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            GenerateError::Invalid(ValidationError::InvalidRange { min: 15, max: 5 })
        ));
        assert_eq!(store.count_by_name("bad").await.unwrap(), 0);
    }

    /// Source that returns fresh codes for the first `fresh` calls and
    /// `taken` afterwards, counting every call.
    fn scripted_source(fresh: usize, taken: &'static str) -> (CodeSource, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let source: CodeSource = Arc::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < fresh { new_code() } else { taken.to_string() }
        });
        (source, calls)
    }

    #[tokio::test]
    async fn colliding_generated_code_is_regenerated() {
        let store = memory_store().await;
        store
            .insert(&NewRedemption::from_spec(&spec("seed"), "TAKEN", 1))
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let generator = CodeGenerator::with_code_source(
            store.clone(),
            Arc::new(move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    "TAKEN".to_string()
                } else {
                    new_code()
                }
            }),
        );

        let codes = generator.generate_batch(&spec("retry"), 2, 3).await.unwrap();
        assert_eq!(codes.len(), 2);
        assert!(codes.iter().all(|c| c != "TAKEN"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.count_by_name("retry").await.unwrap(), 2);
        assert_eq!(store.count_by_name("seed").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn persistent_collision_stops_batch_after_three_attempts() {
        let store = memory_store().await;
        store
            .insert(&NewRedemption::from_spec(&spec("seed"), "TAKEN", 1))
            .await
            .unwrap();

        let (source, calls) = scripted_source(1, "TAKEN");
        let generator = CodeGenerator::with_code_source(store.clone(), source);

        let failure = generator.generate_batch(&spec("stuck"), 3, 3).await.unwrap_err();
        assert_eq!(failure.created.len(), 1);
        assert!(matches!(
            failure.error,
            GenerateError::Store(StoreError::DuplicateCode(ref code)) if code == "TAKEN"
        ));
        // One fresh code, then exactly MAX_CODE_ATTEMPTS tries at the taken one.
        assert_eq!(calls.load(Ordering::SeqCst), 1 + MAX_CODE_ATTEMPTS);
        assert_eq!(store.count_by_name("stuck").await.unwrap(), 1);
    }
}
