//! Code-keyed registry of bucket instances.
//!
//! The repository guarantees at most one bucket instance per unique code,
//! even when parallel statement imports race to create the same bucket.
//! Reads take the lock-free-ish fast path through the `RwLock`; creation
//! is serialized behind a single mutex with a re-check before insert.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::domain::bucket::BudgetBucket;
use crate::errors::BudgetError;

/// Injected registry of buckets, keyed by normalized code.
///
/// `initialise` rebuilds the table and is intended for application
/// startup/file load only, never concurrently with reads. All other
/// operations are safe for concurrent use.
pub struct BucketRepository {
    buckets: RwLock<HashMap<String, Arc<BudgetBucket>>>,
    create_guard: Mutex<()>,
}

impl BucketRepository {
    /// Creates a repository holding only the mandatory system buckets.
    pub fn new() -> Self {
        let repository = Self {
            buckets: RwLock::new(HashMap::new()),
            create_guard: Mutex::new(()),
        };
        repository.initialise(Vec::new());
        repository
    }

    pub fn get_by_code(&self, code: &str) -> Option<Arc<BudgetBucket>> {
        let key = code.trim().to_uppercase();
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    pub fn is_valid_code(&self, code: &str) -> bool {
        self.get_by_code(code).is_some()
    }

    /// Returns the bucket for the code, creating and storing it via the
    /// factory when absent. The factory runs at most once per code across
    /// all concurrent callers; every caller receives the same instance.
    pub fn get_or_create_new<F>(
        &self,
        code: &str,
        factory: F,
    ) -> Result<Arc<BudgetBucket>, BudgetError>
    where
        F: FnOnce(&str) -> Result<BudgetBucket, BudgetError>,
    {
        let key = code.trim().to_uppercase();
        if let Some(existing) = self.get_by_code(&key) {
            return Ok(existing);
        }
        let _guard = self
            .create_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Second check: another caller may have won the race while we
        // waited for the creation lock.
        if let Some(existing) = self.get_by_code(&key) {
            return Ok(existing);
        }
        let bucket = Arc::new(factory(&key)?);
        self.buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, bucket.clone());
        tracing::debug!(code = %bucket.code(), "created bucket");
        Ok(bucket)
    }

    /// All known buckets, sorted by code.
    pub fn buckets(&self) -> Vec<Arc<BudgetBucket>> {
        let mut all: Vec<Arc<BudgetBucket>> = self
            .buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.code().cmp(b.code()));
        all
    }

    /// Rebuilds the lookup table from loaded data. The system buckets
    /// (surplus, pay-credit-card, journal) are always re-injected,
    /// regardless of what was loaded.
    pub fn initialise(&self, known_buckets: Vec<BudgetBucket>) {
        let mut table = HashMap::new();
        for bucket in known_buckets {
            table
                .entry(bucket.code().to_string())
                .or_insert_with(|| Arc::new(bucket));
        }
        for system in [
            BudgetBucket::surplus(),
            BudgetBucket::pay_credit_card(),
            BudgetBucket::journal(),
        ] {
            table.insert(system.code().to_string(), Arc::new(system));
        }
        *self
            .buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner) = table;
    }
}

impl Default for BucketRepository {
    fn default() -> Self {
        Self::new()
    }
}
