//! Specialization cache.
//!
//! Rewrites are memoized per (program, target, entry, argument-type
//! signature). Failed rewrites are cached too, so a kernel that cannot be
//! specialized reports the same error on every call without redoing work.
//!
//! Lookups take a read lock. A miss computes the specialization without
//! holding any lock; if another thread inserted the same key in the
//! meantime, its entry wins and the local result is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::trace;

use crate::error::RewriteError;
use crate::mir::DefId;
use crate::program::ProgramId;
use crate::rewrite::Specialization;
use crate::ty::Type;

/// Key of one cached rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecKey {
    pub program: ProgramId,
    /// Name of the target tag.
    pub target: &'static str,
    pub entry: DefId,
    pub signature: Vec<Type>,
}

/// Outcome of a rewrite as stored in the cache.
pub type CachedSpecialization = Result<Arc<Specialization>, RewriteError>;

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Thread-safe memo table of rewrites.
#[derive(Debug, Default)]
pub struct SpecializationCache {
    entries: RwLock<HashMap<SpecKey, CachedSpecialization>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SpecializationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SpecKey) -> Option<CachedSpecialization> {
        self.entries.read().get(key).cloned()
    }

    /// The cached outcome for `key`, computing it with `compute` on a miss.
    pub fn get_or_insert_with(
        &self,
        key: SpecKey,
        compute: impl FnOnce() -> CachedSpecialization,
    ) -> CachedSpecialization {
        if let Some(cached) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return cached;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let computed = compute();

        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            trace!(entry = %key.entry, target = key.target, "lost specialization race");
        }
        entries.entry(key).or_insert(computed).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
