//! Per-identity resolution cache.
//!
//! Each identity maps to either a finished [`ResolvedConfig`] or a pending,
//! shared future. Concurrent callers for the same identity all await the same
//! shared future, so resolution runs once and a caller that gives up waiting
//! does not stop the others from receiving the result.
//!
//! Lazy schema fetches are shared the same way, keyed by module, so a module
//! and its extension instances requested together fetch the schema once.

use crate::error::EngineResult;
use crate::subscriptions::Mutation;
use crate::types::{ConfigIdentity, ResolvedConfig};
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) type SharedResolution = Shared<BoxFuture<'static, EngineResult<Arc<ResolvedConfig>>>>;

/// An in-flight schema fetch for one module.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, EngineResult<()>>>;

pub(crate) enum CacheEntry {
    Ready(Arc<ResolvedConfig>),
    /// `token` tells a finishing resolution whether its entry is still the
    /// one in the map (it may have been cleared meanwhile).
    Pending { token: u64, future: SharedResolution },
}

/// Counters describing cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Accesses served from a finished entry.
    pub hits: u64,
    /// Accesses that started a new resolution.
    pub misses: u64,
    /// Accesses that joined a resolution already in flight.
    pub waits: u64,
    /// Resolutions actually computed.
    pub resolutions: u64,
}

#[derive(Default)]
pub(crate) struct ResolutionCache {
    entries: Mutex<HashMap<ConfigIdentity, CacheEntry>>,
    /// Module -> schema fetch in flight. Removed by the fetch when it ends.
    fetches: Mutex<HashMap<String, SharedFetch>>,
    next_token: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    waits: AtomicU64,
    resolutions: AtomicU64,
}

impl ResolutionCache {
    pub fn lock(&self) -> MutexGuard<'_, HashMap<ConfigIdentity, CacheEntry>> {
        self.entries.lock()
    }

    pub(crate) fn fetches(&self) -> MutexGuard<'_, HashMap<String, SharedFetch>> {
        self.fetches.lock()
    }

    pub fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wait(&self) {
        self.waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolution(&self) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
    }

    /// Finished entry for `identity`, if any. Never waits.
    pub fn ready(&self, identity: &ConfigIdentity) -> Option<Arc<ResolvedConfig>> {
        match self.lock().get(identity) {
            Some(CacheEntry::Ready(resolved)) => Some(Arc::clone(resolved)),
            _ => None,
        }
    }

    /// Drop finished entries affected by `mutation`.
    ///
    /// Pending entries are kept: they read the engine snapshot only when they
    /// finish, under this same lock, so they already see the mutation.
    pub fn invalidate(&self, mutation: &Mutation) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|identity, entry| match entry {
            CacheEntry::Ready(_) => !mutation.affects(identity),
            CacheEntry::Pending { .. } => true,
        });
        before - entries.len()
    }

    /// Drop everything, including resolutions in flight.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
            resolutions: self.resolutions.load(Ordering::Relaxed),
        }
    }
}
