//! Per-session record cache with per-key claims.
//!
//! The runner is the only writer: it claims a key before computing it and
//! fulfils the claim with the finished record. While a key is claimed, other
//! threads asking for it block until the owner either fulfils the claim (they
//! then see a hit) or drops it after a failure (one of them claims next).
//! At most one computation per key is ever in flight.

use crate::key::CacheKey;
use crate::record::AnalysisRecord;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct CacheState {
    records: HashMap<CacheKey, Arc<AnalysisRecord>>,
    claims: HashMap<CacheKey, ThreadId>,
    waiting: HashMap<ThreadId, CacheKey>,
}

impl CacheState {
    /// Follow the wait-for chain starting at `owner`. Returns the keys along
    /// the chain if it leads back to a key claimed by `me`.
    fn wait_cycle(&self, key: &CacheKey, mut owner: ThreadId, me: ThreadId) -> Option<Vec<CacheKey>> {
        let mut chain = vec![key.clone()];
        for _ in 0..=self.claims.len() {
            let next = self.waiting.get(&owner)?;
            chain.push(next.clone());
            match self.claims.get(next) {
                Some(&holder) if holder == me => return Some(chain),
                Some(&holder) => owner = holder,
                None => return None,
            }
        }
        None
    }
}

/// Why a claim could not be granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ClaimConflict {
    /// The calling thread already holds this key.
    Reentrant,
    /// Waiting would close a wait-for loop across threads.
    WaitCycle(Vec<CacheKey>),
}

pub(crate) enum Claim<'c> {
    Hit(Arc<AnalysisRecord>),
    Owned(ClaimGuard<'c>),
}

/// Exclusive right to compute one key. Dropping it unfulfilled releases the
/// key without inserting anything.
pub(crate) struct ClaimGuard<'c> {
    cache: &'c AnalysisCache,
    key: CacheKey,
    fulfilled: bool,
}

impl ClaimGuard<'_> {
    pub(crate) fn fulfill(mut self, record: AnalysisRecord) -> Arc<AnalysisRecord> {
        let record = Arc::new(record);
        {
            let mut state = self.cache.state.lock();
            state.records.insert(self.key.clone(), Arc::clone(&record));
            state.claims.remove(&self.key);
        }
        self.fulfilled = true;
        self.cache.ready.notify_all();
        record
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.fulfilled {
            return;
        }
        self.cache.state.lock().claims.remove(&self.key);
        self.cache.ready.notify_all();
    }
}

#[derive(Debug, Default)]
pub struct AnalysisCache {
    state: Mutex<CacheState>,
    ready: Condvar,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached record for `key`, or the right to compute it.
    pub(crate) fn claim(&self, key: &CacheKey) -> Result<Claim<'_>, ClaimConflict> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            if let Some(record) = state.records.get(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Claim::Hit(Arc::clone(record)));
            }

            match state.claims.get(key).copied() {
                None => {
                    state.claims.insert(key.clone(), me);
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(Claim::Owned(ClaimGuard {
                        cache: self,
                        key: key.clone(),
                        fulfilled: false,
                    }));
                }
                Some(owner) if owner == me => return Err(ClaimConflict::Reentrant),
                Some(owner) => {
                    if let Some(chain) = state.wait_cycle(key, owner, me) {
                        return Err(ClaimConflict::WaitCycle(chain));
                    }
                    state.waiting.insert(me, key.clone());
                    self.ready.wait(&mut state);
                    state.waiting.remove(&me);
                }
            }
        }
    }

    /// Look up a record without computing or counting.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<AnalysisRecord>> {
        self.state.lock().records.get(key).cloned()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().records.contains_key(key)
    }

    /// Insert a record unless its key is already cached or being computed.
    /// Returns whether the record was inserted.
    pub(crate) fn insert_if_absent(&self, record: AnalysisRecord) -> bool {
        let mut state = self.state.lock();
        if state.records.contains_key(record.key()) || state.claims.contains_key(record.key()) {
            return false;
        }
        state.records.insert(record.key().clone(), Arc::new(record));
        true
    }

    /// Every record, ordered by key.
    pub fn records(&self) -> Vec<Arc<AnalysisRecord>> {
        let mut records: Vec<Arc<AnalysisRecord>> =
            self.state.lock().records.values().cloned().collect();
        records.sort_by(|a, b| a.key().cmp(b.key()));
        records
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Drop every record. In-flight computations are unaffected and will
    /// insert when they finish.
    pub fn clear(&self) {
        self.state.lock().records.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            entries: self.len(),
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}
