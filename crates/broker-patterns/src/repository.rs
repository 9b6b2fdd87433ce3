// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mqcore contributors

//! The hierarchical pattern repository itself: registration, lookup,
//! listener notification, and the cache coherence protocol around them.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;

use crate::error::PatternError;
use crate::pattern::{specificity_cmp, Pattern};

/// Combines values registered at different specificities into one result.
///
/// Supplied at construction time rather than discovered by reflection (the
/// source detects a `Mergeable` payload via a runtime type check; here it is
/// an explicit constructor-injected collaborator instead, per the redesign
/// notes).
pub trait Reducer<V>: Send + Sync {
    /// Fold `next` into `acc`. `acc` starts as the least-specific matching
    /// value and is updated, in specificity order, by every value that
    /// matched more specifically.
    fn reduce(&self, acc: &mut V, next: &V);
}

/// Opaque handle returned by [`PatternRepository::register_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry<V> {
    pattern: Pattern,
    value: V,
    immutable: bool,
}

struct Inner<V> {
    patterns: HashMap<String, Entry<V>>,
    default: V,
    listeners: Vec<(ListenerId, Arc<dyn Fn() + Send + Sync>)>,
}

/// Resolves lookup keys against a set of wildcard patterns, merging
/// matches by specificity behind a coherent read cache.
///
/// See [`crate`] module docs for the invariants this type upholds.
pub struct PatternRepository<V> {
    inner: RwLock<Inner<V>>,
    cache: DashMap<String, V>,
    reducer: Option<Box<dyn Reducer<V>>>,
    next_listener_id: AtomicU64,
}

impl<V> PatternRepository<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a repository with `default` returned for unmatched keys and
    /// no merge reduction: the most specific matching value wins outright.
    pub fn new(default: V) -> Self {
        Self::with_reducer(default, None)
    }

    /// Create a repository that folds matches together with `reducer`.
    pub fn with_merge(default: V, reducer: impl Reducer<V> + 'static) -> Self {
        Self::with_reducer(default, Some(Box::new(reducer)))
    }

    fn with_reducer(default: V, reducer: Option<Box<dyn Reducer<V>>>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                patterns: HashMap::new(),
                default,
                listeners: Vec::new(),
            }),
            cache: DashMap::new(),
            reducer,
            next_listener_id: AtomicU64::new(0),
        }
    }

    /// Register or overwrite `pattern_text` with `value`.
    ///
    /// If `immutable` is set, the pattern can be overwritten by a later
    /// `add` but never removed by [`remove`](Self::remove).
    pub fn add(
        &self,
        pattern_text: &str,
        value: V,
        immutable: bool,
    ) -> Result<(), PatternError> {
        let pattern = Pattern::compile(pattern_text)?;
        let mut inner = write_lock(&self.inner, "PatternRepository::add");
        self.cache.clear();
        inner.patterns.insert(
            pattern_text.to_string(),
            Entry {
                pattern,
                value,
                immutable,
            },
        );
        notify(&inner.listeners);
        Ok(())
    }

    /// Remove `pattern_text` unless it was registered immutable.
    ///
    /// Removing an immutable pattern, or one that does not exist, is a
    /// silent no-op (logged at debug level, not an error).
    pub fn remove(&self, pattern_text: &str) {
        let mut inner = write_lock(&self.inner, "PatternRepository::remove");
        match inner.patterns.get(pattern_text) {
            Some(entry) if entry.immutable => {
                tracing::debug!(pattern = pattern_text, "ignoring remove of immutable pattern");
                return;
            }
            None => {
                tracing::debug!(pattern = pattern_text, "remove of unknown pattern is a no-op");
                return;
            }
            Some(_) => {}
        }
        self.cache.clear();
        inner.patterns.remove(pattern_text);
        notify(&inner.listeners);
    }

    /// Resolve `key` against the registered patterns, merging by
    /// specificity, falling back to the default when nothing matches.
    pub fn get(&self, key: &str) -> V {
        if let Some(hit) = self.cache.get(key) {
            return hit.clone();
        }

        let inner = read_lock(&self.inner, "PatternRepository::get");
        // Re-check: another reader may have populated the cache while we
        // were waiting for the lock.
        if let Some(hit) = self.cache.get(key) {
            return hit.clone();
        }

        let mut matched: Vec<&Entry<V>> = inner
            .patterns
            .values()
            .filter(|e| e.pattern.matches(key))
            .collect();
        matched.sort_by(|a, b| specificity_cmp(&a.pattern, &b.pattern));

        let value = match matched.split_first() {
            None => inner.default.clone(),
            Some((least_specific, rest)) => match &self.reducer {
                Some(reducer) => {
                    let mut acc = least_specific.value.clone();
                    for entry in rest {
                        reducer.reduce(&mut acc, &entry.value);
                    }
                    acc
                }
                // No reducer: the override winner is the most specific
                // match, i.e. the last element of the least-to-most-specific
                // ordering (not literally "the first" of that ordering —
                // see DESIGN.md for why this reading of the merge policy is
                // the one that matches the worked examples).
                None => rest.last().unwrap_or(least_specific).value.clone(),
            },
        };

        self.cache.insert(key.to_string(), value.clone());
        value
    }

    /// Replace the fallback value used when no pattern matches. Clears the
    /// cache, since any previously cached miss may now resolve differently.
    pub fn set_default(&self, value: V) {
        let mut inner = write_lock(&self.inner, "PatternRepository::set_default");
        self.cache.clear();
        inner.default = value;
        notify(&inner.listeners);
    }

    /// Subscribe to mutation notifications. Returns a token for
    /// [`unregister_listener`](Self::unregister_listener).
    pub fn register_listener(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, AtomicOrdering::Relaxed));
        let mut inner = write_lock(&self.inner, "PatternRepository::register_listener");
        inner.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Remove a previously registered listener. Unknown tokens are ignored.
    pub fn unregister_listener(&self, id: ListenerId) {
        let mut inner = write_lock(&self.inner, "PatternRepository::unregister_listener");
        inner.listeners.retain(|(lid, _)| *lid != id);
    }

    /// Drop every pattern, listener, and cache entry.
    pub fn clear(&self) {
        let mut inner = write_lock(&self.inner, "PatternRepository::clear");
        self.cache.clear();
        inner.patterns.clear();
        inner.listeners.clear();
    }

    /// Number of entries currently cached. Test/observability hook.
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

fn notify(listeners: &[(ListenerId, Arc<dyn Fn() + Send + Sync>)]) {
    for (id, listener) in listeners {
        let listener = Arc::clone(listener);
        if std::panic::catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
            tracing::error!(listener = ?id, "pattern repository listener panicked; continuing");
        }
    }
}

fn read_lock<'a, V>(lock: &'a RwLock<Inner<V>>, context: &str) -> RwLockReadGuard<'a, Inner<V>> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(context, "pattern repository lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn write_lock<'a, V>(lock: &'a RwLock<Inner<V>>, context: &str) -> RwLockWriteGuard<'a, Inner<V>> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(context, "pattern repository lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
