//! Per-entity state store and registry reconciliation
//!
//! A store owns the state records of one entity family. The lock is private:
//! callers go through [`StateStore::reconcile`], [`StateStore::get`],
//! [`StateStore::update`] and [`StateStore::names`], so no caller can hold it
//! across an await point or take the two stores' locks in different orders.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

/// What a reconciliation changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Entities that received a fresh record
    pub added: usize,
    /// Entities whose record was discarded
    pub removed: usize,
}

/// Registry of tracked entities and their state records
#[derive(Debug, Default)]
pub struct StateStore<S> {
    records: RwLock<HashMap<String, S>>,
}

impl<S> StateStore<S>
where
    S: Clone + Send + Sync,
{
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Match the tracked set to `current`.
    ///
    /// New names get `init(name)`, vanished names lose their record. Runs under
    /// the write lock so evaluators never see a half-reconciled registry.
    pub async fn reconcile<I, F>(&self, current: I, mut init: F) -> ReconcileSummary
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        F: FnMut(&str) -> S,
    {
        let current: HashSet<String> = current
            .into_iter()
            .map(|name| name.as_ref().to_string())
            .collect();

        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|name, _| current.contains(name));
        let removed = before - records.len();

        let mut added = 0;
        for name in current {
            if !records.contains_key(&name) {
                let state = init(&name);
                records.insert(name, state);
                added += 1;
            }
        }

        ReconcileSummary { added, removed }
    }

    /// Copy of one entity's record
    pub async fn get(&self, name: &str) -> Option<S> {
        self.records.read().await.get(name).cloned()
    }

    /// Mutate one entity's record in place and commit it.
    ///
    /// Returns `None` without calling `f` when the entity is not tracked.
    pub async fn update<F, R>(&self, name: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut S) -> R,
    {
        let mut records = self.records.write().await;
        records.get_mut(name).map(f)
    }

    /// Names of all tracked entities, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of tracked entities
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether no entity is tracked
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
