//! Filterable in-memory record store.
//!
//! Stands in for a service's document collection in saga tests. The mutation
//! surface is deliberately the one saga handlers use: `delete_where` (the
//! idempotent delete-by-filter) and `update_where` (aggregate folds). Both
//! return the number of records affected, which is what gates confirmation
//! events.

use std::sync::{Mutex, MutexGuard};

/// A shared, filterable collection of records.
#[derive(Debug)]
pub struct InMemoryStore<T> {
    rows: Mutex<Vec<T>>,
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InMemoryStore<T> {
    /// An empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.rows.lock().unwrap()
    }

    /// Insert one record.
    pub fn insert(&self, row: T) {
        self.lock().push(row);
    }

    /// Delete every record matching `predicate`; returns how many were
    /// removed. Running it again against the cleaned store removes zero,
    /// so it is idempotent by construction.
    pub fn delete_where(&self, predicate: impl Fn(&T) -> bool) -> u64 {
        let mut removed: u64 = 0;
        self.lock().retain(|row| {
            if predicate(row) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Apply `apply` to every record matching `predicate`; returns how many
    /// were touched.
    pub fn update_where(&self, predicate: impl Fn(&T) -> bool, apply: impl Fn(&mut T)) -> u64 {
        let mut rows = self.lock();
        let mut touched: u64 = 0;
        for row in rows.iter_mut().filter(|row| predicate(row)) {
            apply(row);
            touched += 1;
        }
        touched
    }

    /// Count the records matching `predicate`.
    pub fn count_where(&self, predicate: impl Fn(&T) -> bool) -> u64 {
        let mut matched: u64 = 0;
        for row in self.lock().iter() {
            if predicate(row) {
                matched += 1;
            }
        }
        matched
    }

    /// Total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T: Clone> InMemoryStore<T> {
    /// Snapshot of every record.
    #[must_use]
    pub fn all(&self) -> Vec<T> {
        self.lock().clone()
    }
}
