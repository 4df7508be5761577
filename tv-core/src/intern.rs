//! A process-wide string interner used during parsing to fold repeated `deviceId`,
//! `signalName`, and short values into shared allocations (spec.md §5, §9).
//!
//! The pool is reset at each parse boundary to bound residency; entries already written to the
//! columnar store hold their own owned copies, so resetting never invalidates stored data.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;

#[derive(Debug)]
struct Pool {
    strings: DashMap<String, Arc<str>>,
}

impl Pool {
    fn new() -> Self {
        Self {
            strings: DashMap::new(),
        }
    }

    fn intern(&self, value: &str) -> Arc<str> {
        if let Some(existing) = self.strings.get(value) {
            return existing.clone();
        }
        let arc: Arc<str> = Arc::from(value);
        self.strings.insert(value.to_string(), arc.clone());
        arc
    }
}

/// A per-parse string interner. Create one at the start of a parse and drop it when the parse
/// finishes; dropping releases every interned allocation that the columnar store didn't copy out.
#[derive(Debug)]
pub struct Interner {
    pool: RwLock<Pool>,
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

impl Interner {
    pub fn new() -> Self {
        Self {
            pool: RwLock::new(Pool::new()),
        }
    }

    pub fn intern(&self, value: &str) -> Arc<str> {
        self.pool.read().unwrap().intern(value)
    }

    /// Bounds residency by discarding every interned string and starting fresh. Called at each
    /// parse boundary (spec.md §9).
    pub fn reset(&self) {
        *self.pool.write().unwrap() = Pool::new();
    }

    pub fn len(&self) -> usize {
        self.pool.read().unwrap().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_value_returns_the_same_allocation() {
        let interner = Interner::new();
        let a = interner.intern("SYS/DEV-1");
        let b = interner.intern("SYS/DEV-1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn reset_drops_previously_interned_strings() {
        let interner = Interner::new();
        interner.intern("SYS/DEV-1");
        assert_eq!(interner.len(), 1);
        interner.reset();
        assert_eq!(interner.len(), 0);
    }
}
