// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

/// Name-keyed lookup of shared immutable resources.
pub trait ResourceTable<T>: Send + Sync {
    /// Live resource registered under `name`.
    fn find(&self, name: &str) -> Option<Arc<T>>;

    fn insert(&mut self, name: &str, resource: &Arc<T>);

    /// Forgets `name`. Returns true if an entry was present.
    fn evict(&mut self, name: &str) -> bool;

    /// Drops entries whose resource is gone. Returns how many were removed.
    fn purge(&mut self) -> usize {
        0
    }
}

/// Table that does not keep its resources alive.
///
/// A resource is dropped with its last `Arc`; the next `find` then misses and the
/// caller rebuilds it.
#[derive(Debug)]
pub struct WeakTable<T> {
    entries: HashMap<String, Weak<T>>,
}

impl<T> Default for WeakTable<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> WeakTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, dead ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Send + Sync> ResourceTable<T> for WeakTable<T> {
    fn find(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).and_then(Weak::upgrade)
    }

    fn insert(&mut self, name: &str, resource: &Arc<T>) {
        self.entries.insert(name.to_string(), Arc::downgrade(resource));
    }

    fn evict(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    fn purge(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, weak| weak.strong_count() > 0);
        let purged = before - self.entries.len();
        if purged > 0 {
            log::trace!("Purged {} dead resource entries", purged);
        }
        purged
    }
}
