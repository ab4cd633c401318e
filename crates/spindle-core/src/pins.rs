//! Argument reference table.
//!
//! `PinTable` counts pins per `ObjectId` for one endpoint (a client
//! `Connection` or a scheduler instance). Only the 0 -> 1 and 1 -> 0
//! transitions reach the external store.
//!
//! `PinSet` is the per-task side: it owns the pins one `TaskSpec` instance
//! acquired and gives them back on drop. It is move-only, so a set can be
//! released at most once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::errors::PinError;
use crate::domain::ids::ObjectId;
use crate::ports::ObjectStore;

pub struct PinTable {
    store: Arc<dyn ObjectStore>,
    counts: Mutex<HashMap<ObjectId, usize>>,
}

impl PinTable {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            counts: Mutex::new(HashMap::new()),
        }
    }

    fn counts(&self) -> MutexGuard<'_, HashMap<ObjectId, usize>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add one pin on `id`.
    pub fn pin(&self, id: &ObjectId) -> Result<(), PinError> {
        let mut counts = self.counts();
        match counts.get_mut(id) {
            Some(n) => *n += 1,
            None => {
                // first holder in this table: ask the store to protect it
                self.store.pin(id)?;
                counts.insert(*id, 1);
            }
        }
        Ok(())
    }

    /// Drop one pin on `id`. Unpinning an id this table does not hold is a no-op.
    pub fn unpin(&self, id: &ObjectId) {
        let mut counts = self.counts();
        let Some(n) = counts.get_mut(id) else {
            tracing::warn!(object = %id, "unpin of object with no pins");
            return;
        };
        *n -= 1;
        if *n == 0 {
            counts.remove(id);
            self.store.unpin(id);
        }
    }

    pub fn count(&self, id: &ObjectId) -> usize {
        self.counts().get(id).copied().unwrap_or(0)
    }

    /// Sum of all pin counts held by this table.
    pub fn total(&self) -> usize {
        self.counts().values().sum()
    }

    /// Pin every id, or none of them.
    ///
    /// On failure the pins already taken for this call are released before the
    /// error is returned.
    pub fn acquire<I>(self: &Arc<Self>, ids: I) -> Result<PinSet, PinError>
    where
        I: IntoIterator<Item = ObjectId>,
    {
        let mut set = PinSet {
            table: Some(Arc::clone(self)),
            ids: Vec::new(),
        };
        for id in ids {
            // on `?` the partially filled set is dropped and rolls back
            self.pin(&id)?;
            set.ids.push(id);
        }
        Ok(set)
    }
}

impl std::fmt::Debug for PinTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts = self.counts();
        f.debug_struct("PinTable")
            .field("objects", &counts.len())
            .field("total", &counts.values().sum::<usize>())
            .finish()
    }
}

/// Pins held by one task instance.
pub struct PinSet {
    table: Option<Arc<PinTable>>,
    ids: Vec<ObjectId>,
}

impl PinSet {
    /// A set that holds nothing.
    pub fn empty() -> Self {
        Self {
            table: None,
            ids: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }
}

impl Drop for PinSet {
    fn drop(&mut self) {
        if let Some(table) = self.table.take() {
            for id in self.ids.drain(..) {
                table.unpin(&id);
            }
        }
    }
}

impl std::fmt::Debug for PinSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinSet").field("pins", &self.ids.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryObjectStore;

    fn oid(b: u8) -> ObjectId {
        ObjectId::from_bytes([b; 20])
    }

    fn setup(present: &[u8]) -> (Arc<InMemoryObjectStore>, Arc<PinTable>) {
        let store = Arc::new(InMemoryObjectStore::new());
        for &b in present {
            store.insert(oid(b));
        }
        let table = Arc::new(PinTable::new(store.clone()));
        (store, table)
    }

    #[test]
    fn pins_are_additive_and_store_sees_only_transitions() {
        let (store, table) = setup(&[1]);
        table.pin(&oid(1)).unwrap();
        table.pin(&oid(1)).unwrap();
        assert_eq!(table.count(&oid(1)), 2);
        assert_eq!(store.pin_count(&oid(1)), 1);

        table.unpin(&oid(1));
        assert_eq!(store.pin_count(&oid(1)), 1);
        table.unpin(&oid(1));
        assert_eq!(table.count(&oid(1)), 0);
        assert_eq!(store.pin_count(&oid(1)), 0);
    }

    #[test]
    fn repeated_ids_pin_independently() {
        let (_store, table) = setup(&[1, 2]);
        let set = table.acquire([oid(1), oid(2), oid(1)]).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(table.count(&oid(1)), 2);
        assert_eq!(table.total(), 3);
        drop(set);
        assert_eq!(table.total(), 0);
    }

    #[test]
    fn two_sets_on_same_object_do_not_alias() {
        let (store, table) = setup(&[7]);
        let a = table.acquire([oid(7)]).unwrap();
        let b = table.acquire([oid(7)]).unwrap();
        assert_eq!(table.count(&oid(7)), 2);
        drop(a);
        assert_eq!(table.count(&oid(7)), 1);
        assert_eq!(store.pin_count(&oid(7)), 1);
        drop(b);
        assert_eq!(store.pin_count(&oid(7)), 0);
    }

    #[test]
    fn failed_acquire_rolls_back() {
        let (store, table) = setup(&[1, 2]);
        let err = table.acquire([oid(1), oid(2), oid(9), oid(1)]).unwrap_err();
        assert_eq!(err, PinError::MissingObject(oid(9)));
        assert_eq!(table.total(), 0);
        assert_eq!(store.pin_count(&oid(1)), 0);
        assert_eq!(store.pin_count(&oid(2)), 0);
    }

    #[test]
    fn unpin_without_pin_is_ignored() {
        let (store, table) = setup(&[1]);
        table.unpin(&oid(1));
        assert_eq!(table.count(&oid(1)), 0);
        assert_eq!(store.pin_count(&oid(1)), 0);
    }

    #[test]
    fn debug_output_reports_counts() {
        let (_store, table) = setup(&[1, 2]);
        let _set = table.acquire([oid(1), oid(1), oid(2)]).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let t = Arc::clone(&table);
        std::thread::spawn(move || {
            let _ = tx.send(format!("{t:?}"));
        });
        let out = rx
            .recv_timeout(std::time::Duration::from_secs(3))
            .expect("formatting a PinTable must not block");
        assert_eq!(out, "PinTable { objects: 2, total: 3 }");
    }

    #[test]
    fn empty_set_releases_nothing() {
        let set = PinSet::empty();
        assert!(set.is_empty());
        drop(set);
    }
}
