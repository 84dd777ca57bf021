//! Subscription Registry
//!
//! The registry is an arena of observer slots. Removal vacates a slot and
//! bumps its generation; insertion reuses vacated slots first. Every entry
//! records the store epoch it was attached in.
//!
//! This is what makes a pass snapshot O(1): a pass only needs the current
//! slot count and its own epoch. Slots past the count, and entries attached
//! during the pass (whose epoch equals the pass epoch), are outside the
//! snapshot. Entries removed mid-pass simply stop being found.

use std::sync::Arc;

use super::observer::{ObserverId, Observe};

struct Entry<T> {
    observer: Arc<dyn Observe<T>>,
    attached_at: u64,
}

struct Slot<T> {
    generation: u32,
    entry: Option<Entry<T>>,
}

/// Arena of live observers for one store.
pub(crate) struct Registry<T> {
    store: u64,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Registry<T> {
    pub(crate) fn new(store: u64) -> Self {
        Self {
            store,
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of live observers.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Upper bound on slot indices; the snapshot a pass iterates.
    pub(crate) fn bound(&self) -> usize {
        self.slots.len()
    }

    /// Reserve the id the next insertion will receive.
    pub(crate) fn next_id(&self) -> ObserverId {
        match self.free.last() {
            Some(&slot) => {
                ObserverId::new(self.store, slot, self.slots[slot as usize].generation)
            }
            None => ObserverId::new(self.store, self.slots.len() as u32, 0),
        }
    }

    /// Insert an observer at the slot previously returned by [`Self::next_id`].
    pub(crate) fn insert(&mut self, observer: Arc<dyn Observe<T>>, epoch: u64) -> ObserverId {
        let id = observer.id();
        debug_assert_eq!(id, self.next_id(), "observer id was not reserved");

        let entry = Entry {
            observer,
            attached_at: epoch,
        };
        match self.free.pop() {
            Some(slot) => self.slots[slot as usize].entry = Some(entry),
            None => self.slots.push(Slot {
                generation: 0,
                entry: Some(entry),
            }),
        }
        self.len += 1;
        id
    }

    /// Remove an observer. Returns it if it was live, `None` otherwise.
    pub(crate) fn remove(&mut self, id: ObserverId) -> Option<Arc<dyn Observe<T>>> {
        if id.store() != self.store {
            return None;
        }
        let slot = self.slots.get_mut(id.slot())?;
        if slot.generation != id.generation() {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.slot() as u32);
        self.len -= 1;
        Some(entry.observer)
    }

    pub(crate) fn contains(&self, id: ObserverId) -> bool {
        id.store() == self.store
            && self
                .slots
                .get(id.slot())
                .is_some_and(|slot| slot.generation == id.generation() && slot.entry.is_some())
    }

    /// The observer at `slot` if it belongs to the snapshot of the pass
    /// running at `epoch`.
    pub(crate) fn eligible(&self, slot: usize, epoch: u64) -> Option<Arc<dyn Observe<T>>> {
        self.slots
            .get(slot)?
            .entry
            .as_ref()
            .filter(|entry| entry.attached_at < epoch)
            .map(|entry| Arc::clone(&entry.observer))
    }

    /// Remove every observer, returning them so they can be dropped outside
    /// any lock.
    pub(crate) fn drain(&mut self) -> Vec<Arc<dyn Observe<T>>> {
        let mut drained = Vec::with_capacity(self.len);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(entry) = slot.entry.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                drained.push(entry.observer);
            }
        }
        self.len = 0;
        drained
    }
}
