//! Compaction of underused buffers.
//!
//! Compaction rewrites the external index's refs out of one chosen buffer
//! so the buffer can be reclaimed. The buffer stays readable the whole
//! time: a reader racing the rewrite sees either the old ref (still
//! pointing at intact memory) or the new one.

use std::sync::atomic::{fence, Ordering};

use crate::data::EntryRef;

use super::array_store::ArrayStore;
use super::datastore::Result;

/// One-shot handle that moves live arrays out of one buffer.
///
/// Produced by [`ArrayStore::compact_worst`]. The external index hands
/// every ref it owns to [`compact`](Self::compact); refs pointing into the
/// target buffer are rewritten in place. Dropping the context puts the
/// target buffer on hold, after which the generation protocol reclaims it.
pub struct CompactionContext<'a, T: Clone + Default> {
    store: &'a mut ArrayStore<T>,
    buffer_id: u32,
}

impl<'a, T: Clone + Default> CompactionContext<'a, T> {
    pub(super) fn new(store: &'a mut ArrayStore<T>, buffer_id: u32) -> Self {
        Self { store, buffer_id }
    }

    /// Returns the id of the buffer being compacted.
    pub fn target_buffer_id(&self) -> u32 {
        self.buffer_id
    }

    /// Rewrites every ref in `refs` that points into the target buffer.
    ///
    /// Each matching array is copied into the active buffer of its class
    /// and the new ref is published into the slot behind a release fence,
    /// pairing with the acquire load readers use to fetch refs from
    /// externally shared slots. Invalid refs and refs into other buffers
    /// are left alone.
    pub fn compact(&mut self, refs: &mut [EntryRef]) -> Result<()> {
        for slot in refs.iter_mut() {
            if !slot.valid() || self.store.buffer_id_of(*slot) != self.buffer_id {
                continue;
            }
            let values = self.store.get(*slot).to_vec();
            let new_ref = self.store.add(&values)?;
            fence(Ordering::Release);
            *slot = new_ref;
            self.store.metrics().inc_entries_moved();
        }
        Ok(())
    }
}

impl<T: Clone + Default> Drop for CompactionContext<'_, T> {
    fn drop(&mut self) {
        self.store.hold_buffer(self.buffer_id);
    }
}
