//! ArrayStore - size-classed storage of variable-length arrays.
//!
//! Arrays up to a configured size are packed end to end in per-size
//! buffers; anything larger spills to a heap-owned descriptor. Either way
//! the caller gets back one opaque [`EntryRef`] and constant-time reads.

use std::mem;

use crate::data::{EntryRef, RefCodec};

use super::buffer::BufferState;
use super::buffer_type::BufferType;
use super::compaction::CompactionContext;
use super::datastore::{AddressSpaceUsage, DataStore, MemoryUsage, Result, StoreError};
use super::generation::Generation;
use super::metrics::StoreMetrics;

/// Type id of the spilled (large-array) class.
///
/// Small classes follow at `type_id == array_size`, which lets `get`
/// recover the array length straight from the buffer's type id.
pub const LARGE_ARRAY_TYPE_ID: u32 = 0;

/// Configuration for an [`ArrayStore`].
#[derive(Clone, Copy, Debug)]
pub struct ArrayStoreConfig {
    /// Inclusive upper bound on array sizes stored in packed buffers.
    /// Zero sends every non-empty array to the spilled class.
    pub max_small_array_size: usize,
    /// Width of the offset field in a ref; the remaining bits address
    /// buffers.
    pub offset_bits: u32,
    /// Lower bound on buffer capacity, in array slots.
    pub min_clusters: usize,
    /// Upper bound on buffer capacity, in array slots. Clamped to the
    /// codec's offset capacity at construction.
    pub max_clusters: usize,
}

impl ArrayStoreConfig {
    /// Creates a configuration with default geometry.
    pub fn new(max_small_array_size: usize) -> Self {
        let offset_bits = RefCodec::DEFAULT_OFFSET_BITS;
        Self {
            max_small_array_size,
            offset_bits,
            min_clusters: BufferType::MIN_BUFFER_CLUSTERS,
            max_clusters: 1 << offset_bits,
        }
    }

    /// Overrides the offset field width.
    pub fn with_offset_bits(mut self, offset_bits: u32) -> Self {
        self.offset_bits = offset_bits;
        self
    }

    /// Overrides the buffer capacity bounds, in array slots.
    pub fn with_cluster_bounds(mut self, min_clusters: usize, max_clusters: usize) -> Self {
        self.min_clusters = min_clusters;
        self.max_clusters = max_clusters;
        self
    }
}

impl Default for ArrayStoreConfig {
    fn default() -> Self {
        Self::new(8)
    }
}

/// Append-only, generationally-reclaimed store for variable-length arrays
/// of a fixed element type.
///
/// Single writer, many readers: `add`, `remove`, compaction and the hold
/// list maintenance must be serialized by the host; `get` takes `&self`
/// and never blocks. Refs stay dereferenceable until the host's
/// used-generation floor passes the generation their data was removed or
/// compacted under.
pub struct ArrayStore<T> {
    store: DataStore<T>,
    max_small_array_size: usize,
}

impl<T: Clone + Default> ArrayStore<T> {
    /// Creates a store from the given configuration.
    pub fn new(config: ArrayStoreConfig) -> Result<Self> {
        let codec = RefCodec::new(config.offset_bits, 0);
        let mut store = DataStore::new(codec);
        let large = store.add_type(BufferType::spilled(
            config.min_clusters,
            config.max_clusters,
        ));
        debug_assert_eq!(large, LARGE_ARRAY_TYPE_ID);
        for array_size in 1..=config.max_small_array_size {
            let type_id = store.add_type(BufferType::packed(
                array_size,
                config.min_clusters,
                config.max_clusters,
            ));
            debug_assert_eq!(type_id as usize, array_size);
        }
        store.init_active_buffers()?;
        Ok(Self {
            store,
            max_small_array_size: config.max_small_array_size,
        })
    }

    /// Creates a store with the default configuration for the given
    /// small-array bound.
    pub fn with_max_small_array_size(max_small_array_size: usize) -> Result<Self> {
        Self::new(ArrayStoreConfig::new(max_small_array_size))
    }

    /// Returns the inclusive upper bound on packed array sizes.
    #[inline]
    pub fn max_small_array_size(&self) -> usize {
        self.max_small_array_size
    }

    /// Stores a copy of `values` and returns a ref to it.
    ///
    /// The empty array is not stored; it maps to the invalid ref, and
    /// `get` on the invalid ref yields the empty slice again.
    pub fn add(&mut self, values: &[T]) -> Result<EntryRef> {
        if values.is_empty() {
            return Ok(EntryRef::INVALID);
        }
        let r = if values.len() <= self.max_small_array_size {
            self.add_small(values)?
        } else {
            self.add_large(values)?
        };
        self.store.metrics().inc_entries_added();
        Ok(r)
    }

    fn add_small(&mut self, values: &[T]) -> Result<EntryRef> {
        let type_id = values.len() as u32;
        self.store.ensure_buffer_capacity(type_id, values.len())?;
        let buffer_id = self.store.active_buffer_id(type_id);
        let offset = self.store.buffer_mut(buffer_id).push_packed(values);
        self.encode(buffer_id, offset / values.len())
    }

    fn add_large(&mut self, values: &[T]) -> Result<EntryRef> {
        self.store.ensure_buffer_capacity(LARGE_ARRAY_TYPE_ID, 1)?;
        let buffer_id = self.store.active_buffer_id(LARGE_ARRAY_TYPE_ID);
        let record = self.store.buffer_mut(buffer_id).push_spilled(values.to_vec());
        self.encode(buffer_id, record)
    }

    fn encode(&self, buffer_id: u32, slot: usize) -> Result<EntryRef> {
        self.store
            .codec()
            .encode(buffer_id, slot)
            .ok_or_else(|| StoreError::AddressSpaceExhausted(self.store.codec().num_buffers()))
    }

    /// Returns the stored array behind `r`, or the empty slice for the
    /// invalid ref.
    ///
    /// The borrow is valid until a trim could reclaim the buffer; callers
    /// sharing refs across threads must follow the generation protocol.
    pub fn get(&self, r: EntryRef) -> &[T] {
        if !r.valid() {
            return &[];
        }
        let (buffer_id, slot) = self.store.codec().decode(r);
        let buffer = self.store.buffer(buffer_id);
        match buffer.type_id() {
            LARGE_ARRAY_TYPE_ID => buffer.spilled_at(slot),
            type_id => buffer.packed_at(slot * type_id as usize, type_id as usize),
        }
    }

    /// Logically removes the array behind `r`.
    ///
    /// The slot memory is untouched until the hold list is transferred and
    /// trimmed past the current generation. Removing the invalid ref is a
    /// no-op.
    pub fn remove(&mut self, r: EntryRef) {
        if !r.valid() {
            return;
        }
        let (buffer_id, _) = self.store.codec().decode(r);
        let type_id = self.store.buffer(buffer_id).type_id();
        if type_id == LARGE_ARRAY_TYPE_ID {
            let payload_bytes = self.get(r).len() * mem::size_of::<T>();
            self.store.hold_element(r, 1, payload_bytes);
        } else {
            self.store.hold_element(r, type_id as usize, 0);
        }
        self.store.metrics().inc_entries_removed();
    }

    /// Starts compaction of the buffer with the worst live-to-dead ratio.
    ///
    /// Returns `Ok(None)` when no buffer has dead entries. The chosen
    /// buffer stays readable while the returned context rewrites external
    /// refs; dropping the context puts it on hold.
    pub fn compact_worst(&mut self) -> Result<Option<CompactionContext<'_, T>>> {
        match self.store.start_compact_worst_buffer()? {
            Some(buffer_id) => Ok(Some(CompactionContext::new(self, buffer_id))),
            None => Ok(None),
        }
    }

    /// Stamps pending hold entries with `generation`. Call after each
    /// batch of removals or compactions, before advancing the generation.
    pub fn transfer_hold_lists(&mut self, generation: Generation) {
        self.store.transfer_hold_lists(generation);
    }

    /// Reclaims hold entries stamped at or below `used_generation`, the
    /// minimum generation any active reader might still be inside.
    pub fn trim_hold_lists(&mut self, used_generation: Generation) {
        self.store.trim_hold_lists(used_generation);
    }

    /// Reclaims every hold entry regardless of generation. Only safe once
    /// no reader can be inside the store.
    pub fn clear_hold_lists(&mut self) {
        self.store.clear_hold_lists();
    }

    /// Reports pressure on the buffer-id field width.
    pub fn address_space_usage(&self) -> AddressSpaceUsage {
        self.store.address_space_usage()
    }

    /// Reports aggregate memory accounting.
    pub fn memory_usage(&self) -> MemoryUsage {
        self.store.memory_usage()
    }

    /// Returns the metrics container.
    pub fn metrics(&self) -> &StoreMetrics {
        self.store.metrics()
    }

    /// Returns the buffer id a ref points into.
    pub fn buffer_id_of(&self, r: EntryRef) -> u32 {
        self.store.codec().decode(r).0
    }

    /// Returns the type id of the buffer a ref points into.
    pub fn type_id_of(&self, r: EntryRef) -> u32 {
        self.store.buffer(self.buffer_id_of(r)).type_id()
    }

    /// Returns the lifecycle state of the buffer a ref points into.
    pub fn buffer_state(&self, r: EntryRef) -> BufferState {
        self.store.buffer(self.buffer_id_of(r)).state()
    }

    pub(super) fn hold_buffer(&mut self, buffer_id: u32) {
        self.store.hold_buffer(buffer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_store() -> ArrayStore<u32> {
        ArrayStore::new(
            ArrayStoreConfig::new(4).with_cluster_bounds(4, 1024),
        )
        .unwrap()
    }

    #[test]
    fn test_small_roundtrip() {
        let mut s = small_store();
        let r = s.add(&[7, 8, 9]).unwrap();
        assert!(r.valid());
        assert_eq!(s.get(r), &[7, 8, 9]);
        assert_eq!(s.type_id_of(r), 3);
    }

    #[test]
    fn test_large_fallback() {
        let mut s = small_store();
        let values: Vec<u32> = (1..=100).collect();
        let r = s.add(&values).unwrap();
        assert_eq!(s.get(r).len(), 100);
        assert_eq!(s.get(r), values.as_slice());
        assert_eq!(s.type_id_of(r), LARGE_ARRAY_TYPE_ID);
    }

    #[test]
    fn test_empty_array() {
        let mut s = small_store();
        let r = s.add(&[]).unwrap();
        assert!(!r.valid());
        assert_eq!(s.get(r), &[] as &[u32]);
        // Removing the invalid ref is a no-op.
        s.remove(r);
        assert_eq!(s.metrics().snapshot().entries_removed, 0);
    }

    #[test]
    fn test_size_classing() {
        let mut s = small_store();
        for n in 1..=4usize {
            let values: Vec<u32> = (0..n as u32).collect();
            let r = s.add(&values).unwrap();
            assert_eq!(s.type_id_of(r), n as u32);
        }
        let values: Vec<u32> = (0..5).collect();
        let r = s.add(&values).unwrap();
        assert_eq!(s.type_id_of(r), LARGE_ARRAY_TYPE_ID);
    }

    #[test]
    fn test_first_add_is_not_sentinel() {
        let mut s: ArrayStore<u32> =
            ArrayStore::new(ArrayStoreConfig::new(0).with_cluster_bounds(4, 1024)).unwrap();
        // max_small == 0: everything spills, straight into buffer 0.
        let r = s.add(&[1, 2, 3]).unwrap();
        assert!(r.valid());
        assert_eq!(s.buffer_id_of(r), 0);
        assert_eq!(s.get(r), &[1, 2, 3]);
    }

    #[test]
    fn test_refs_stay_readable_across_buffer_switch() {
        let mut s = small_store();
        let mut refs = Vec::new();
        for i in 0..1000u32 {
            refs.push(s.add(&[i, i + 1]).unwrap());
        }
        for (i, r) in refs.iter().enumerate() {
            let i = i as u32;
            assert_eq!(s.get(*r), &[i, i + 1]);
        }
        assert!(s.address_space_usage().used > 3);
    }

    #[test]
    fn test_remove_defers_reclamation() {
        let mut s = small_store();
        let r = s.add(&[1, 2]).unwrap();
        s.remove(r);
        // Still readable until transfer + trim.
        assert_eq!(s.get(r), &[1, 2]);

        s.transfer_hold_lists(1);
        s.trim_hold_lists(1);
        // The slot now carries the empty sentinel.
        assert_eq!(s.get(r), &[0, 0]);
    }

    #[test]
    fn test_large_remove_frees_payload_accounting() {
        let mut s = small_store();
        let values: Vec<u32> = (0..256).collect();
        let payload = 256 * mem::size_of::<u32>();
        let baseline = s.memory_usage().used_bytes;

        let r = s.add(&values).unwrap();
        assert!(s.memory_usage().used_bytes >= baseline + payload);

        s.remove(r);
        s.transfer_hold_lists(1);
        s.trim_hold_lists(1);
        assert!(s.memory_usage().used_bytes < baseline + payload);
        assert!(s.get(r).is_empty());
    }

    #[test]
    fn test_metrics_count_traffic() {
        let mut s = small_store();
        let mut refs = Vec::new();
        for i in 0..10u32 {
            refs.push(s.add(&[i]).unwrap());
        }
        for r in &refs[..4] {
            s.remove(*r);
        }
        let snapshot = s.metrics().snapshot();
        assert_eq!(snapshot.entries_added, 10);
        assert_eq!(snapshot.entries_removed, 4);
    }

    #[test]
    fn test_address_space_exhaustion() {
        let mut s: ArrayStore<u32> = ArrayStore::new(
            ArrayStoreConfig::new(1)
                .with_offset_bits(30)
                .with_cluster_bounds(1, 2),
        )
        .unwrap();
        // 4 addressable buffers shared by the spilled class and size 1.
        let err = loop {
            match s.add(&[1]) {
                Ok(r) => assert!(r.valid()),
                Err(err) => break err,
            }
        };
        assert!(matches!(err, StoreError::AddressSpaceExhausted(4)));
        // The store stays usable for reads.
        assert!(s.address_space_usage().used <= 4);
    }
}
