//! DataStore - buffer registry and reclamation engine.
//!
//! Owns the buffer table, the per-class active-buffer pointers and the
//! generation-gated hold queues. One writer drives every mutating
//! operation; readers only ever follow refs into buffers that the
//! generation protocol keeps alive for them.

use std::collections::{TryReserveError, VecDeque};

use thiserror::Error;

use crate::data::{EntryRef, RefCodec};

use super::buffer::Buffer;
use super::buffer_type::BufferType;
use super::generation::{Generation, GenerationTracker};
use super::metrics::StoreMetrics;

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No buffer id is available, or a buffer big enough for the request
    /// would overflow the offset field width.
    #[error("address space exhausted: {0} buffer ids, none usable")]
    AddressSpaceExhausted(u32),
    /// The underlying allocator refused the slab allocation.
    #[error("allocation failed: {0}")]
    AllocationFailed(#[from] TryReserveError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Pressure on the buffer-id field width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressSpaceUsage {
    /// Buffers not in the `Free` state.
    pub used: u32,
    /// Total addressable buffer ids.
    pub total: u32,
}

impl AddressSpaceUsage {
    /// Returns the used fraction (0.0 - 1.0).
    pub fn usage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.used as f64 / self.total as f64
        }
    }
}

/// Aggregate memory accounting.
///
/// Mutated by the writer and read by observers without locking; treat the
/// values as estimates when read concurrently.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Bytes backing buffer slabs plus descriptor payloads.
    pub allocated_bytes: usize,
    /// Bytes occupied by appended elements and live payloads.
    pub used_bytes: usize,
    /// Bytes occupied by logically removed elements.
    pub dead_bytes: usize,
    /// Bytes pending on the hold lists.
    pub held_bytes: usize,
}

/// One element-level reclamation obligation.
struct ElemHold {
    r: EntryRef,
    elems: usize,
    extra_bytes: usize,
}

/// The buffer registry and reclamation engine.
///
/// Buffer ids index a grow-only table capped at the codec's buffer-id
/// range; released ids return through a free queue and may be handed out
/// again, which is safe because release only happens after the generation
/// protocol has excluded every reader that could hold a pre-release ref.
pub struct DataStore<T> {
    codec: RefCodec,
    types: Vec<BufferType>,
    /// Current append target per type id; filled by `init_active_buffers`.
    active: Vec<u32>,
    buffers: Vec<Buffer<T>>,
    free_ids: VecDeque<u32>,
    elem_holds: GenerationTracker<ElemHold>,
    buffer_holds: GenerationTracker<u32>,
    generation: Generation,
    metrics: StoreMetrics,
}

impl<T: Clone + Default> DataStore<T> {
    /// Creates an empty store using the given reference codec.
    pub fn new(codec: RefCodec) -> Self {
        Self {
            codec,
            types: Vec::new(),
            active: Vec::new(),
            buffers: Vec::new(),
            free_ids: VecDeque::new(),
            elem_holds: GenerationTracker::new(),
            buffer_holds: GenerationTracker::new(),
            generation: 0,
            metrics: StoreMetrics::new(),
        }
    }

    /// Returns the reference codec.
    #[inline]
    pub fn codec(&self) -> &RefCodec {
        &self.codec
    }

    /// Returns the writer's current generation.
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Returns the metrics container.
    #[inline]
    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Registers a size class. Type ids are assigned in registration order.
    ///
    /// Must be called before `init_active_buffers`.
    pub fn add_type(&mut self, mut buffer_type: BufferType) -> u32 {
        debug_assert!(self.active.is_empty());
        buffer_type.clamp_clusters(self.codec.offset_capacity());
        let type_id = self.types.len() as u32;
        self.types.push(buffer_type);
        type_id
    }

    /// Promotes one buffer per registered type to be its append target.
    pub fn init_active_buffers(&mut self) -> Result<()> {
        debug_assert!(self.active.is_empty());
        for type_id in 0..self.types.len() as u32 {
            let buffer_id = self.activate_buffer(type_id, 0)?;
            self.active.push(buffer_id);
        }
        Ok(())
    }

    /// Returns the append target for a type.
    #[inline]
    pub fn active_buffer_id(&self, type_id: u32) -> u32 {
        self.active[type_id as usize]
    }

    /// Returns a buffer by id.
    #[inline]
    pub fn buffer(&self, buffer_id: u32) -> &Buffer<T> {
        &self.buffers[buffer_id as usize]
    }

    /// Returns a buffer by id, mutably.
    #[inline]
    pub fn buffer_mut(&mut self, buffer_id: u32) -> &mut Buffer<T> {
        &mut self.buffers[buffer_id as usize]
    }

    /// Returns the registered type for a type id.
    #[inline]
    pub fn buffer_type(&self, type_id: u32) -> &BufferType {
        &self.types[type_id as usize]
    }

    /// Makes sure the append target for `type_id` can fit `elems` more
    /// elements, switching to a freshly allocated buffer if it cannot.
    ///
    /// The replaced buffer stays readable; its `used` count is frozen from
    /// here on since only append targets receive appends.
    pub fn ensure_buffer_capacity(&mut self, type_id: u32, elems: usize) -> Result<()> {
        let active_id = self.active[type_id as usize];
        if self.buffers[active_id as usize].remaining() >= elems {
            return Ok(());
        }
        let buffer_id = self.activate_buffer(type_id, elems)?;
        self.active[type_id as usize] = buffer_id;
        Ok(())
    }

    /// Pops a usable buffer id: a released one if any, otherwise a fresh
    /// slot in the grow-only table. Returns whether the id was reused.
    fn pop_buffer_id(&mut self) -> Result<(u32, bool)> {
        if let Some(buffer_id) = self.free_ids.pop_front() {
            return Ok((buffer_id, true));
        }
        let next = self.buffers.len() as u32;
        if next >= self.codec.num_buffers() {
            return Err(StoreError::AddressSpaceExhausted(self.codec.num_buffers()));
        }
        self.buffers.push(Buffer::new());
        Ok((next, false))
    }

    /// Allocates and activates a buffer for `type_id` able to hold at
    /// least `elems` more elements. Does not touch the active pointer.
    fn activate_buffer(&mut self, type_id: u32, elems: usize) -> Result<u32> {
        let (buffer_id, reused) = self.pop_buffer_id()?;
        let buffer_type = &mut self.types[type_id as usize];
        let cluster_elems = buffer_type.cluster_elems();
        // One cluster at the slab start of buffer 0 is reserved so the
        // all-zero ref stays an invalid sentinel.
        let reserved_clusters = usize::from(buffer_id == 0);
        let needed_clusters = elems.div_ceil(cluster_elems) + reserved_clusters;
        let Some(clusters) = buffer_type.clusters_to_alloc(needed_clusters) else {
            self.free_ids.push_front(buffer_id);
            return Err(StoreError::AddressSpaceExhausted(self.codec.num_buffers()));
        };
        let spilled = buffer_type.is_spilled();
        let activated = self.buffers[buffer_id as usize].activate(
            type_id,
            spilled,
            clusters * cluster_elems,
            reserved_clusters * cluster_elems,
        );
        if let Err(err) = activated {
            self.free_ids.push_front(buffer_id);
            return Err(err.into());
        }
        if reused {
            self.metrics.inc_buffers_reused();
        } else {
            self.metrics.inc_buffers_allocated();
        }
        Ok(buffer_id)
    }

    /// Enqueues `elems` elements behind `r` for generation-gated
    /// reclamation. `extra_bytes` attributes descriptor payload to the
    /// hold.
    ///
    /// Holds into a buffer already held whole are dropped; the buffer-level
    /// hold reclaims everything in it.
    pub fn hold_element(&mut self, r: EntryRef, elems: usize, extra_bytes: usize) {
        let (buffer_id, _) = self.codec.decode(r);
        let buffer = &mut self.buffers[buffer_id as usize];
        if buffer.is_held() {
            return;
        }
        debug_assert!(buffer.is_active());
        buffer.on_hold_elems(elems, extra_bytes);
        self.elem_holds.hold(ElemHold {
            r,
            elems,
            extra_bytes,
        });
    }

    /// Puts a whole buffer on hold for generation-gated release.
    ///
    /// The buffer must no longer be an append target.
    pub fn hold_buffer(&mut self, buffer_id: u32) {
        debug_assert_ne!(self.active[self.buffers[buffer_id as usize].type_id() as usize], buffer_id);
        self.buffers[buffer_id as usize].set_hold();
        self.buffer_holds.hold(buffer_id);
        self.metrics.inc_buffers_held();
    }

    /// Stamps every unstamped hold entry with `generation` and advances
    /// the writer's generation past it.
    pub fn transfer_hold_lists(&mut self, generation: Generation) {
        self.elem_holds.transfer(generation);
        self.buffer_holds.transfer(generation);
        self.generation = self.generation.max(generation + 1);
    }

    /// Reclaims every hold entry stamped at or below `used_generation`,
    /// oldest first.
    ///
    /// Element holds write the empty sentinel back into their slots; a
    /// buffer whose last live element goes dead this way is released whole
    /// unless it is still an append target. Buffer holds release
    /// unconditionally.
    pub fn trim_hold_lists(&mut self, used_generation: Generation) {
        let Self {
            codec,
            types,
            active,
            buffers,
            free_ids,
            elem_holds,
            buffer_holds,
            metrics,
            ..
        } = self;
        let mut trimmed = 0u64;
        elem_holds.trim(used_generation, |hold| {
            trimmed += 1;
            Self::clean_elem_hold(codec, types, active, buffers, free_ids, metrics, hold);
        });
        buffer_holds.trim(used_generation, |buffer_id| {
            trimmed += 1;
            Self::release_buffer(buffers, free_ids, metrics, buffer_id);
        });
        self.metrics.add_holds_trimmed(trimmed);
    }

    /// Reclaims every hold entry regardless of generation. For shutdown.
    pub fn clear_hold_lists(&mut self) {
        let Self {
            codec,
            types,
            active,
            buffers,
            free_ids,
            elem_holds,
            buffer_holds,
            metrics,
            ..
        } = self;
        let mut trimmed = 0u64;
        elem_holds.clear(|hold| {
            trimmed += 1;
            Self::clean_elem_hold(codec, types, active, buffers, free_ids, metrics, hold);
        });
        buffer_holds.clear(|buffer_id| {
            trimmed += 1;
            Self::release_buffer(buffers, free_ids, metrics, buffer_id);
        });
        self.metrics.add_holds_trimmed(trimmed);
    }

    fn clean_elem_hold(
        codec: &RefCodec,
        types: &[BufferType],
        active: &[u32],
        buffers: &mut [Buffer<T>],
        free_ids: &mut VecDeque<u32>,
        metrics: &StoreMetrics,
        hold: ElemHold,
    ) {
        let (buffer_id, slot) = codec.decode(hold.r);
        let buffer = &mut buffers[buffer_id as usize];
        let cluster_elems = types[buffer.type_id() as usize].cluster_elems();
        buffer.clean_hold(slot * cluster_elems, hold.elems, hold.extra_bytes);
        if buffer.is_active()
            && buffer.is_fully_dead()
            && active[buffer.type_id() as usize] != buffer_id
        {
            Self::release_buffer(buffers, free_ids, metrics, buffer_id);
        }
    }

    fn release_buffer(
        buffers: &mut [Buffer<T>],
        free_ids: &mut VecDeque<u32>,
        metrics: &StoreMetrics,
        buffer_id: u32,
    ) {
        buffers[buffer_id as usize].release();
        free_ids.push_back(buffer_id);
        metrics.inc_buffers_freed();
    }

    /// Picks the buffer with the worst live-to-dead ratio for compaction.
    ///
    /// Only buffers with at least one dead element qualify. If the winner
    /// is a current append target its class gets a fresh active buffer
    /// first, so the winner's contents are frozen before rewriting starts.
    /// Returns `None` when no buffer qualifies.
    pub fn start_compact_worst_buffer(&mut self) -> Result<Option<u32>> {
        let mut worst: Option<(u32, f64)> = None;
        for (buffer_id, buffer) in self.buffers.iter().enumerate() {
            if !buffer.is_active() || buffer.dead() == 0 {
                continue;
            }
            let score = buffer.deadness();
            if worst.map_or(true, |(_, best)| score > best) {
                worst = Some((buffer_id as u32, score));
            }
        }
        let Some((buffer_id, _)) = worst else {
            return Ok(None);
        };
        let type_id = self.buffers[buffer_id as usize].type_id();
        if self.active[type_id as usize] == buffer_id {
            let fresh = self.activate_buffer(type_id, 0)?;
            self.active[type_id as usize] = fresh;
        }
        Ok(Some(buffer_id))
    }

    /// Reports pressure on the buffer-id field width.
    pub fn address_space_usage(&self) -> AddressSpaceUsage {
        let used = self.buffers.iter().filter(|b| !b.is_free()).count() as u32;
        AddressSpaceUsage {
            used,
            total: self.codec.num_buffers(),
        }
    }

    /// Reports aggregate memory accounting across all buffers.
    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = MemoryUsage::default();
        for buffer in &self.buffers {
            usage.allocated_bytes += buffer.allocated_bytes();
            usage.used_bytes += buffer.used_bytes();
            usage.dead_bytes += buffer.dead_bytes();
            usage.held_bytes += buffer.held_bytes();
        }
        usage
    }
}
