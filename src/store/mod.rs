//! The array store engine.
//!
//! This module implements size-classed buffers with generation-gated
//! reclamation: a registry of buffer types, an active append buffer per
//! size class, hold lists pending on the host's generation counter, and a
//! compaction handshake for rewriting external references.

mod array_store;
mod buffer;
mod buffer_type;
mod compaction;
mod datastore;
mod generation;
mod metrics;

pub use array_store::{ArrayStore, ArrayStoreConfig, LARGE_ARRAY_TYPE_ID};
pub use buffer::{Buffer, BufferState};
pub use buffer_type::{BufferKind, BufferType};
pub use compaction::CompactionContext;
pub use datastore::{AddressSpaceUsage, DataStore, MemoryUsage, Result, StoreError};
pub use generation::{Generation, GenerationTracker};
pub use metrics::{MetricsSnapshot, StoreMetrics};
