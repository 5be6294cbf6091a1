//! # packstore
//!
//! An append-only, generationally-reclaimed store for variable-length
//! arrays of a fixed element type, built for attribute data under a
//! search engine: millions of small-array lookups per second, tight
//! packing, and space reclamation that never moves data out from under a
//! concurrent reader.
//!
//! ## Architecture
//!
//! Arrays are packed into fixed-capacity buffers, one size class per
//! exact array length up to a configurable bound, plus a spilled class
//! for everything larger. Clients address stored arrays through opaque
//! packed refs. Removal only enqueues reclamation work; memory is touched
//! once the host's generation protocol guarantees no reader can still be
//! holding the data. Underused buffers are evacuated online by a
//! compaction context that rewrites the external index's refs.
//!
//! ## Modules
//!
//! - `data` - Reference encoding (EntryRef, RefCodec)
//! - `store` - Buffers, size classes, generation tracking, the ArrayStore
//!   facade and compaction

pub mod data;
pub mod store;
