//! Core data structures for reference encoding.

mod entry_ref;

pub use entry_ref::{EntryRef, RefCodec};
