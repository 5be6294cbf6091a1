//! Generation-gated reclamation queues.
//!
//! Deletion and reclamation are decoupled: removing data only enqueues a
//! reclamation obligation, and the memory is touched once the host's
//! used-generation floor has moved past the generation the obligation was
//! stamped with. Until then any reader that observed the data before its
//! removal can keep dereferencing it.

use std::collections::VecDeque;

/// Monotone generation counter value.
///
/// 64 bits wide so it cannot wrap within a process lifetime.
pub type Generation = u64;

/// A FIFO of reclamation obligations gated on generations.
///
/// Obligations are held in two phases, mirroring the writer's protocol:
/// newly enqueued entries are unstamped and belong to the writer's current
/// generation; `transfer` stamps them when the host advances the
/// generation; `trim` releases stamped entries whose generation has fallen
/// at or below the used-generation floor, strictly oldest first.
#[derive(Debug)]
pub struct GenerationTracker<V> {
    pending: Vec<V>,
    held: VecDeque<(Generation, V)>,
}

impl<V> GenerationTracker<V> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            held: VecDeque::new(),
        }
    }

    /// Enqueues an obligation under the current (not yet stamped)
    /// generation.
    pub fn hold(&mut self, value: V) {
        self.pending.push(value);
    }

    /// Stamps all unstamped obligations with `generation`.
    ///
    /// Generations must be handed in non-decreasing order; the queue stays
    /// sorted by construction.
    pub fn transfer(&mut self, generation: Generation) {
        debug_assert!(self.held.back().map_or(true, |(g, _)| *g <= generation));
        for value in self.pending.drain(..) {
            self.held.push_back((generation, value));
        }
    }

    /// Releases every stamped obligation with generation at or below
    /// `used_generation`, oldest first, handing each to `release`.
    pub fn trim(&mut self, used_generation: Generation, mut release: impl FnMut(V)) {
        while let Some((generation, _)) = self.held.front() {
            if *generation > used_generation {
                break;
            }
            let (_, value) = self.held.pop_front().expect("peeked entry present");
            release(value);
        }
    }

    /// Releases every obligation regardless of generation. For shutdown.
    pub fn clear(&mut self, mut release: impl FnMut(V)) {
        for (_, value) in self.held.drain(..) {
            release(value);
        }
        for value in self.pending.drain(..) {
            release(value);
        }
    }

    /// Returns the number of obligations not yet released.
    pub fn len(&self) -> usize {
        self.pending.len() + self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.held.is_empty()
    }
}

impl<V> Default for GenerationTracker<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_transfer_trim() {
        let mut tracker = GenerationTracker::new();
        tracker.hold(1u32);
        tracker.hold(2);
        tracker.transfer(5);
        tracker.hold(3);
        tracker.transfer(6);

        let mut released = Vec::new();
        tracker.trim(4, |v| released.push(v));
        assert!(released.is_empty());

        tracker.trim(5, |v| released.push(v));
        assert_eq!(released, vec![1, 2]);

        tracker.trim(6, |v| released.push(v));
        assert_eq!(released, vec![1, 2, 3]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_trim_is_oldest_first() {
        let mut tracker = GenerationTracker::new();
        for generation in 1..=10u64 {
            tracker.hold(generation);
            tracker.transfer(generation);
        }

        let mut released = Vec::new();
        tracker.trim(10, |v| released.push(v));
        assert_eq!(released, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_pending_not_trimmed() {
        let mut tracker = GenerationTracker::new();
        tracker.hold("a");
        let mut released = Vec::new();
        tracker.trim(u64::MAX, |v| released.push(v));
        assert!(released.is_empty());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_clear_drains_everything() {
        let mut tracker = GenerationTracker::new();
        tracker.hold(1u32);
        tracker.transfer(1);
        tracker.hold(2);

        let mut released = Vec::new();
        tracker.clear(|v| released.push(v));
        assert_eq!(released, vec![1, 2]);
        assert!(tracker.is_empty());
    }
}
