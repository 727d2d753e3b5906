//! Fixed-capacity slot arena.
//!
//! # Responsibilities
//! - Hand out the lowest free slot index for a new connection
//! - Refuse allocation once every slot is taken
//! - Keep a closing slot out of circulation until it is released

use std::collections::BTreeSet;
use std::fmt;

/// Index of a connection slot in `[0, capacity)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

impl SlotId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

/// Returned when every slot is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaFull {
    pub capacity: usize,
}

#[derive(Debug)]
enum Entry<T> {
    Vacant,
    Live(T),
    /// Transport is gone but the slot has not been released yet.
    Closing,
}

/// Slot storage with a free-index allocator.
#[derive(Debug)]
pub struct SlotArena<T> {
    entries: Vec<Entry<T>>,
    free: BTreeSet<usize>,
}

impl<T> SlotArena<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: (0..capacity).map(|_| Entry::Vacant).collect(),
            free: (0..capacity).collect(),
        }
    }

    /// Place a handle in the lowest free slot.
    pub fn allocate(&mut self, handle: T) -> Result<SlotId, ArenaFull> {
        let index = self.free.pop_first().ok_or(ArenaFull {
            capacity: self.capacity(),
        })?;
        self.entries[index] = Entry::Live(handle);
        Ok(SlotId(index))
    }

    /// Handle of a live slot. Closing and vacant slots yield `None`.
    pub fn get(&self, slot: SlotId) -> Option<&T> {
        match self.entries.get(slot.0) {
            Some(Entry::Live(handle)) => Some(handle),
            _ => None,
        }
    }

    /// Take the handle out of a live slot without freeing the index.
    pub fn mark_closing(&mut self, slot: SlotId) -> Option<T> {
        let entry = self.entries.get_mut(slot.0)?;
        match std::mem::replace(entry, Entry::Closing) {
            Entry::Live(handle) => Some(handle),
            previous => {
                *entry = previous;
                None
            }
        }
    }

    /// Return a slot to the free set. Returns false if it was already vacant.
    pub fn release(&mut self, slot: SlotId) -> bool {
        match self.entries.get_mut(slot.0) {
            Some(entry) if !matches!(entry, Entry::Vacant) => {
                *entry = Entry::Vacant;
                self.free.insert(slot.0);
                true
            }
            _ => false,
        }
    }

    /// Number of slots that are live or closing.
    pub fn occupied(&self) -> usize {
        self.capacity() - self.free.len()
    }

    /// Number of slots holding a live handle.
    pub fn live(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Live(_)))
            .count()
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_lowest_free_index() {
        let mut arena = SlotArena::new(3);
        assert_eq!(arena.allocate("a").unwrap(), SlotId::new(0));
        assert_eq!(arena.allocate("b").unwrap(), SlotId::new(1));

        arena.mark_closing(SlotId::new(0));
        arena.release(SlotId::new(0));

        assert_eq!(arena.allocate("c").unwrap(), SlotId::new(0));
        assert_eq!(arena.allocate("d").unwrap(), SlotId::new(2));
    }

    #[test]
    fn full_arena_is_untouched_by_rejection() {
        let mut arena = SlotArena::new(2);
        arena.allocate(1).unwrap();
        arena.allocate(2).unwrap();

        assert_eq!(arena.allocate(3), Err(ArenaFull { capacity: 2 }));
        assert_eq!(arena.get(SlotId::new(0)), Some(&1));
        assert_eq!(arena.get(SlotId::new(1)), Some(&2));
        assert!(arena.is_full());
    }

    #[test]
    fn closing_slot_is_not_reusable_until_released() {
        let mut arena = SlotArena::new(1);
        let slot = arena.allocate("conn").unwrap();

        assert_eq!(arena.mark_closing(slot), Some("conn"));
        assert!(arena.get(slot).is_none());
        assert!(arena.allocate("next").is_err());
        assert_eq!(arena.occupied(), 1);
        assert_eq!(arena.live(), 0);

        assert!(arena.release(slot));
        assert!(!arena.release(slot));
        assert_eq!(arena.allocate("next").unwrap(), slot);
    }

    #[test]
    fn out_of_range_slot_is_ignored() {
        let mut arena: SlotArena<u8> = SlotArena::new(1);
        assert!(arena.get(SlotId::new(7)).is_none());
        assert!(arena.mark_closing(SlotId::new(7)).is_none());
        assert!(!arena.release(SlotId::new(7)));
    }
}
