//! Slot ring
//!
//! A fixed sequence of R slots shared by all stages for one run. The
//! pipeline driver owns the ring; workers only borrow it.

use crate::engine::slot::{Slot, SlotState};

/// Ring of `depth` slots, each holding one block
#[derive(Debug)]
pub struct Ring {
    slots: Vec<Slot>,
    block_size: usize,
}

impl Ring {
    /// Allocate `depth` empty slots of `block_size` samples
    ///
    /// # Panics
    /// Panics if `depth` is zero; the pipeline validates this first.
    pub fn new(depth: usize, block_size: usize) -> Self {
        assert!(depth > 0, "ring depth must be at least 1");
        Self {
            slots: (0..depth).map(|i| Slot::new(i, block_size)).collect(),
            block_size,
        }
    }

    /// Number of slots (R)
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Slot that carries block number `block_index`
    pub fn slot_for(&self, block_index: usize) -> &Slot {
        &self.slots[block_index % self.slots.len()]
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Wake every waiter on every slot
    pub fn wake_all(&self) {
        for slot in &self.slots {
            slot.wake_all();
        }
    }

    /// Completed cycles per slot, in ring order
    pub fn cycles(&self) -> Vec<u64> {
        self.slots.iter().map(Slot::cycles).collect()
    }

    /// True when every slot is back in `Empty`
    pub fn is_drained(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| slot.state() == SlotState::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ring_is_drained() {
        let ring = Ring::new(4, 16);
        assert_eq!(ring.depth(), 4);
        assert_eq!(ring.block_size(), 16);
        assert!(ring.is_drained());
        assert_eq!(ring.cycles(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_slot_for_wraps() {
        let ring = Ring::new(3, 1);
        assert_eq!(ring.slot_for(0).index(), 0);
        assert_eq!(ring.slot_for(2).index(), 2);
        assert_eq!(ring.slot_for(3).index(), 0);
        assert_eq!(ring.slot_for(7).index(), 1);
    }

    #[test]
    #[should_panic(expected = "ring depth must be at least 1")]
    fn test_zero_depth_panics() {
        let _ = Ring::new(0, 8);
    }
}
