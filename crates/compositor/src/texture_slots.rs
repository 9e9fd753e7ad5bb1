//! Fixed-capacity table mapping logical texture handles to hardware-bindable
//! texture units, evicting the least-recently-bound entry under pressure.

use paint_protocol::TextureHandle;

pub const TEXTURE_SLOT_COUNT: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBind {
    pub slot_index: usize,
    /// True when the handle was (re)bound by this call; the caller must issue
    /// the hardware bind before sampling from the slot.
    pub newly_bound: bool,
}

#[derive(Debug, Clone, Copy)]
struct SlotEntry {
    handle: TextureHandle,
    last_bound_at: u64,
}

#[derive(Debug)]
pub struct TextureSlotManager {
    slots: Box<[Option<SlotEntry>]>,
    bind_sequence: u64,
}

impl TextureSlotManager {
    pub fn new(slot_count: usize) -> Self {
        assert!(slot_count > 0, "texture slot pool must have at least one slot");
        Self {
            slots: vec![None; slot_count].into_boxed_slice(),
            bind_sequence: 0,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn bound_slot(&self, handle: TextureHandle) -> Option<usize> {
        self.slots
            .iter()
            .position(|entry| matches!(entry, Some(occupied) if occupied.handle == handle))
    }

    /// Returns the slot `handle` must be sampled from. A hit keeps the
    /// existing slot and its old stamp (reference behavior: under churn the
    /// eviction order degrades from LRU toward insertion order; covered by
    /// the eviction tests). Otherwise a free slot is occupied, or the slot
    /// with the minimum stamp is evicted and rebound.
    pub fn ensure_bound(&mut self, handle: TextureHandle) -> SlotBind {
        if let Some(slot_index) = self.bound_slot(handle) {
            return SlotBind {
                slot_index,
                newly_bound: false,
            };
        }

        let slot_index = match self.slots.iter().position(Option::is_none) {
            Some(free_index) => free_index,
            None => self.eviction_candidate(),
        };
        self.bind_sequence = self
            .bind_sequence
            .checked_add(1)
            .expect("texture bind sequence overflow");
        self.slots[slot_index] = Some(SlotEntry {
            handle,
            last_bound_at: self.bind_sequence,
        });
        SlotBind {
            slot_index,
            newly_bound: true,
        }
    }

    fn eviction_candidate(&self) -> usize {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot_index, entry)| {
                entry.map(|occupied| (slot_index, occupied.last_bound_at))
            })
            .min_by_key(|&(_, last_bound_at)| last_bound_at)
            .map(|(slot_index, _)| slot_index)
            .expect("full slot table must yield an eviction candidate")
    }
}
