//! Binary layout of the shared marker-cache arena.
//!
//! The arena is one contiguous memory-mapped region, laid out as:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  ArenaHeader (64 B, one cache line)                            │
//! ├────────────────────────────────────────────────────────────────┤
//! │  SlotHeader[0]   SlotHeader[1]   ...   SlotHeader[num_slots-1] │
//! ├────────────────────────────────────────────────────────────────┤
//! │  bits[0] (bytes_per_slot B)                                    │
//! │  bits[1]                                                        │
//! │  ...                                                            │
//! │  bits[num_slots-1]                                              │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Slot `i` is a physical position; the ring's logical ordering is a
//! rotation of these positions governed by the header's `head` field. No
//! slot ever moves once the arena is created; aging advances `head`
//! instead of copying bits around.

use std::mem::size_of;
use std::sync::atomic::{AtomicI64, AtomicU64};

/// ASCII "MARKRCCH".
pub const ARENA_MAGIC: u64 = 0x4D41_524B_5243_4348;

pub const ARENA_VERSION: u64 = 1;

/// Fixed header at offset 0. Exactly one cache line so it never false-shares
/// with `SlotHeader[0]`.
#[repr(C)]
pub struct ArenaHeader {
    pub magic: u64,
    pub version: u64,
    pub num_slots: u64,
    pub bits_per_slot: u64,
    pub k: u32,
    _pad0: u32,
    /// Seqlock-style generation counter: odd means aging is in progress,
    /// even means the ring is stable. Readers retry a scan if this changes
    /// mid-read.
    pub generation: AtomicU64,
    /// Physical index of the logical front (oldest) slot. The logical back
    /// (current) slot is `(head + num_slots - 1) % num_slots`.
    pub head: AtomicU64,
    _pad1: [u8; 8],
}

impl ArenaHeader {
    pub fn new(num_slots: u64, bits_per_slot: u64, k: u32) -> Self {
        Self {
            magic: ARENA_MAGIC,
            version: ARENA_VERSION,
            num_slots,
            bits_per_slot,
            k,
            _pad0: 0,
            generation: AtomicU64::new(0),
            head: AtomicU64::new(0),
            _pad1: [0; 8],
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.magic != ARENA_MAGIC {
            return Err("bad arena magic");
        }
        if self.version != ARENA_VERSION {
            return Err("unsupported arena version");
        }
        if self.num_slots == 0 {
            return Err("arena has zero slots");
        }
        if self.k == 0 {
            return Err("arena has zero hash functions");
        }
        Ok(())
    }
}

/// Per-slot time window, stored separately from the bits so readers can
/// cheaply check overlap without touching the (much larger) bit array.
#[repr(C)]
pub struct SlotHeader {
    pub lo: AtomicI64,
    pub hi: AtomicI64,
}

impl SlotHeader {
    pub const fn new(lo: i64, hi: i64) -> Self {
        Self {
            lo: AtomicI64::new(lo),
            hi: AtomicI64::new(hi),
        }
    }
}

#[inline]
pub fn bytes_per_slot(bits_per_slot: u64) -> usize {
    ((bits_per_slot + 7) / 8) as usize
}

#[inline]
pub fn header_size() -> usize {
    size_of::<ArenaHeader>()
}

#[inline]
pub fn slot_headers_offset() -> usize {
    header_size()
}

#[inline]
pub fn slot_headers_size(num_slots: usize) -> usize {
    num_slots * size_of::<SlotHeader>()
}

#[inline]
pub fn bits_region_offset(num_slots: usize) -> usize {
    slot_headers_offset() + slot_headers_size(num_slots)
}

#[inline]
pub fn slot_bits_offset(num_slots: usize, bytes_per_slot: usize, slot_idx: usize) -> usize {
    bits_region_offset(num_slots) + slot_idx * bytes_per_slot
}

/// Total arena size for the given geometry.
#[inline]
pub fn arena_size(num_slots: usize, bits_per_slot: u64) -> usize {
    bits_region_offset(num_slots) + num_slots * bytes_per_slot(bits_per_slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_one_cache_line() {
        assert_eq!(header_size(), 64);
    }

    #[test]
    fn offsets_are_monotonic() {
        let num_slots = 5;
        let bps = bytes_per_slot(8_000);
        let bits_off = bits_region_offset(num_slots);
        assert!(bits_off > slot_headers_offset());
        for i in 0..num_slots {
            let off = slot_bits_offset(num_slots, bps, i);
            assert_eq!(off, bits_off + i * bps);
        }
        assert_eq!(arena_size(num_slots, 8_000), bits_off + num_slots * bps);
    }
}
