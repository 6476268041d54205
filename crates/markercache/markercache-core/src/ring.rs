//! The ring of Bloom filter slots.
//!
//! Slots live at fixed physical positions inside the arena; aging rotates a
//! logical `head` index rather than moving bits around, so eviction is O(1)
//! regardless of how wide each filter is.
//!
//! Coordination generalizes the single-slot seqlock protocol (see
//! [`crate::seqlock`]) to the whole ring: one `generation` counter in the
//! arena header, incremented to odd before aging touches any slot header or
//! bit region and back to even once the rotation is complete. A lookup that
//! observes an odd generation, or sees the generation change across its
//! scan, retries. `insert` never waits on this counter; it only sets bits,
//! which are independently atomic, so it is safe to race with an in-flight
//! age.

use crate::filter::FilterView;
use crate::hash::hash_marker;
use crate::layout::{self, ArenaHeader, SlotHeader};
use crate::persist::{self, FilterRecord};
use markercache_mmap::{Arena, ArenaMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};

/// A closed time window `[lo, hi]` in whatever integer epoch the caller
/// uses (seconds are the expected unit, but the ring is agnostic).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub lo: i64,
    pub hi: i64,
}

/// Derived sizing for a ring: number of slots, bits per slot, hash count.
#[derive(Debug, Clone, Copy)]
pub struct RingGeometry {
    pub num_slots: usize,
    pub bits_per_slot: u64,
    pub k: u32,
}

impl RingGeometry {
    /// Computes geometry from the cache's operating parameters.
    ///
    /// `num_slots` is the number of `duration`-sized windows needed to cover
    /// `lifespan`, plus one for the current (still-open) window.
    /// `bits_per_slot`/`k` are the standard optimal Bloom filter sizing for
    /// `total_capacity` markers split evenly across the non-current slots,
    /// at the target false-positive rate `fp`.
    pub fn compute(duration_secs: u64, lifespan_secs: u64, fp: f64, total_capacity: u64) -> Self {
        let num_slots = ((lifespan_secs as f64 / duration_secs as f64).ceil() as usize).max(1) + 1;
        let ln2 = std::f64::consts::LN_2;
        let m_total = (-(total_capacity.max(1) as f64) * fp.ln() / (ln2 * ln2)).ceil() as u64;
        let k = (((m_total as f64) / (total_capacity.max(1) as f64)) * ln2).ceil() as u32;
        let k = k.max(1);
        let bits_per_slot = ((m_total as f64) / (num_slots as f64)).ceil() as u64;
        let bits_per_slot = bits_per_slot.max(k as u64);
        Self { num_slots, bits_per_slot, k }
    }

    pub fn arena_size(&self) -> usize {
        layout::arena_size(self.num_slots, self.bits_per_slot)
    }
}

/// One planned slot during arena construction: either loaded from an
/// archive file or fabricated empty.
struct PlannedSlot {
    lo: i64,
    hi: i64,
    bits: Option<Vec<u8>>,
}

/// Plans the ring's initial contents from whatever archive files survived a
/// restart, oldest to newest. The last entry is always the new current
/// (back) slot. Returns the plan plus the list of fabricated "rebuild"
/// windows the caller should report so an external marker source can
/// repopulate them.
fn plan_recovery(
    mut loaded: Vec<FilterRecord>,
    num_slots: usize,
    duration_secs: i64,
    now: i64,
) -> (Vec<PlannedSlot>, Vec<TimeRange>) {
    let reserved_non_current = num_slots - 1;

    if loaded.is_empty() {
        let mut slots = Vec::with_capacity(num_slots);
        for i in (0..reserved_non_current).rev() {
            let hi = now - 1 - (i as i64) * duration_secs;
            let lo = hi - duration_secs + 1;
            slots.push(PlannedSlot { lo, hi, bits: None });
        }
        slots.push(PlannedSlot { lo: now, hi: i64::MAX, bits: None });
        return (slots, Vec::new());
    }

    loaded.sort_by_key(|r| r.lo);
    if loaded.len() > reserved_non_current {
        loaded.drain(0..loaded.len() - reserved_non_current);
    }

    let mut slots: Vec<PlannedSlot> = loaded
        .into_iter()
        .map(|r| PlannedSlot { lo: r.lo, hi: r.hi, bits: Some(r.bits) })
        .collect();

    let mut rebuild_ranges = Vec::new();
    let mut cursor = slots.last().unwrap().hi + 1;
    while slots.len() < reserved_non_current && cursor <= now {
        let hi = (cursor + duration_secs - 1).min(now - 1).max(cursor);
        slots.push(PlannedSlot { lo: cursor, hi, bits: None });
        rebuild_ranges.push(TimeRange { lo: cursor, hi });
        cursor = hi + 1;
    }

    while slots.len() < reserved_non_current {
        let oldest_lo = slots.first().unwrap().lo;
        let hi = oldest_lo - 1;
        let lo = hi - duration_secs + 1;
        slots.insert(0, PlannedSlot { lo, hi, bits: None });
    }

    let back_lo = slots.last().unwrap().hi + 1;
    slots.push(PlannedSlot { lo: back_lo, hi: i64::MAX, bits: None });
    (slots, rebuild_ranges)
}

/// Shared slot-pointer arithmetic used by both the writer and reader sides.
struct SlotLayout {
    base: *const u8,
    num_slots: usize,
    bytes_per_slot: usize,
    bits_per_slot: u64,
    k: u32,
}

impl SlotLayout {
    fn header(&self) -> &ArenaHeader {
        unsafe { &*(self.base as *const ArenaHeader) }
    }

    fn slot_header(&self, idx: usize) -> &SlotHeader {
        let off = layout::slot_headers_offset() + idx * std::mem::size_of::<SlotHeader>();
        unsafe { &*(self.base.add(off) as *const SlotHeader) }
    }

    fn slot_filter(&self, idx: usize) -> FilterView {
        let off = layout::slot_bits_offset(self.num_slots, self.bytes_per_slot, idx);
        let ptr = unsafe { self.base.add(off) as *const AtomicU8 };
        unsafe { FilterView::new(ptr, self.bits_per_slot, self.k) }
    }

    fn back_idx(&self, head: u64) -> usize {
        ((head + self.num_slots as u64 - 1) % self.num_slots as u64) as usize
    }
}

/// The producer's handle: owns the writable mapping, can insert and age.
pub struct RingWriter {
    arena: ArenaMut,
    layout: SlotLayout,
    archive_dir: PathBuf,
}

impl RingWriter {
    /// Creates a brand-new arena at `arena_path`, recovering as much prior
    /// state as possible from `archive_dir`. Returns the writer plus any
    /// time ranges that had to be fabricated empty because no archive
    /// covered them (the caller's marker source should consider replaying
    /// into these).
    pub fn create(
        arena_path: &Path,
        archive_dir: &Path,
        geometry: RingGeometry,
        duration_secs: i64,
        now: i64,
    ) -> crate::error::Result<(Self, Vec<TimeRange>)> {
        std::fs::create_dir_all(archive_dir)?;

        let mut survivors = Vec::new();
        for (lo, path) in persist::list_files(archive_dir)? {
            match persist::read(&path) {
                Ok(rec) if rec.k == geometry.k && rec.m == geometry.bits_per_slot => {
                    let stale = lo + geometry.num_slots as i64 * duration_secs < now;
                    if stale {
                        let _ = persist::delete(archive_dir, lo);
                    } else {
                        survivors.push(rec);
                    }
                }
                _ => {
                    tracing::warn!(lo, "dropping unusable archive file");
                    let _ = persist::delete(archive_dir, lo);
                }
            }
        }

        let (planned, rebuild_ranges) =
            plan_recovery(survivors, geometry.num_slots, duration_secs, now);
        debug_assert_eq!(planned.len(), geometry.num_slots);

        markercache_mmap::remove_stale(arena_path)?;
        // `remove_stale` then `create_exclusive` is a TOCTOU window: another
        // process can recreate the path between the two calls. Surface that
        // distinctly from a generic I/O failure.
        let mut arena = match ArenaMut::create_exclusive(arena_path, geometry.arena_size() as u64) {
            Ok(arena) => arena,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(crate::error::CacheError::ArenaExists { path: arena_path.to_path_buf() });
            }
            Err(e) => return Err(e.into()),
        };

        let base = arena.as_mut_ptr() as *const u8;
        let bytes_per_slot = layout::bytes_per_slot(geometry.bits_per_slot);
        let layout_view = SlotLayout {
            base,
            num_slots: geometry.num_slots,
            bytes_per_slot,
            bits_per_slot: geometry.bits_per_slot,
            k: geometry.k,
        };

        unsafe {
            let header_ptr = arena.as_mut_ptr() as *mut ArenaHeader;
            header_ptr.write(ArenaHeader::new(
                geometry.num_slots as u64,
                geometry.bits_per_slot,
                geometry.k,
            ));
        }

        for (idx, slot) in planned.iter().enumerate() {
            layout_view.slot_header(idx).lo.store(slot.lo, Ordering::Relaxed);
            layout_view.slot_header(idx).hi.store(slot.hi, Ordering::Relaxed);
            if let Some(bits) = &slot.bits {
                layout_view.slot_filter(idx).load_bytes(bits);
            }
        }

        Ok((
            Self { arena, layout: layout_view, archive_dir: archive_dir.to_path_buf() },
            rebuild_ranges,
        ))
    }

    fn header(&self) -> &ArenaHeader {
        self.layout.header()
    }

    pub fn arena_bytes(&self) -> usize {
        self.arena.len()
    }

    /// Inserts a marker into the current (back) slot. Re-resolves the back
    /// slot on every one of the `k` bit sets rather than once up front: a
    /// concurrent `age()` may rotate the ring mid-insert, and each bit
    /// write is independently atomic, so resolving late keeps every set
    /// landing on whichever slot is current at that instant instead of a
    /// stale one.
    pub fn insert(&self, marker: &[u8]) {
        let (h1, h2) = hash_marker(marker);
        let num_slots = self.layout.num_slots as u64;
        for i in 0..self.layout.k {
            let head = self.header().head.load(Ordering::Acquire);
            let back_idx = ((head + num_slots - 1) % num_slots) as usize;
            let pos = crate::hash::bit_position(h1, h2, i, self.layout.bits_per_slot);
            unsafe { crate::bits::set_bit(self.slot_bits_ptr(back_idx), pos) };
        }
    }

    fn slot_bits_ptr(&self, idx: usize) -> *const AtomicU8 {
        let off = layout::slot_bits_offset(self.layout.num_slots, self.layout.bytes_per_slot, idx);
        unsafe { self.layout.base.add(off) as *const AtomicU8 }
    }

    /// Ages the ring if the current slot has been open at least
    /// `duration_secs`, or unconditionally if `force` is set. Returns
    /// whether an age actually happened.
    pub fn maybe_age(&self, now: i64, duration_secs: i64, force: bool) -> bool {
        let head = self.header().head.load(Ordering::Relaxed);
        let back_idx = self.layout.back_idx(head);
        let back_lo = self.layout.slot_header(back_idx).lo.load(Ordering::Relaxed);
        if !force && now - back_lo < duration_secs {
            return false;
        }
        self.age(now, back_idx, head);
        true
    }

    fn age(&self, now: i64, back_idx: usize, head: u64) {
        self.header().generation.fetch_add(1, Ordering::AcqRel);

        let num_slots = self.layout.num_slots as u64;
        let back_lo = self.layout.slot_header(back_idx).lo.load(Ordering::Relaxed);
        let new_hi = now.max(back_lo);
        self.layout.slot_header(back_idx).hi.store(new_hi, Ordering::Relaxed);

        self.persist_unarchived();

        let front_idx = head as usize;
        let old_front_lo = self.layout.slot_header(front_idx).lo.load(Ordering::Relaxed);
        if let Err(e) = persist::delete(&self.archive_dir, old_front_lo) {
            tracing::warn!(error = %e, lo = old_front_lo, "failed to delete evicted archive file");
        }

        self.layout.slot_filter(front_idx).reset();
        self.layout.slot_header(front_idx).lo.store(new_hi + 1, Ordering::Relaxed);
        self.layout.slot_header(front_idx).hi.store(i64::MAX, Ordering::Relaxed);

        self.header().head.store((head + 1) % num_slots, Ordering::Relaxed);
        self.header().generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Persists every slot lacking an archive file, including the slot
    /// that just closed and the slot about to be evicted. The latter
    /// should already have a file from its own closing cycle; writing it
    /// again here covers a crash that skipped that step, and it is
    /// deleted again immediately after by the caller.
    fn persist_unarchived(&self) {
        for idx in 0..self.layout.num_slots {
            let lo = self.layout.slot_header(idx).lo.load(Ordering::Relaxed);
            let path = self.archive_dir.join(format!("{lo}.filter"));
            if path.exists() {
                continue;
            }
            let hi = self.layout.slot_header(idx).hi.load(Ordering::Relaxed);
            let rec = FilterRecord {
                lo,
                hi,
                k: self.layout.k,
                m: self.layout.bits_per_slot,
                bits: self.layout.slot_filter(idx).to_bytes(),
            };
            if let Err(e) = persist::write_atomic(&self.archive_dir, &rec) {
                tracing::warn!(error = %e, lo, "failed to archive aged-out slot");
            }
        }
    }

    /// Flushes every non-current slot to disk regardless of whether a file
    /// already exists, for explicit checkpointing outside the aging path.
    pub fn save(&self) -> crate::error::Result<()> {
        let head = self.header().head.load(Ordering::Acquire);
        let back_idx = self.layout.back_idx(head);
        for idx in 0..self.layout.num_slots {
            if idx == back_idx {
                continue;
            }
            let lo = self.layout.slot_header(idx).lo.load(Ordering::Relaxed);
            let hi = self.layout.slot_header(idx).hi.load(Ordering::Relaxed);
            let rec = FilterRecord {
                lo,
                hi,
                k: self.layout.k,
                m: self.layout.bits_per_slot,
                bits: self.layout.slot_filter(idx).to_bytes(),
            };
            persist::write_atomic(&self.archive_dir, &rec)?;
        }
        Ok(())
    }
}

/// The consumer's handle: read-only mapping, lookups only.
pub struct RingReader {
    _arena: Arena,
    layout: SlotLayout,
}

impl RingReader {
    pub fn open(arena_path: &Path) -> crate::error::Result<Self> {
        let arena = Arena::open_ro(arena_path)?;
        let base = arena.as_ptr();
        let header = unsafe { &*(base as *const ArenaHeader) };
        header.validate().map_err(crate::error::CacheError::InvalidHeader)?;

        let num_slots = header.num_slots as usize;
        let bits_per_slot = header.bits_per_slot;
        let layout = SlotLayout {
            base,
            num_slots,
            bytes_per_slot: layout::bytes_per_slot(bits_per_slot),
            bits_per_slot,
            k: header.k,
        };
        Ok(Self { _arena: arena, layout })
    }

    fn header(&self) -> &ArenaHeader {
        self.layout.header()
    }

    pub fn arena_bytes(&self) -> usize {
        self._arena.len()
    }

    /// Returns whether `marker` may have occurred within `[start, end]`.
    /// `false` is authoritative; `true` may be a false positive.
    pub fn lookup(&self, start: i64, end: i64, marker: &[u8]) -> bool {
        if start > end {
            return false;
        }
        let (h1, h2) = hash_marker(marker);
        let num_slots = self.layout.num_slots as u64;

        loop {
            let g1 = self.header().generation.load(Ordering::Acquire);
            if g1 & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let head = self.header().head.load(Ordering::Acquire);
            let mut result = false;
            let mut entered = false;
            for i in (0..num_slots).rev() {
                let phys = ((head + i) % num_slots) as usize;
                let lo = self.layout.slot_header(phys).lo.load(Ordering::Acquire);
                let hi = self.layout.slot_header(phys).hi.load(Ordering::Acquire);
                let overlaps = lo <= end && start <= hi;
                if overlaps {
                    entered = true;
                    if self.layout.slot_filter(phys).contains(h1, h2) {
                        result = true;
                        break;
                    }
                } else if entered {
                    break;
                }
            }

            let g2 = self.header().generation.load(Ordering::Acquire);
            if g1 == g2 {
                return result;
            }
            std::hint::spin_loop();
        }
    }

    /// Convenience lookup against the whole ring (current slot included).
    pub fn lookup_any(&self, marker: &[u8]) -> bool {
        self.lookup(i64::MIN, i64::MAX, marker)
    }
}
