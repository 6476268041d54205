//! Public entry points: [`MarkerCache`] for the single producer process,
//! [`MarkerCacheReader`] for any number of consumer processes.

use crate::error::Result;
use crate::ring::{RingGeometry, RingReader, RingWriter, TimeRange};
use std::path::{Path, PathBuf};

/// Parameters needed to create or open a marker cache. Mirrors
/// `markercache-config`'s `MarkerCacheConfig` but takes already-validated,
/// unit-converted values so this crate has no dependency on `toml`/`serde`.
#[derive(Debug, Clone)]
pub struct CacheParams {
    pub arena_path: PathBuf,
    pub archive_dir: PathBuf,
    pub duration_secs: u64,
    pub lifespan_secs: u64,
    pub false_positive_rate: f64,
    pub total_capacity: u64,
}

/// The producer's handle. Created once per arena; owns the writable
/// mapping and is the only process allowed to insert or age.
///
/// `Send + Sync`: the underlying ring's `insert` only performs atomic bit
/// sets and `maybe_age` is coordinated through the arena's generation
/// counter, so it is sound for a producer to run its ingest loop and its
/// aging timer on separate threads sharing one `MarkerCache`.
pub struct MarkerCache {
    ring: RingWriter,
    arena_path: PathBuf,
    duration_secs: i64,
    /// Time windows that had to be fabricated empty on recovery because no
    /// archive file covered them; populated once at construction.
    rebuild_ranges: Vec<TimeRange>,
}

unsafe impl Send for MarkerCache {}
unsafe impl Sync for MarkerCache {}

impl MarkerCache {
    /// Creates (or recovers) the arena at `params.arena_path`. `now` is the
    /// current wall-clock time in the same epoch as all other timestamps
    /// passed to this cache.
    pub fn create(params: &CacheParams, now: i64) -> Result<Self> {
        let geometry = RingGeometry::compute(
            params.duration_secs,
            params.lifespan_secs,
            params.false_positive_rate,
            params.total_capacity,
        );
        let (ring, rebuild_ranges) = RingWriter::create(
            &params.arena_path,
            &params.archive_dir,
            geometry,
            params.duration_secs as i64,
            now,
        )?;
        if !rebuild_ranges.is_empty() {
            tracing::warn!(
                count = rebuild_ranges.len(),
                "recovered cache has gaps with no archived data; marker source should repopulate them"
            );
        }
        Ok(Self {
            ring,
            arena_path: params.arena_path.clone(),
            duration_secs: params.duration_secs as i64,
            rebuild_ranges,
        })
    }

    /// Marks `marker` as having occurred in the currently open time window.
    pub fn insert(&self, marker: &[u8]) {
        self.ring.insert(marker);
    }

    /// Ages the ring if the current window has been open at least
    /// `duration_secs`. Returns whether an age happened.
    pub fn maybe_age(&self, now: i64) -> bool {
        self.ring.maybe_age(now, self.duration_secs, false)
    }

    /// Ages the ring unconditionally, regardless of how long the current
    /// window has been open.
    pub fn force_age(&self, now: i64) {
        self.ring.maybe_age(now, self.duration_secs, true);
    }

    /// Flushes every non-current slot to disk.
    pub fn save(&self) -> Result<()> {
        self.ring.save()
    }

    /// Size in bytes of the shared-memory arena backing this cache.
    pub fn arena_bytes(&self) -> usize {
        self.ring.arena_bytes()
    }

    /// Time ranges with no recovered data, reported once at construction.
    pub fn rebuild_ranges(&self) -> &[TimeRange] {
        &self.rebuild_ranges
    }
}

impl Drop for MarkerCache {
    /// Removes the arena file so a later `create` never finds a stale one
    /// left behind by a clean shutdown.
    fn drop(&mut self) {
        if let Err(e) = markercache_mmap::remove_stale(&self.arena_path) {
            tracing::warn!(error = %e, path = %self.arena_path.display(), "failed to remove arena on shutdown");
        }
    }
}

/// A consumer's handle: opens an existing arena read-only and performs
/// lookups only. Any number of readers may open the same arena
/// concurrently with the producer and with each other.
pub struct MarkerCacheReader {
    ring: RingReader,
}

impl MarkerCacheReader {
    pub fn open(arena_path: &Path) -> Result<Self> {
        Ok(Self { ring: RingReader::open(arena_path)? })
    }

    /// Returns whether `marker` may have occurred within `[start, end]`.
    /// A `false` answer is authoritative; a `true` answer may be a false
    /// positive and should be followed up against the marker database.
    pub fn lookup(&self, start: i64, end: i64, marker: &[u8]) -> bool {
        self.ring.lookup(start, end, marker)
    }

    /// Convenience lookup against the whole retained window.
    pub fn lookup_any(&self, marker: &[u8]) -> bool {
        self.ring.lookup_any(marker)
    }

    pub fn arena_bytes(&self) -> usize {
        self.ring.arena_bytes()
    }
}
