//! End-to-end integration tests covering the full producer/consumer
//! lifecycle: creation, insertion, aging, cross-process (cross-handle)
//! lookups, persistence, and crash recovery.

use markercache_core::{CacheParams, MarkerCache, MarkerCacheReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_dir(tag: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    std::env::temp_dir().join(format!("markercache_e2e_{tag}_{pid}_{n}"))
}

fn params(dir: &std::path::Path) -> CacheParams {
    CacheParams {
        arena_path: dir.join("arena.bin"),
        archive_dir: dir.join("archive"),
        duration_secs: 60,
        lifespan_secs: 300,
        false_positive_rate: 0.01,
        total_capacity: 10_000,
    }
}

#[test]
fn insert_then_lookup_round_trip() {
    let dir = unique_dir("roundtrip");
    let p = params(&dir);
    let now = 1_000_000i64;

    let cache = MarkerCache::create(&p, now).unwrap();
    cache.insert(b"order-1");

    let reader = MarkerCacheReader::open(&p.arena_path).unwrap();
    assert!(reader.lookup(now - 10, now + 10, b"order-1"));
    assert!(!reader.lookup(now - 10, now + 10, b"order-does-not-exist"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn lookup_outside_time_range_excludes_hit() {
    let dir = unique_dir("range");
    let p = params(&dir);
    let now = 1_000_000i64;

    let cache = MarkerCache::create(&p, now).unwrap();
    cache.insert(b"order-2");

    let reader = MarkerCacheReader::open(&p.arena_path).unwrap();
    assert!(!reader.lookup(now - 1_000, now - 500, b"order-2"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn aging_evicts_oldest_window_and_persists_it() {
    let dir = unique_dir("aging");
    let p = params(&dir);
    let now = 1_000_000i64;

    let cache = MarkerCache::create(&p, now).unwrap();
    cache.insert(b"old-marker");

    // Force enough ages to cycle the old data out of the whole ring.
    let mut t = now;
    for _ in 0..8 {
        t += p.duration_secs as i64;
        cache.force_age(t);
    }

    let reader = MarkerCacheReader::open(&p.arena_path).unwrap();
    assert!(!reader.lookup(now - 10, now + 10, b"old-marker"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn many_age_cycles_do_not_grow_the_arena() {
    let dir = unique_dir("stable_size");
    let p = params(&dir);
    let now = 1_000_000i64;

    let cache = MarkerCache::create(&p, now).unwrap();
    let initial = cache.arena_bytes();

    let mut t = now;
    for _ in 0..50 {
        t += p.duration_secs as i64;
        cache.insert(b"marker");
        cache.force_age(t);
    }

    assert_eq!(cache.arena_bytes(), initial);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn recovery_after_restart_keeps_recent_data() {
    let dir = unique_dir("recover");
    let p = params(&dir);
    let now = 1_000_000i64;

    {
        let cache = MarkerCache::create(&p, now).unwrap();
        cache.insert(b"still-here");
        // Closing the window the marker lives in is what persists it;
        // the still-open current window is never written to disk.
        cache.force_age(now + p.duration_secs as i64);
        // MarkerCache's Drop removes the arena (clean shutdown semantics)
        // but leaves the archive directory behind, mirroring a producer
        // restart a few seconds later.
    }

    let restart_now = now + p.duration_secs as i64 + 5;
    let cache = MarkerCache::create(&p, restart_now).unwrap();
    let reader = MarkerCacheReader::open(&p.arena_path).unwrap();
    assert!(reader.lookup(now - 10, now + 10, b"still-here"));
    drop(cache);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn recovery_reports_gaps_left_by_downtime() {
    let dir = unique_dir("gap");
    let p = params(&dir);
    let now = 1_000_000i64;

    {
        let cache = MarkerCache::create(&p, now).unwrap();
        cache.save().unwrap();
        // The still-open current slot is intentionally not persisted, so
        // restarting even a little later leaves a gap right before `now`.
    }

    let restart_now = now + 10;
    let cache = MarkerCache::create(&p, restart_now).unwrap();
    assert!(!cache.rebuild_ranges().is_empty());
    drop(cache);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn concurrent_insert_and_age_never_panics_and_stays_consistent() {
    let dir = unique_dir("concurrency");
    let p = params(&dir);
    let now = 1_000_000i64;

    let cache = Arc::new(MarkerCache::create(&p, now).unwrap());

    let inserter = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for i in 0..2_000u64 {
                cache.insert(&i.to_le_bytes());
            }
        })
    };

    let ager = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            let mut t = now;
            for _ in 0..20 {
                t += p.duration_secs as i64;
                cache.force_age(t);
                thread::sleep(Duration::from_micros(50));
            }
        })
    };

    inserter.join().unwrap();
    ager.join().unwrap();

    // No assertion on hit/miss here: the point is that neither thread
    // panics and the reader can still complete a full scan afterward.
    let reader = MarkerCacheReader::open(&p.arena_path).unwrap();
    let _ = reader.lookup_any(&42u64.to_le_bytes());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn lookup_with_start_after_end_is_always_false() {
    let dir = unique_dir("inverted_range");
    let p = params(&dir);
    let now = 1_000_000i64;

    let cache = MarkerCache::create(&p, now).unwrap();
    cache.insert(b"whatever");

    let reader = MarkerCacheReader::open(&p.arena_path).unwrap();
    assert!(!reader.lookup(now + 10, now - 10, b"whatever"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn lookup_with_max_max_checks_only_the_current_slot() {
    let dir = unique_dir("current_only");
    let p = params(&dir);
    let now = 1_000_000i64;

    let cache = MarkerCache::create(&p, now).unwrap();
    cache.insert(b"in-current-window");

    // Close the window so "aged-out" becomes a prior, non-current slot.
    cache.force_age(now + p.duration_secs as i64);
    cache.insert(b"in-new-current-window");

    let reader = MarkerCacheReader::open(&p.arena_path).unwrap();
    assert!(reader.lookup(i64::MAX, i64::MAX, b"in-new-current-window"));
    assert!(!reader.lookup(i64::MAX, i64::MAX, b"in-current-window"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn fresh_arena_with_no_archives_answers_every_lookup_with_false() {
    let dir = unique_dir("empty_startup");
    let p = params(&dir);
    let now = 1_000_000i64;

    let cache = MarkerCache::create(&p, now).unwrap();
    let reader = MarkerCacheReader::open(&p.arena_path).unwrap();
    assert!(!reader.lookup_any(b"never-inserted"));
    assert!(cache.rebuild_ranges().is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn reader_and_writer_share_one_arena_across_handles() {
    let dir = unique_dir("shared");
    let p = params(&dir);
    let now = 1_000_000i64;

    let cache = MarkerCache::create(&p, now).unwrap();
    let reader_a = MarkerCacheReader::open(&p.arena_path).unwrap();
    let reader_b = MarkerCacheReader::open(&p.arena_path).unwrap();

    cache.insert(b"shared-marker");

    assert!(reader_a.lookup_any(b"shared-marker"));
    assert!(reader_b.lookup_any(b"shared-marker"));

    let _ = std::fs::remove_dir_all(&dir);
}
