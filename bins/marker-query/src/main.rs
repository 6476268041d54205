use markercache_config::MarkerCacheConfig;
use markercache_core::MarkerCacheReader;
use std::io::BufRead;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

/// Opens the arena read-only, logging rather than propagating a failure.
/// A missing arena just means the producer hasn't created it yet or is
/// mid-restart; callers degrade to treating every lookup as a miss instead
/// of crashing.
fn try_open(arena_path: &str) -> Option<MarkerCacheReader> {
    match MarkerCacheReader::open(arena_path.as_ref()) {
        Ok(reader) => Some(reader),
        Err(e) => {
            warn!(
                arena = arena_path,
                error = %e,
                "marker-query: arena not available yet, every lookup will report no hit"
            );
            None
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path =
        std::env::var("MARKERCACHE_CONFIG").unwrap_or_else(|_| "/etc/markercache/query.toml".into());
    let config = MarkerCacheConfig::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let lookback_secs: i64 = std::env::var("MARKERCACHE_LOOKBACK_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3600);

    let mut reader = try_open(&config.arena_path);
    if let Some(r) = &reader {
        info!(arena = %config.arena_path, bytes = r.arena_bytes(), "marker-query: arena mapped read-only");
    }

    info!("marker-query: reading marker identifiers from stdin, one per line");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let marker = line?;
        if marker.is_empty() {
            continue;
        }

        // The producer may have come up since the last failed open; retry
        // lazily instead of giving up for the rest of the process lifetime.
        if reader.is_none() {
            reader = try_open(&config.arena_path);
        }

        let now = now_secs();
        let maybe_present = reader
            .as_ref()
            .is_some_and(|r| r.lookup(now - lookback_secs, now, marker.as_bytes()));
        if maybe_present {
            warn!(marker, "possible hit, confirm against the marker database");
        } else {
            info!(marker, "no recent record; database lookup can be skipped");
        }
    }

    Ok(())
}
