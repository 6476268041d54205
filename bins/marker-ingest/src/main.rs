use markercache_config::MarkerCacheConfig;
use markercache_core::{CacheParams, MarkerCache};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path =
        std::env::var("MARKERCACHE_CONFIG").unwrap_or_else(|_| "/etc/markercache/ingest.toml".into());
    let config = MarkerCacheConfig::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let params = CacheParams {
        arena_path: PathBuf::from(&config.arena_path),
        archive_dir: PathBuf::from(&config.archive_dir),
        duration_secs: config.duration_secs(),
        lifespan_secs: config.lifespan_secs(),
        false_positive_rate: config.fp,
        total_capacity: config.total_capacity,
    };

    let cache = Arc::new(MarkerCache::create(&params, now_secs())?);

    info!(
        arena = %config.arena_path,
        bytes = cache.arena_bytes(),
        rebuilt_ranges = cache.rebuild_ranges().len(),
        "marker-ingest: arena ready"
    );

    let ager = {
        let cache = Arc::clone(&cache);
        std::thread::spawn(move || loop {
            std::thread::sleep(Duration::from_secs(1));
            if cache.maybe_age(now_secs()) {
                info!("marker-ingest: aged ring");
            }
        })
    };

    info!("marker-ingest: reading marker identifiers from stdin, one per line");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        cache.insert(line.as_bytes());
    }

    drop(ager);
    Ok(())
}
