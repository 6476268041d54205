use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug)]
pub struct MarkerCacheConfig {
    #[serde(default = "defaults::arena_path")]
    pub arena_path: String,
    #[serde(default = "defaults::archive_dir")]
    pub archive_dir: String,
    #[serde(default = "defaults::duration_min")]
    pub duration_min: u64,
    #[serde(default = "defaults::lifespan_min")]
    pub lifespan_min: u64,
    #[serde(default = "defaults::fp")]
    pub fp: f64,
    #[serde(default = "defaults::total_capacity")]
    pub total_capacity: u64,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

mod defaults {
    pub fn arena_path() -> String {
        "/tmp/markercache.arena".into()
    }

    pub fn archive_dir() -> String {
        "/tmp/markercache_archive".into()
    }

    pub fn duration_min() -> u64 {
        1
    }

    pub fn lifespan_min() -> u64 {
        60
    }

    pub fn fp() -> f64 {
        0.01
    }

    pub fn total_capacity() -> u64 {
        1 << 20 // ~1M markers
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

impl MarkerCacheConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: MarkerCacheConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_min * 60
    }

    pub fn lifespan_secs(&self) -> u64 {
        self.lifespan_min * 60
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.duration_min == 0 {
            return Err(ConfigError::Invalid("duration_min must be positive"));
        }
        if self.lifespan_min < self.duration_min {
            return Err(ConfigError::Invalid("lifespan_min must be at least duration_min"));
        }
        if !(0.0 < self.fp && self.fp < 1.0) {
            return Err(ConfigError::Invalid("fp must be in (0, 1)"));
        }
        if self.total_capacity == 0 {
            return Err(ConfigError::Invalid("total_capacity must be positive"));
        }
        Ok(())
    }
}
