use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("arena already exists at {path}")]
    ArenaExists { path: PathBuf },

    #[error("arena not found at {path}")]
    ArenaMissing { path: PathBuf },

    #[error("invalid arena header: {0}")]
    InvalidHeader(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;
