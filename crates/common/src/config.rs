use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Runtime configuration for the storage engine.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .page_file(PathBuf::from("./my_db.page"))
///     .cache_capacity(512)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Path to the single page file backing the engine.
    #[builder(default = PathBuf::from("./data.page"))]
    pub page_file: PathBuf,
    /// Resident-page capacity of the buffer cache (`CACHE_SIZE`).
    #[builder(default = crate::CACHE_SIZE)]
    pub cache_capacity: usize,
    /// Floor `HandleFullCache` stops evicting at (`CACHE_MIN`).
    #[builder(default = crate::CACHE_MIN)]
    pub cache_floor: usize,
    /// Byte threshold that triggers WAL truncation (`LogThreshold`).
    #[builder(default = crate::LOG_THRESHOLD)]
    pub wal_threshold_bytes: u64,
    /// `tracing_subscriber::EnvFilter` spec used by `init_logging`.
    #[builder(default = String::from("info"))]
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_file: PathBuf::from("./data.page"),
            cache_capacity: crate::CACHE_SIZE,
            cache_floor: crate::CACHE_MIN,
            wal_threshold_bytes: crate::LOG_THRESHOLD,
            log_filter: String::from("info"),
        }
    }
}
