use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    /// Root of managed storage; ingested PDFs are copied below it.
    pub storage_directory: String,
    /// SQLite file. Defaults to `~/.archive-sync/data/archive.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub copy: CopyConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    pub fn storage_directory(&self) -> PathBuf {
        PathBuf::from(&self.storage_directory)
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(crate::db::default_database_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportConfig {
    /// Maximum number of files processed at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Operator recorded when none is supplied.
    #[serde(default = "default_operator")]
    pub operator: String,
}

fn default_concurrency() -> usize {
    num_cpus::get()
}

fn default_operator() -> String {
    "system".to_string()
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            operator: default_operator(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyConfig {
    #[serde(default = "default_small_threshold_mb")]
    pub small_file_threshold_mb: u64,
    #[serde(default = "default_large_threshold_mb")]
    pub large_file_threshold_mb: u64,
    /// External tool used for the resumable tier.
    #[serde(default = "default_resumable_tool")]
    pub resumable_tool: String,
    #[serde(default = "default_stream_buffer_kb")]
    pub stream_buffer_kb: usize,
}

fn default_small_threshold_mb() -> u64 {
    10
}

fn default_large_threshold_mb() -> u64 {
    50
}

fn default_resumable_tool() -> String {
    "rsync".to_string()
}

fn default_stream_buffer_kb() -> usize {
    256
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            small_file_threshold_mb: default_small_threshold_mb(),
            large_file_threshold_mb: default_large_threshold_mb(),
            resumable_tool: default_resumable_tool(),
            stream_buffer_kb: default_stream_buffer_kb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    /// Engine base URL. Without it the in-memory engine is used.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_index_uid")]
    pub index_uid: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_index_uid() -> String {
    "archives".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_request_timeout_ms() -> u64 {
    5000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            index_uid: default_index_uid(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentConfig {
    /// CSV column holding the archive number.
    #[serde(default = "default_key_column")]
    pub key_column: String,
    /// Seconds a validated but uncommitted batch stays staged.
    #[serde(default = "default_staging_ttl_secs")]
    pub staging_ttl_secs: u64,
}

fn default_key_column() -> String {
    "archive_no".to_string()
}

fn default_staging_ttl_secs() -> u64 {
    3600
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            key_column: default_key_column(),
            staging_ttl_secs: default_staging_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_max_entries() -> u64 {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}
