//! Size-tiered file copy with a naive last-resort fallback.
//!
//! Small files go through a plain `fs::copy`, medium files through a
//! buffered stream, and large files through an external resumable transfer
//! tool. Any failure at the chosen tier is retried once with a
//! read-everything/write-everything copy before the file is given up on.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::process::Command as TokioCommand;

use crate::config::CopyConfig;
use crate::error::StorageError;

const MIB: u64 = 1024 * 1024;

/// Copy tier chosen for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyTier {
    Fast,
    Streaming,
    Resumable,
    Naive,
}

impl std::fmt::Display for CopyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CopyTier::Fast => write!(f, "fast"),
            CopyTier::Streaming => write!(f, "streaming"),
            CopyTier::Resumable => write!(f, "resumable"),
            CopyTier::Naive => write!(f, "naive"),
        }
    }
}

/// One way of copying a file. Returns the number of bytes written.
#[async_trait]
pub trait CopyMethod: Send + Sync {
    async fn copy(&self, from: &Path, to: &Path) -> Result<u64, StorageError>;
}

fn copy_error(from: &Path, to: &Path, source: std::io::Error) -> StorageError {
    StorageError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    }
}

/// `fs::copy`; lets the OS pick the fastest path.
pub struct FastCopy;

#[async_trait]
impl CopyMethod for FastCopy {
    async fn copy(&self, from: &Path, to: &Path) -> Result<u64, StorageError> {
        tokio::fs::copy(from, to)
            .await
            .map_err(|e| copy_error(from, to, e))
    }
}

/// Buffered stream copy with a bounded memory footprint.
pub struct StreamingCopy {
    buffer_size: usize,
}

impl StreamingCopy {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(4096),
        }
    }
}

#[async_trait]
impl CopyMethod for StreamingCopy {
    async fn copy(&self, from: &Path, to: &Path) -> Result<u64, StorageError> {
        let source = tokio::fs::File::open(from)
            .await
            .map_err(|e| copy_error(from, to, e))?;
        let target = tokio::fs::File::create(to)
            .await
            .map_err(|e| copy_error(from, to, e))?;

        let mut reader = BufReader::with_capacity(self.buffer_size, source);
        let mut writer = BufWriter::with_capacity(self.buffer_size, target);
        let bytes = tokio::io::copy_buf(&mut reader, &mut writer)
            .await
            .map_err(|e| copy_error(from, to, e))?;
        writer.flush().await.map_err(|e| copy_error(from, to, e))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| copy_error(from, to, e))?;
        Ok(bytes)
    }
}

/// External resumable transfer (rsync-compatible command line).
pub struct ResumableCopy {
    tool: String,
}

impl ResumableCopy {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }
}

#[async_trait]
impl CopyMethod for ResumableCopy {
    async fn copy(&self, from: &Path, to: &Path) -> Result<u64, StorageError> {
        let output = TokioCommand::new(&self.tool)
            .arg("--partial")
            .arg("--append-verify")
            .arg(from)
            .arg(to)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| StorageError::TransferTool {
                tool: self.tool.clone(),
                from: from.to_path_buf(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(StorageError::TransferTool {
                tool: self.tool.clone(),
                from: from.to_path_buf(),
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let metadata = tokio::fs::metadata(to)
            .await
            .map_err(|e| StorageError::Metadata {
                path: to.to_path_buf(),
                source: e,
            })?;
        Ok(metadata.len())
    }
}

/// Reads the whole file into memory and writes it back out.
pub struct NaiveCopy;

#[async_trait]
impl CopyMethod for NaiveCopy {
    async fn copy(&self, from: &Path, to: &Path) -> Result<u64, StorageError> {
        let bytes = tokio::fs::read(from)
            .await
            .map_err(|e| copy_error(from, to, e))?;
        tokio::fs::write(to, &bytes)
            .await
            .map_err(|e| copy_error(from, to, e))?;
        Ok(bytes.len() as u64)
    }
}

/// Result of a successful copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyOutcome {
    /// Tier picked by size.
    pub selected: CopyTier,
    /// Tier that actually wrote the file.
    pub used: CopyTier,
    pub bytes: u64,
}

impl CopyOutcome {
    pub fn fell_back(&self) -> bool {
        self.selected != self.used
    }
}

/// Picks a copy tier by size and falls back to the naive copy on failure.
pub struct CopyStrategySelector {
    small_threshold: u64,
    large_threshold: u64,
    fast: Box<dyn CopyMethod>,
    streaming: Box<dyn CopyMethod>,
    resumable: Box<dyn CopyMethod>,
    naive: Box<dyn CopyMethod>,
}

impl CopyStrategySelector {
    pub fn from_config(config: &CopyConfig) -> Self {
        Self {
            small_threshold: config.small_file_threshold_mb * MIB,
            large_threshold: config.large_file_threshold_mb * MIB,
            fast: Box::new(FastCopy),
            streaming: Box::new(StreamingCopy::new(config.stream_buffer_kb * 1024)),
            resumable: Box::new(ResumableCopy::new(config.resumable_tool.clone())),
            naive: Box::new(NaiveCopy),
        }
    }

    /// Builds a selector with explicit byte thresholds and methods.
    pub fn with_methods(
        small_threshold: u64,
        large_threshold: u64,
        fast: Box<dyn CopyMethod>,
        streaming: Box<dyn CopyMethod>,
        resumable: Box<dyn CopyMethod>,
        naive: Box<dyn CopyMethod>,
    ) -> Self {
        Self {
            small_threshold,
            large_threshold,
            fast,
            streaming,
            resumable,
            naive,
        }
    }

    /// `< small` fast, `small..=large` streaming, `> large` resumable.
    pub fn select(&self, size: u64) -> CopyTier {
        if size < self.small_threshold {
            CopyTier::Fast
        } else if size <= self.large_threshold {
            CopyTier::Streaming
        } else {
            CopyTier::Resumable
        }
    }

    fn method(&self, tier: CopyTier) -> &dyn CopyMethod {
        match tier {
            CopyTier::Fast => self.fast.as_ref(),
            CopyTier::Streaming => self.streaming.as_ref(),
            CopyTier::Resumable => self.resumable.as_ref(),
            CopyTier::Naive => self.naive.as_ref(),
        }
    }

    /// Copies `from` to `to`. Errors only if both the selected tier and the
    /// naive fallback fail; the returned error is the fallback's.
    pub async fn copy(&self, from: &Path, to: &Path, size: u64) -> Result<CopyOutcome, StorageError> {
        let selected = self.select(size);
        match self.method(selected).copy(from, to).await {
            Ok(bytes) => {
                return Ok(CopyOutcome {
                    selected,
                    used: selected,
                    bytes,
                })
            }
            Err(e) => {
                tracing::warn!(
                    tier = %selected,
                    error = %e,
                    "Copy failed, falling back to naive copy"
                );
            }
        }

        remove_partial(to).await;
        match self.naive.copy(from, to).await {
            Ok(bytes) => Ok(CopyOutcome {
                selected,
                used: CopyTier::Naive,
                bytes,
            }),
            Err(e) => {
                remove_partial(to).await;
                Err(e)
            }
        }
    }
}

/// Deletes whatever a failed copy left at `to`.
async fn remove_partial(to: &Path) {
    if let Err(e) = tokio::fs::remove_file(to).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %to.display(), error = %e, "Could not remove partial copy");
        }
    }
}
