//! Download staging and upload streaming.
//!
//! Downloads are written to a temporary file next to the destination and
//! moved over it only once the whole body arrived; a failed or cancelled
//! download never touches the destination. Uploads stream a source file (or
//! an already-open reader) as the PUT body.
//!
//! Both directions count opened and closed handles in [`HandleStats`], so
//! callers can verify that every exit path closed what it opened.
//!
//! # Example
//!
//! ```no_run
//! use osf_connection::{ClientConfig, ConnectionManager, RequestOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConnectionManager::builder(ClientConfig::new("/tmp/token.json")).build()?;
//! let options = RequestOptions::new().on_download_progress(|done, total| {
//!     println!("{done} of {total:?} bytes");
//! });
//! let path = manager
//!     .download_file("https://files.osf.io/v1/resources/abc/providers/osfstorage/xyz", "data.csv", options)
//!     .await?;
//! println!("saved to {}", path.display());
//! # Ok(())
//! # }
//! ```

mod download;
mod ops;
mod progress;
mod upload;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::request::RequestError;

pub use download::{DownloadStager, StagerState};
pub(crate) use progress::ProgressSink;
pub use progress::{ProgressCallback, ProgressReporter};
pub use upload::UploadSource;
pub(crate) use upload::AttemptId;

/// Counts of file handles opened and closed by one transfer.
#[derive(Debug, Default)]
pub struct HandleStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl HandleStats {
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Handles opened but not yet closed.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }

    pub(crate) fn record_open(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Destination of a streamed response body.
#[async_trait]
pub trait BodySink: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), RequestError>;

    /// The request failed or was cancelled; release everything staged so far.
    async fn abort(&mut self);
}

pub(crate) type SharedSink = Arc<tokio::sync::Mutex<dyn BodySink>>;

/// Final path component for progress labels.
pub(crate) fn file_label(path: &std::path::Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_handle_stats_balance() {
        let stats = HandleStats::default();
        stats.record_open();
        assert_eq!(stats.open_handles(), 1);
        stats.record_close();
        assert_eq!(stats.opened(), 1);
        assert_eq!(stats.closed(), 1);
        assert_eq!(stats.open_handles(), 0);
    }

    #[test]
    fn test_file_label_uses_file_name() {
        assert_eq!(file_label(Path::new("/tmp/data/results.csv")), "results.csv");
        assert_eq!(file_label(Path::new("/")), "/");
    }
}
