//! Byte-level progress reporting for transfers.

use std::fmt;
use std::sync::Arc;

/// Per-request progress callback: `(bytes_transferred, bytes_total)`.
pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// A progress display (dialog, progress bar) driven by a transfer.
pub trait ProgressReporter: Send + Sync {
    /// A transfer labelled e.g. "Downloading data.csv" starts.
    fn begin(&self, label: &str, total: Option<u64>);

    fn update(&self, transferred: u64, total: Option<u64>);

    /// The transfer ended, successfully or not.
    fn finish(&self);
}

/// Accumulates transferred bytes and fans updates out to a callback and a reporter.
pub(crate) struct ProgressSink {
    callback: Option<ProgressCallback>,
    reporter: Option<Arc<dyn ProgressReporter>>,
    transferred: u64,
    total: Option<u64>,
}

impl ProgressSink {
    pub(crate) fn new(
        callback: Option<ProgressCallback>,
        reporter: Option<Arc<dyn ProgressReporter>>,
        total: Option<u64>,
    ) -> Self {
        Self {
            callback,
            reporter,
            transferred: 0,
            total,
        }
    }

    pub(crate) fn advance(&mut self, bytes: u64) {
        self.transferred = self.transferred.saturating_add(bytes);
        if let Some(callback) = &self.callback {
            callback(self.transferred, self.total);
        }
        if let Some(reporter) = &self.reporter {
            reporter.update(self.transferred, self.total);
        }
    }

    #[cfg(test)]
    pub(crate) fn transferred(&self) -> u64 {
        self.transferred
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink")
            .field("transferred", &self.transferred)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}
