//! Per-request options: progress callbacks, error callback and abort handle.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::error::RequestError;
use crate::transfer::{ProgressCallback, ProgressReporter};

/// Called once when a request fails terminally (including cancellation).
pub type ErrorCallback = Arc<dyn Fn(&RequestError) + Send + Sync>;

/// Lets a caller cancel a request while it is in flight or parked for replay.
///
/// Clones share the same cancellation state.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) async fn aborted(&self) {
        self.token.cancelled().await;
    }
}

/// Optional hooks attached to a single request.
#[derive(Clone, Default)]
pub struct RequestOptions {
    download_progress: Option<ProgressCallback>,
    upload_progress: Option<ProgressCallback>,
    on_error: Option<ErrorCallback>,
    abort: Option<AbortHandle>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_download_progress(
        mut self,
        callback: impl Fn(u64, Option<u64>) + Send + Sync + 'static,
    ) -> Self {
        self.download_progress = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_upload_progress(
        mut self,
        callback: impl Fn(u64, Option<u64>) + Send + Sync + 'static,
    ) -> Self {
        self.upload_progress = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_error(mut self, callback: impl Fn(&RequestError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = Some(abort);
        self
    }

    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    #[must_use]
    pub fn abort_handle(&self) -> Option<&AbortHandle> {
        self.abort.as_ref()
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(AbortHandle::is_aborted)
    }

    pub(crate) fn download_progress(&self) -> Option<ProgressCallback> {
        self.download_progress.clone()
    }

    pub(crate) fn upload_progress(&self) -> Option<ProgressCallback> {
        self.upload_progress.clone()
    }

    pub(crate) fn progress_reporter(&self) -> Option<Arc<dyn ProgressReporter>> {
        self.progress_reporter.clone()
    }

    /// Same abort handle and error callback, without progress hooks.
    ///
    /// Used for the session check that precedes a transfer.
    pub(crate) fn without_progress(&self) -> Self {
        Self {
            download_progress: None,
            upload_progress: None,
            on_error: self.on_error.clone(),
            abort: self.abort.clone(),
            progress_reporter: None,
        }
    }

    pub(crate) fn report_error(&self, error: &RequestError) {
        if let Some(callback) = &self.on_error {
            callback(error);
        }
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("download_progress", &self.download_progress.is_some())
            .field("upload_progress", &self.upload_progress.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("abort", &self.abort)
            .field("progress_reporter", &self.progress_reporter.is_some())
            .finish()
    }
}
