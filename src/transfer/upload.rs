//! Upload sources streamed as request bodies.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tracing::debug;

use super::{HandleStats, ProgressSink, file_label};
use crate::request::RequestError;

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

type Reader = Box<dyn AsyncRead + Send + Unpin>;

/// Number of the attempt that opened a source.
pub(crate) type AttemptId = u64;

struct OpenReader {
    attempt: AttemptId,
    reader: Reader,
}

enum Origin {
    Path(PathBuf),
    /// Taken on first open; a reader cannot be rewound for a replay.
    Reader(std::sync::Mutex<Option<Reader>>),
}

/// The body of a PUT request: a file on disk or an already-open reader.
///
/// A path source is opened read-only right before each attempt and closed
/// when the attempt ends, so a replayed request can read it again. Opening
/// for a new attempt supersedes the previous one: its body stream ends and
/// its close becomes a no-op.
pub struct UploadSource {
    origin: Origin,
    label: String,
    total: Option<u64>,
    open: Arc<Mutex<Option<OpenReader>>>,
    attempts: AtomicU64,
    handles: Arc<HandleStats>,
}

impl UploadSource {
    /// A source backed by a regular file.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidSource`] when `path` does not name a regular file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, RequestError> {
        let path = path.as_ref().to_path_buf();
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Err(RequestError::invalid_source(&path)),
        };
        Ok(Self {
            label: file_label(&path),
            total: Some(metadata.len()),
            origin: Origin::Path(path),
            open: Arc::new(Mutex::new(None)),
            attempts: AtomicU64::new(0),
            handles: Arc::new(HandleStats::default()),
        })
    }

    /// A source backed by an open reader of `total` bytes, if known.
    pub fn from_reader(
        reader: impl AsyncRead + Send + Unpin + 'static,
        label: impl Into<String>,
        total: Option<u64>,
    ) -> Self {
        Self {
            label: label.into(),
            total,
            origin: Origin::Reader(std::sync::Mutex::new(Some(Box::new(reader)))),
            open: Arc::new(Mutex::new(None)),
            attempts: AtomicU64::new(0),
            handles: Arc::new(HandleStats::default()),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Size of the body in bytes, when known up front.
    #[must_use]
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.origin {
            Origin::Path(path) => Some(path),
            Origin::Reader(_) => None,
        }
    }

    /// Shared open/close counters for the source handle.
    #[must_use]
    pub fn handles(&self) -> Arc<HandleStats> {
        Arc::clone(&self.handles)
    }

    pub(crate) async fn open(&self, url: &str) -> Result<AttemptId, RequestError> {
        let reader: Reader = match &self.origin {
            Origin::Path(path) => Box::new(
                File::open(path)
                    .await
                    .map_err(|source| RequestError::io(path, source))?,
            ),
            Origin::Reader(slot) => {
                let taken = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                taken.ok_or_else(|| RequestError::source_consumed(url))?
            }
        };

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let mut open = self.open.lock().await;
        if open.replace(OpenReader { attempt, reader }).is_some() {
            self.handles.record_close();
        }
        self.handles.record_open();
        debug!(source = %self.label, attempt, "upload source opened");
        Ok(attempt)
    }

    /// Closes the source if `attempt` still holds it open. Safe to call more than once.
    pub(crate) async fn close(&self, attempt: AttemptId) {
        let mut open = self.open.lock().await;
        if open.as_ref().is_some_and(|current| current.attempt == attempt) {
            *open = None;
            self.handles.record_close();
            debug!(source = %self.label, attempt, "upload source closed");
        }
    }

    /// Streams the source opened by `attempt` in chunks, reporting progress per chunk.
    ///
    /// The stream ends early if the source is closed or reopened underneath it.
    pub(crate) fn body(&self, attempt: AttemptId, progress: ProgressSink) -> reqwest::Body {
        let stream = futures_util::stream::try_unfold(
            (Arc::clone(&self.open), progress),
            move |(slot, mut progress)| async move {
                let mut guard = slot.lock().await;
                let Some(open) = guard.as_mut().filter(|open| open.attempt == attempt) else {
                    return Ok::<_, io::Error>(None);
                };
                let mut buffer = vec![0_u8; UPLOAD_CHUNK_SIZE];
                let read = open.reader.read(&mut buffer).await?;
                drop(guard);
                if read == 0 {
                    return Ok(None);
                }
                buffer.truncate(read);
                progress.advance(u64::try_from(read).unwrap_or(u64::MAX));
                Ok(Some((buffer, (slot, progress))))
            },
        );
        reqwest::Body::wrap_stream(stream)
    }
}

impl fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSource")
            .field("label", &self.label)
            .field("path", &self.path())
            .field("total", &self.total)
            .field("handles", &self.handles)
            .finish_non_exhaustive()
    }
}
