//! Temp-file staging for downloads.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempPath;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use super::{BodySink, HandleStats};
use crate::request::RequestError;

const TEMP_PREFIX: &str = ".osf-download-";
const TEMP_SUFFIX: &str = ".part";

/// Lifecycle of a staged download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagerState {
    Idle,
    Staging,
    Writing,
    Finalizing,
    Done,
    Failed,
}

/// Writes a response body to a temp file in the destination directory and
/// moves it onto the destination once complete.
///
/// The temp file is deleted on every failure path, including drop.
#[derive(Debug)]
pub struct DownloadStager {
    destination: PathBuf,
    state: StagerState,
    temp_path: Option<TempPath>,
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
    handles: Arc<HandleStats>,
}

impl DownloadStager {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            state: StagerState::Idle,
            temp_path: None,
            writer: None,
            bytes_written: 0,
            handles: Arc::new(HandleStats::default()),
        }
    }

    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    #[must_use]
    pub fn state(&self) -> StagerState {
        self.state
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Shared open/close counters for the temp file handle.
    #[must_use]
    pub fn handles(&self) -> Arc<HandleStats> {
        Arc::clone(&self.handles)
    }

    /// Path of the temp file while one exists.
    #[must_use]
    pub fn temp_path(&self) -> Option<&Path> {
        self.temp_path.as_deref()
    }

    /// Creates the temp file. Calling it again while staged is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Io`] when the temp file cannot be created.
    pub async fn stage(&mut self) -> Result<(), RequestError> {
        match self.state {
            StagerState::Idle => {}
            StagerState::Staging | StagerState::Writing => return Ok(()),
            StagerState::Finalizing | StagerState::Done | StagerState::Failed => {
                return Err(self.not_staged());
            }
        }

        let dir = staging_dir(&self.destination);
        let named = match tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&dir)
        {
            Ok(named) => named,
            Err(source) => {
                self.state = StagerState::Failed;
                return Err(RequestError::io(dir, source));
            }
        };
        let (file, temp_path) = named.into_parts();
        debug!(temp = %temp_path.display(), destination = %self.destination.display(), "download staged");

        self.writer = Some(BufWriter::new(File::from_std(file)));
        self.temp_path = Some(temp_path);
        self.handles.record_open();
        self.state = StagerState::Staging;
        Ok(())
    }

    /// Closes the temp file and moves it onto the destination.
    ///
    /// An existing destination is deleted first; when that fails the staged
    /// data is discarded and the destination is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::DestinationNotReplaceable`] when the existing
    /// destination cannot be removed, [`RequestError::SaveFailed`] when the temp
    /// file can be neither renamed nor copied, and [`RequestError::Io`] when the
    /// final flush fails.
    pub async fn finalize(&mut self) -> Result<PathBuf, RequestError> {
        if !matches!(self.state, StagerState::Staging | StagerState::Writing) {
            return Err(self.not_staged());
        }
        self.state = StagerState::Finalizing;

        if let Err(source) = self.close_handle().await {
            let error = RequestError::io(self.current_temp_path(), source);
            self.discard_temp();
            return Err(error);
        }
        let Some(temp_path) = self.temp_path.take() else {
            self.state = StagerState::Failed;
            return Err(self.not_staged());
        };

        match fs::remove_file(&self.destination).await {
            Ok(()) => debug!(path = %self.destination.display(), "replacing existing file"),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                self.state = StagerState::Failed;
                drop(temp_path);
                return Err(RequestError::destination_not_replaceable(
                    &self.destination,
                    source,
                ));
            }
        }

        if let Err(persist_error) = temp_path.persist(&self.destination) {
            let temp_path = persist_error.path;
            debug!(
                error = %persist_error.error,
                "rename failed, copying staged download instead"
            );
            if let Err(source) = fs::copy(&temp_path, &self.destination).await {
                self.state = StagerState::Failed;
                return Err(RequestError::save_failed(&self.destination, source));
            }
            if let Err(error) = temp_path.close() {
                warn!(error = %error, "could not remove staged download after copy");
            }
        }

        self.state = StagerState::Done;
        Ok(self.destination.clone())
    }

    async fn close_handle(&mut self) -> io::Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        let flushed = writer.flush().await;
        drop(writer);
        self.handles.record_close();
        flushed
    }

    fn discard_temp(&mut self) {
        self.state = StagerState::Failed;
        if let Some(temp_path) = self.temp_path.take() {
            let path = temp_path.to_path_buf();
            if let Err(error) = temp_path.close() {
                warn!(temp = %path.display(), error = %error, "could not remove staged download");
            }
        }
    }

    fn current_temp_path(&self) -> PathBuf {
        self.temp_path
            .as_deref()
            .map_or_else(|| self.destination.clone(), Path::to_path_buf)
    }

    fn not_staged(&self) -> RequestError {
        RequestError::io(
            &self.destination,
            io::Error::other(format!("download is {:?}, not staged", self.state)),
        )
    }
}

#[async_trait]
impl BodySink for DownloadStager {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), RequestError> {
        if !matches!(self.state, StagerState::Staging | StagerState::Writing) {
            return Err(self.not_staged());
        }
        let temp = self.current_temp_path();
        let Some(writer) = self.writer.as_mut() else {
            return Err(self.not_staged());
        };
        if let Err(source) = writer.write_all(chunk).await {
            self.abort().await;
            return Err(RequestError::io(temp, source));
        }
        self.bytes_written += chunk.len() as u64;
        self.state = StagerState::Writing;
        Ok(())
    }

    async fn abort(&mut self) {
        if matches!(self.state, StagerState::Done | StagerState::Failed) {
            return;
        }
        if let Err(error) = self.close_handle().await {
            debug!(error = %error, "flush failed while discarding download");
        }
        self.discard_temp();
        debug!(destination = %self.destination.display(), "staged download discarded");
    }
}

impl Drop for DownloadStager {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            self.handles.record_close();
        }
    }
}

pub(crate) fn staging_dir(destination: &Path) -> PathBuf {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
