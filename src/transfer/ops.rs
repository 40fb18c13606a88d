//! Download and upload operations on the connection manager.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Method;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::download::{DownloadStager, staging_dir};
use super::{BodySink, SharedSink, UploadSource, file_label};
use crate::manager::ConnectionManager;
use crate::notify::Notification;
use crate::request::dispatch::{RequestBody, ResponseTarget, Tracking};
use crate::request::{Reply, RequestError, RequestOptions};

impl ConnectionManager {
    /// Downloads `url` to `destination`, replacing an existing file only
    /// after the whole body was received.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidDestination`] when the destination
    /// directory does not exist, any error of the session check or the GET
    /// request, and the staging errors of [`DownloadStager`].
    pub async fn download_file(
        &self,
        url: &str,
        destination: impl AsRef<Path>,
        options: RequestOptions,
    ) -> Result<PathBuf, RequestError> {
        let stager = Arc::new(Mutex::new(DownloadStager::new(destination.as_ref())));
        self.download_staged(url, stager, options).await
    }

    /// Like [`download_file`](Self::download_file) with a caller-owned stager,
    /// whose handle counters stay observable after the download ends.
    ///
    /// # Errors
    ///
    /// See [`download_file`](Self::download_file).
    #[instrument(skip(self, stager, options), fields(url = %url))]
    pub async fn download_staged(
        &self,
        url: &str,
        stager: Arc<Mutex<DownloadStager>>,
        options: RequestOptions,
    ) -> Result<PathBuf, RequestError> {
        Url::parse(url).map_err(|_| RequestError::invalid_url(url))?;
        let destination = stager.lock().await.destination().to_path_buf();
        if !is_directory(&staging_dir(&destination)).await {
            let error = RequestError::invalid_destination(&destination);
            self.fail_transfer(&error, &options);
            return Err(error);
        }

        // An expired session parks here, before anything is staged.
        self.get_logged_in_user(options.without_progress()).await?;

        if let Err(error) = stager.lock().await.stage().await {
            self.fail_transfer(&error, &options);
            return Err(error);
        }

        let reporter = options.progress_reporter();
        if let Some(reporter) = &reporter {
            reporter.begin(&format!("Downloading {}", file_label(&destination)), None);
        }
        let sink: SharedSink = stager.clone();
        let result = self
            .dispatch(
                Method::GET,
                url,
                RequestBody::Empty,
                ResponseTarget::Sink(sink),
                options.clone(),
                Tracking::Replayable,
            )
            .await;
        if let Some(reporter) = &reporter {
            reporter.finish();
        }
        if let Err(error) = result {
            // A discarded request never reaches the sink's abort; this one is idempotent.
            debug!(error = %error, "discarding staged download");
            stager.lock().await.abort().await;
            return Err(error);
        }

        let finalized = stager.lock().await.finalize().await;
        match finalized {
            Ok(path) => {
                info!(path = %path.display(), "download saved");
                Ok(path)
            }
            Err(error) => {
                self.fail_transfer(&error, &options);
                Err(error)
            }
        }
    }

    /// Uploads `source` with a PUT request.
    ///
    /// # Errors
    ///
    /// Returns any error of the session check or the PUT request.
    #[instrument(skip(self, source, options), fields(url = %url, source = %source.label()))]
    pub async fn upload_file(
        &self,
        url: &str,
        source: UploadSource,
        options: RequestOptions,
    ) -> Result<Reply, RequestError> {
        self.get_logged_in_user(options.without_progress()).await?;

        let reporter = options.progress_reporter();
        if let Some(reporter) = &reporter {
            reporter.begin(&format!("Uploading {}", source.label()), source.total());
        }
        let result = self.put(url, Some(source), options).await;
        if let Some(reporter) = &reporter {
            reporter.finish();
        }
        if let Ok(reply) = &result {
            info!(status = reply.status().as_u16(), "upload finished");
        }
        result
    }

    /// Uploads the file at `path` with a PUT request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidSource`] when `path` is not a regular
    /// file, otherwise see [`upload_file`](Self::upload_file).
    pub async fn upload_path(
        &self,
        url: &str,
        path: impl AsRef<Path>,
        options: RequestOptions,
    ) -> Result<Reply, RequestError> {
        let source = match UploadSource::from_path(path).await {
            Ok(source) => source,
            Err(error) => {
                self.fail_transfer(&error, &options);
                return Err(error);
            }
        };
        self.upload_file(url, source, options).await
    }

    fn fail_transfer(&self, error: &RequestError, options: &RequestOptions) {
        warn!(error = %error, "transfer failed");
        self.notify(Notification::error(
            error.notification_title(),
            error.notification_message(),
        ));
        options.report_error(error);
    }
}

async fn is_directory(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_dir())
}
