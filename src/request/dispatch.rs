//! Verb entry points, token attachment and response classification.
//!
//! A logical request is a [`Call`]: verb, body, sink, options and the
//! one-shot channel its result is delivered through. The first attempt runs
//! inline in the caller's future. Redirects loop back into the same call;
//! a request parked after an authentication failure is re-issued when its
//! continuation is replayed.
//!
//! A 401 only logs the session out when it rejected the token the session
//! still holds. A late 401 for a token that was already replaced leaves the
//! new session alone.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures_util::{FutureExt, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, Response};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};
use url::{Url, form_urlencoded};

use super::error::RequestError;
use super::options::RequestOptions;
use super::outcome::{StatusClass, classify_status};
use super::pending::{Continuation, Replay, RequestId};
use super::redirect::{RedirectState, redirect_target};
use super::reply::Reply;
use crate::auth::{BearerLookup, now_secs};
use crate::manager::{ConnectionManager, Inner};
use crate::notify::Notification;
use crate::transfer::{AttemptId, ProgressSink, SharedSink, UploadSource};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub(crate) enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
    Upload(Arc<UploadSource>),
}

pub(crate) enum ResponseTarget {
    Buffer,
    Sink(SharedSink),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tracking {
    /// Registered for replay while a user is logged in; a 401 starts a re-login.
    Replayable,
    /// Never registered and never starts a re-login.
    Internal,
}

type ReplySender = oneshot::Sender<Result<Reply, RequestError>>;

struct Call {
    method: Method,
    url: String,
    body: RequestBody,
    target: ResponseTarget,
    options: RequestOptions,
    tracking: Tracking,
    sender: Mutex<Option<ReplySender>>,
    registered: Mutex<Option<RequestId>>,
}

impl Call {
    fn take_sender(&self) -> Option<ReplySender> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn is_finished(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn set_registered(&self, id: Option<RequestId>) {
        *self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = id;
    }

    fn registered(&self) -> Option<RequestId> {
        *self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn close_upload(&self, attempt: Option<AttemptId>) {
        if let (RequestBody::Upload(source), Some(attempt)) = (&self.body, attempt) {
            source.close(attempt).await;
        }
    }
}

enum Attempt {
    Completed(Reply),
    Redirect { status: u16, target: Option<Url> },
    /// HTTP 401; carries the bearer token the rejected attempt was sent with.
    AuthRequired { sent_token: Option<String> },
    Failed(RequestError),
    Cancelled,
}

impl ConnectionManager {
    /// Issues a GET request and buffers the response body.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] for every terminal failure; see the variants.
    #[instrument(skip(self, options), fields(url = %url))]
    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<Reply, RequestError> {
        self.dispatch(
            Method::GET,
            url,
            RequestBody::Empty,
            ResponseTarget::Buffer,
            options,
            Tracking::Replayable,
        )
        .await
    }

    /// Issues a POST request with a url-encoded form body.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] for every terminal failure.
    #[instrument(skip(self, form, options), fields(url = %url))]
    pub async fn post<I, K, V>(
        &self,
        url: &str,
        form: I,
        options: RequestOptions,
    ) -> Result<Reply, RequestError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields = form
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self.dispatch(
            Method::POST,
            url,
            RequestBody::Form(fields),
            ResponseTarget::Buffer,
            options,
            Tracking::Replayable,
        )
        .await
    }

    /// Issues a PUT request, streaming `source` as the body when given.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] for every terminal failure.
    #[instrument(skip(self, source, options), fields(url = %url))]
    pub async fn put(
        &self,
        url: &str,
        source: Option<UploadSource>,
        options: RequestOptions,
    ) -> Result<Reply, RequestError> {
        let body = match source {
            Some(source) => RequestBody::Upload(Arc::new(source)),
            None => RequestBody::Empty,
        };
        self.dispatch(
            Method::PUT,
            url,
            body,
            ResponseTarget::Buffer,
            options,
            Tracking::Replayable,
        )
        .await
    }

    /// Issues a DELETE request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] for every terminal failure.
    #[instrument(skip(self, options), fields(url = %url))]
    pub async fn delete(&self, url: &str, options: RequestOptions) -> Result<Reply, RequestError> {
        self.dispatch(
            Method::DELETE,
            url,
            RequestBody::Empty,
            ResponseTarget::Buffer,
            options,
            Tracking::Replayable,
        )
        .await
    }

    /// Checks preconditions, runs the first attempt and waits for the result.
    ///
    /// The result arrives through a one-shot channel, so a request parked for
    /// replay resolves when its replayed attempt finishes. Aborting while parked
    /// cancels the parked entry.
    pub(crate) async fn dispatch(
        &self,
        method: Method,
        url: &str,
        body: RequestBody,
        target: ResponseTarget,
        options: RequestOptions,
        tracking: Tracking,
    ) -> Result<Reply, RequestError> {
        if !self.inner.network.is_online() {
            let error = RequestError::Offline;
            self.notify(Notification::error(
                error.notification_title(),
                error.notification_message(),
            ));
            return Err(error);
        }
        let parsed = Url::parse(url).map_err(|_| RequestError::invalid_url(url))?;

        let (sender, mut receiver) = oneshot::channel();
        let abort = options.abort_handle().cloned();
        let call = Arc::new(Call {
            method,
            url: url.to_string(),
            body,
            target,
            options,
            tracking,
            sender: Mutex::new(Some(sender)),
            registered: Mutex::new(None),
        });
        let parked = Arc::downgrade(&call);
        self.issue(call, parsed, RedirectState::new()).await;

        if let Some(abort) = abort {
            tokio::select! {
                biased;
                result = &mut receiver => {
                    return result.unwrap_or_else(|_| Err(RequestError::discarded(url)));
                }
                () = abort.aborted() => {
                    if let Some(call) = parked.upgrade() {
                        self.cancel_parked(&call).await;
                    }
                }
            }
        }
        receiver
            .await
            .unwrap_or_else(|_| Err(RequestError::discarded(url)))
    }

    fn issue(&self, call: Arc<Call>, url: Url, redirect: RedirectState) -> Replay {
        let manager = self.clone();
        async move { manager.run(call, url, redirect).await }.boxed()
    }

    async fn run(&self, call: Arc<Call>, mut url: Url, mut redirect: RedirectState) {
        loop {
            if call.is_finished() {
                return;
            }
            let registered = self.register(&call, &url, redirect);

            let mut upload_attempt = None;
            let attempt = if call.options.is_aborted() {
                Attempt::Cancelled
            } else if let Some(abort) = call.options.abort_handle() {
                tokio::select! {
                    biased;
                    () = abort.aborted() => Attempt::Cancelled,
                    attempt = self.attempt(&call, &url, &mut upload_attempt) => attempt,
                }
            } else {
                self.attempt(&call, &url, &mut upload_attempt).await
            };
            call.close_upload(upload_attempt).await;

            match attempt {
                Attempt::Completed(reply) => {
                    self.release(registered);
                    self.finish(&call, Ok(reply)).await;
                    return;
                }
                Attempt::AuthRequired { sent_token } => {
                    let current = self.holds_token(sent_token.as_deref());
                    if let Some(id) = registered {
                        if current {
                            info!(url = %url, "authentication required; request parked until login");
                            self.begin_reauthentication();
                        } else if self.pending().contains(id) {
                            debug!(url = %url, "rejected token already replaced; request stays parked");
                        } else {
                            debug!(url = %url, "rejected token already replaced; request was replayed");
                        }
                        return;
                    }
                    if call.tracking == Tracking::Replayable && current {
                        self.begin_reauthentication();
                    }
                    self.finish(&call, Err(RequestError::unauthorized(url.as_str())))
                        .await;
                    return;
                }
                Attempt::Redirect { status, target } => {
                    self.release(registered);
                    if call.method != Method::GET {
                        let error =
                            RequestError::redirect_not_followed(url.as_str(), call.method.as_str(), status);
                        self.finish(&call, Err(error)).await;
                        return;
                    }
                    let Some(target) = target else {
                        let error = RequestError::missing_redirect_target(url.as_str(), status);
                        self.finish(&call, Err(error)).await;
                        return;
                    };
                    let Some(next) = redirect.follow() else {
                        self.finish(&call, Err(RequestError::too_many_redirects(&call.url)))
                            .await;
                        return;
                    };
                    debug!(from = %url, to = %target, hops = next.hops(), "following redirect");
                    url = target;
                    redirect = next;
                }
                Attempt::Failed(error) => {
                    self.release(registered);
                    self.finish(&call, Err(error)).await;
                    return;
                }
                Attempt::Cancelled => {
                    self.release(registered);
                    self.finish(&call, Err(RequestError::cancelled(url.as_str())))
                        .await;
                    return;
                }
            }
        }
    }

    /// Registers the attempt for replay when a user is logged in.
    fn register(&self, call: &Arc<Call>, url: &Url, redirect: RedirectState) -> Option<RequestId> {
        if call.tracking != Tracking::Replayable {
            return None;
        }
        let owner = self.session().user_id()?.to_owned();
        let id = RequestId::new_v4();
        let continuation = replay_continuation(
            Arc::downgrade(&self.inner),
            Arc::clone(call),
            url.clone(),
            redirect,
        );
        self.pending().enqueue(id, owner, continuation);
        call.set_registered(Some(id));
        debug!(request_id = %id, url = %url, "request registered");
        Some(id)
    }

    fn release(&self, id: Option<RequestId>) {
        if let Some(id) = id {
            self.pending().dequeue(id);
        }
    }

    async fn cancel_parked(&self, call: &Call) {
        self.release(call.registered());
        self.finish(call, Err(RequestError::cancelled(&call.url)))
            .await;
    }

    /// Sends one attempt. The id of an opened upload source is stored in
    /// `upload_attempt` so the caller can close it even if this future is dropped.
    async fn attempt(
        &self,
        call: &Call,
        url: &Url,
        upload_attempt: &mut Option<AttemptId>,
    ) -> Attempt {
        let mut request = self.inner.http.request(call.method.clone(), url.clone());
        let sent_token = self.bearer_token();
        if let Some(token) = &sent_token {
            request = request.bearer_auth(token);
        }

        match &call.body {
            RequestBody::Empty => {}
            RequestBody::Form(fields) => {
                let encoded = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields.iter())
                    .finish();
                request = request.header(CONTENT_TYPE, FORM_CONTENT_TYPE).body(encoded);
            }
            RequestBody::Upload(source) => {
                let opened = match source.open(url.as_str()).await {
                    Ok(opened) => opened,
                    Err(error) => return Attempt::Failed(error),
                };
                *upload_attempt = Some(opened);
                let progress = ProgressSink::new(
                    call.options.upload_progress(),
                    call.options.progress_reporter(),
                    source.total(),
                );
                if let Some(total) = source.total() {
                    request = request.header(CONTENT_LENGTH, total);
                }
                request = request.body(source.body(opened, progress));
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(source) => return Attempt::Failed(RequestError::transport(url.as_str(), source)),
        };
        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "response received");

        match classify_status(status) {
            StatusClass::Success => match self.read_body(call, url, response).await {
                Ok(reply) => Attempt::Completed(reply),
                Err(error) => Attempt::Failed(error),
            },
            StatusClass::Redirect => Attempt::Redirect {
                status: status.as_u16(),
                target: redirect_target(url, response.headers()),
            },
            StatusClass::AuthRequired => Attempt::AuthRequired { sent_token },
            StatusClass::HttpError => {
                Attempt::Failed(RequestError::http_status(url.as_str(), status.as_u16()))
            }
        }
    }

    /// Streams the body into the call's sink, or buffers it.
    async fn read_body(
        &self,
        call: &Call,
        url: &Url,
        response: Response,
    ) -> Result<Reply, RequestError> {
        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers().clone();
        // The reporter tracks the transfer itself; a buffered reply (such as
        // the answer to an upload) only feeds the download callback.
        let reporter = match &call.target {
            ResponseTarget::Sink(_) => call.options.progress_reporter(),
            ResponseTarget::Buffer => None,
        };
        let mut progress = ProgressSink::new(
            call.options.download_progress(),
            reporter,
            response.content_length(),
        );

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| RequestError::transport(url.as_str(), source))?;
            match &call.target {
                ResponseTarget::Buffer => body.extend_from_slice(&chunk),
                ResponseTarget::Sink(sink) => sink.lock().await.write_chunk(&chunk).await?,
            }
            progress.advance(chunk.len() as u64);
        }
        Ok(Reply::new(status, final_url, headers, body))
    }

    /// True when the session still holds `token` (both absent counts as held).
    fn holds_token(&self, token: Option<&str>) -> bool {
        self.session()
            .token()
            .map(|current| current.access_token.as_str())
            == token
    }

    /// Current bearer token; an expired one is discarded along with its file.
    fn bearer_token(&self) -> Option<String> {
        let lookup = self.session().bearer_at(now_secs());
        match lookup {
            BearerLookup::Valid(token) => return Some(token),
            BearerLookup::Expired => {
                info!("access token expired; discarding it");
                if let Err(error) = self.inner.token_store.clear() {
                    warn!(error = %error, "could not remove expired token file");
                }
            }
            BearerLookup::Missing => {}
        }
        self.notify(Notification::warning(
            "Warning",
            "Token could not be added to the request",
        ));
        None
    }

    /// Delivers the terminal result of a call. Later calls are ignored.
    async fn finish(&self, call: &Call, result: Result<Reply, RequestError>) {
        let Some(sender) = call.take_sender() else {
            debug!(url = %call.url, "request already resolved");
            return;
        };
        if let Err(error) = &result {
            if let ResponseTarget::Sink(sink) = &call.target {
                sink.lock().await.abort().await;
            }
            if error.is_cancelled() {
                info!(url = %call.url, "request cancelled");
            } else {
                warn!(url = %call.url, error = %error, "request failed");
                self.notify(Notification::error(
                    error.notification_title(),
                    error.notification_message(),
                ));
            }
            call.options.report_error(error);
        }
        if sender.send(result).is_err() {
            debug!(url = %call.url, "caller stopped waiting for the response");
        }
    }
}

fn replay_continuation(
    inner: Weak<Inner>,
    call: Arc<Call>,
    url: Url,
    redirect: RedirectState,
) -> Continuation {
    Box::new(move || {
        let Some(inner) = inner.upgrade() else {
            return async {}.boxed();
        };
        debug!(url = %url, "replaying request");
        let manager = ConnectionManager { inner };
        manager.issue(call, url, redirect)
    })
}
