//! The connection manager: shared state and its collaborators.
//!
//! A [`ConnectionManager`] is cheap to clone; clones share one session, one
//! pending-request queue and one HTTP client. Its operations are split over
//! several modules: verbs and classification in `request::dispatch`, login and
//! logout in `lifecycle`, API shortcuts in `api` and transfers in `transfer`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::Client;
use tokio::sync::broadcast;
use tracing::debug;

use crate::api::{OsfUrls, UrlBuilder};
use crate::auth::{LoggedInUser, LoginProvider, NoInteractiveLogin, OAuthConfig, Session, TokenStore};
use crate::config::ClientConfig;
use crate::network::{AlwaysOnline, NetworkStatus};
use crate::notify::{Notification, Notifier, TracingNotifier};
use crate::request::PendingRequestQueue;
use crate::user_agent;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Session transitions broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { user_id: String },
    LoggedOut,
}

/// Errors building a [`ConnectionManager`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid API base URL {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub(crate) struct Inner {
    pub(crate) http: Client,
    pub(crate) session: Mutex<Session>,
    pub(crate) pending: Mutex<PendingRequestQueue>,
    pub(crate) token_store: TokenStore,
    pub(crate) oauth: OAuthConfig,
    pub(crate) urls: Arc<dyn UrlBuilder>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) network: Arc<dyn NetworkStatus>,
    pub(crate) login: Arc<dyn LoginProvider>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
}

/// Authenticated, replaying HTTP access to the OSF API.
#[derive(Clone)]
pub struct ConnectionManager {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("token_path", &self.inner.token_store.path())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

/// Configures the collaborators of a [`ConnectionManager`].
pub struct ConnectionManagerBuilder {
    config: ClientConfig,
    notifier: Option<Arc<dyn Notifier>>,
    network: Option<Arc<dyn NetworkStatus>>,
    login: Option<Arc<dyn LoginProvider>>,
    urls: Option<Arc<dyn UrlBuilder>>,
}

impl ConnectionManagerBuilder {
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn network_status(mut self, network: Arc<dyn NetworkStatus>) -> Self {
        self.network = Some(network);
        self
    }

    #[must_use]
    pub fn login_provider(mut self, login: Arc<dyn LoginProvider>) -> Self {
        self.login = Some(login);
        self
    }

    #[must_use]
    pub fn url_builder(mut self, urls: Arc<dyn UrlBuilder>) -> Self {
        self.urls = Some(urls);
        self
    }

    /// # Errors
    ///
    /// Returns [`BuildError`] when the API base URL is malformed or the HTTP
    /// client cannot be constructed.
    pub fn build(self) -> Result<ConnectionManager, BuildError> {
        let urls = match self.urls {
            Some(urls) => urls,
            None => Arc::new(OsfUrls::new(&self.config.api_base_url).map_err(|source| {
                BuildError::InvalidBaseUrl {
                    url: self.config.api_base_url.clone(),
                    source,
                }
            })?),
        };
        let http = build_client(
            self.config.connect_timeout_secs,
            self.config.read_timeout_secs,
        )
        .map_err(BuildError::HttpClient)?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        debug!(
            api_base_url = %self.config.api_base_url,
            token_path = %self.config.token_path.display(),
            "connection manager configured"
        );
        Ok(ConnectionManager {
            inner: Arc::new(Inner {
                http,
                session: Mutex::new(Session::new()),
                pending: Mutex::new(PendingRequestQueue::new()),
                token_store: TokenStore::new(self.config.token_path),
                oauth: self.config.oauth,
                urls,
                notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
                network: self.network.unwrap_or_else(|| Arc::new(AlwaysOnline)),
                login: self.login.unwrap_or_else(|| Arc::new(NoInteractiveLogin)),
                events,
            }),
        })
    }
}

/// Builds the shared HTTP client. Redirects are handled by the dispatcher.
fn build_client(connect_timeout_secs: u64, read_timeout_secs: u64) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .read_timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(user_agent::default_user_agent())
        .build()
}

impl ConnectionManager {
    pub fn builder(config: ClientConfig) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder {
            config,
            notifier: None,
            network: None,
            login: None,
            urls: None,
        }
    }

    /// Receives [`SessionEvent`]s emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn logged_in_user(&self) -> Option<LoggedInUser> {
        self.session().user().cloned()
    }

    /// True while the session holds an unexpired token.
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.session().is_authorized()
    }

    /// Number of requests currently registered for replay.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    #[must_use]
    pub fn token_store(&self) -> &TokenStore {
        &self.inner.token_store
    }

    pub(crate) fn session(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn pending(&self) -> MutexGuard<'_, PendingRequestQueue> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn notify(&self, notification: Notification) {
        self.inner.notifier.notify(notification);
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        if self.inner.events.send(event).is_err() {
            debug!("no session event subscribers");
        }
    }
}
