//! Shared fixtures for the integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use osf_connection::auth::{AuthorizationRequest, OAuthConfig};
use osf_connection::{
    ChannelNotifier, ClientConfig, ConnectionManager, LoginError, LoginProvider, NetworkStatus,
    Notification, NotificationLevel, SessionEvent, Token, TokenStore,
};
use serde_json::json;
use tokio::sync::{Semaphore, broadcast, mpsc};
use wiremock::MockServer;

pub const TOKEN_FILE: &str = "token.json";

/// Current-user document as served by `users/me/`.
pub fn user_doc(id: &str) -> serde_json::Value {
    json!({
        "data": {
            "id": id,
            "type": "users",
            "attributes": { "full_name": format!("User {id}") }
        }
    })
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Login provider handing out pre-scripted tokens, optionally held back by a gate.
#[derive(Default)]
pub struct ScriptedLogin {
    tokens: Mutex<VecDeque<Token>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedLogin {
    pub fn returning(tokens: &[&str]) -> Self {
        Self {
            tokens: Mutex::new(
                tokens
                    .iter()
                    .map(|token| Token::expiring_in(*token, 3_600))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    /// Each `authenticate` waits for one permit of `gate` before answering.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoginProvider for ScriptedLogin {
    async fn authenticate(&self, request: AuthorizationRequest) -> Result<Token, LoginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(request.url.as_str().contains("state="));
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| LoginError::Provider(e.to_string()))?
                .forget();
        }
        self.tokens
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LoginError::Cancelled)
    }
}

/// A manager wired to `server`, with its notifications captured.
pub struct Harness {
    pub manager: ConnectionManager,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
    pub login: Arc<ScriptedLogin>,
    pub token_store: TokenStore,
    pub base: String,
}

impl Harness {
    pub fn new(server: &MockServer, dir: &Path, login: ScriptedLogin) -> Self {
        Self::build(server, dir, login, None)
    }

    pub fn with_network(
        server: &MockServer,
        dir: &Path,
        network: Arc<dyn NetworkStatus>,
    ) -> Self {
        Self::build(server, dir, ScriptedLogin::default(), Some(network))
    }

    fn build(
        server: &MockServer,
        dir: &Path,
        login: ScriptedLogin,
        network: Option<Arc<dyn NetworkStatus>>,
    ) -> Self {
        let base = server.uri();
        let token_path = dir.join(TOKEN_FILE);
        let oauth = OAuthConfig {
            logout_url: format!("{base}/oauth2/revoke"),
            ..OAuthConfig::osf("test-client")
        };
        let config = ClientConfig::new(&token_path)
            .with_api_base_url(format!("{base}/v2/"))
            .with_oauth(oauth);

        let (notifier, notifications) = ChannelNotifier::new();
        let login = Arc::new(login);
        let mut builder = ConnectionManager::builder(config)
            .notifier(Arc::new(notifier))
            .login_provider(login.clone());
        if let Some(network) = network {
            builder = builder.network_status(network);
        }
        Self {
            manager: builder.build().unwrap(),
            notifications,
            login,
            token_store: TokenStore::new(token_path),
            base,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Persists a token valid for an hour.
    pub fn store_token(&self, token: &str) {
        self.token_store
            .persist(&Token::expiring_in(token, 3_600))
            .unwrap();
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        let mut drained = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            drained.push(notification);
        }
        drained
    }

    pub fn drain_errors(&mut self) -> Vec<Notification> {
        self.drain_notifications()
            .into_iter()
            .filter(|n| n.level == NotificationLevel::Error)
            .collect()
    }
}

/// Waits until `count` `LoggedOut` events were received.
pub async fn wait_for_logouts(events: &mut broadcast::Receiver<SessionEvent>, count: usize) {
    let mut seen = 0;
    while seen < count {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for logout")
            .unwrap();
        if event == SessionEvent::LoggedOut {
            seen += 1;
        }
    }
}

/// Names of the entries in `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
