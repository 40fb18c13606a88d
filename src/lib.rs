//! OSF Connection Library
//!
//! An authenticated HTTP connection layer for the Open Science Framework API.
//! One [`ConnectionManager`] owns the session, attaches the bearer token to
//! every request, follows redirects, and parks requests rejected with HTTP 401
//! until the user logged in again, then replays them.
//!
//! # Architecture
//!
//! - [`auth`] - Tokens, session state and the OAuth2 implicit-grant login
//! - [`request`] - Verbs, redirect handling, the pending-request queue
//! - [`transfer`] - Staged downloads and streamed uploads
//! - [`api`] - URL templates for the OSF API and shortcut operations
//! - [`notify`] / [`network`] - Seams for user notifications and connectivity

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod auth;
pub mod config;
mod lifecycle;
mod manager;
pub mod network;
pub mod notify;
pub mod request;
pub mod transfer;
mod user_agent;

// Re-export commonly used types
pub use api::{ApiCall, OsfUrls, UrlBuilder};
pub use auth::{LoggedInUser, LoginError, LoginProvider, OAuthConfig, Token, TokenStore};
pub use config::ClientConfig;
pub use lifecycle::SessionError;
pub use manager::{BuildError, ConnectionManager, ConnectionManagerBuilder, SessionEvent};
pub use network::{AlwaysOnline, NetworkFlag, NetworkStatus};
pub use notify::{ChannelNotifier, Notification, NotificationLevel, Notifier, TracingNotifier};
pub use request::{AbortHandle, Reply, RequestError, RequestOptions};
pub use transfer::{DownloadStager, HandleStats, ProgressReporter, UploadSource};
