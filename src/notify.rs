//! Categorized user-facing notifications.
//!
//! The connection manager never talks to a presentation layer directly. It
//! emits [`Notification`] values through a [`Notifier`]: the default
//! [`TracingNotifier`] logs them, while [`ChannelNotifier`] forwards them to a
//! tokio channel for a UI (or a test) to consume.

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Severity of a [`Notification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationLevel {
    Error,
    Warning,
    Info,
    Success,
}

impl NotificationLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A titled message meant for the person using the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title, message)
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, message)
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title, message)
    }
}

/// Receives notifications emitted by the connection manager.
///
/// Implementations must not block: `notify` is called from request tasks.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Logs every notification through `tracing` at a matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        let Notification {
            level,
            title,
            message,
        } = notification;
        match level {
            NotificationLevel::Error => error!(title = %title, "{message}"),
            NotificationLevel::Warning => warn!(title = %title, "{message}"),
            NotificationLevel::Info | NotificationLevel::Success => {
                info!(title = %title, level = %level, "{message}");
            }
        }
    }
}

/// Forwards notifications to an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Creates a notifier together with the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            debug!("notification receiver dropped; discarding notification");
        }
    }
}
