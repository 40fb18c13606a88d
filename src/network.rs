//! Network reachability, checked before any request is issued.

use std::sync::atomic::{AtomicBool, Ordering};

/// Answers whether the network is currently usable.
pub trait NetworkStatus: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Assumes the network is always reachable and lets transport errors speak.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

impl NetworkStatus for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// A reachability flag that the embedding application flips as connectivity
/// changes.
#[derive(Debug)]
pub struct NetworkFlag {
    online: AtomicBool,
}

impl NetworkFlag {
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for NetworkFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkStatus for NetworkFlag {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
