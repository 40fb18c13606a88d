//! Requests parked until the session is re-authenticated.
//!
//! Every request issued while a user is logged in is registered here under a
//! fresh id before it goes out, and released once its response has been
//! classified. Requests that hit an authentication failure stay registered;
//! after the next successful login the continuations owned by that user are
//! replayed in registration order and the queue is emptied.

use std::fmt;
use std::future::IntoFuture;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use uuid::Uuid;

/// Identifier of one issued attempt.
pub type RequestId = Uuid;

/// The re-issued attempt of a parked request.
pub type Replay = BoxFuture<'static, ()>;

/// Re-issues a parked request.
pub type Continuation = Box<dyn FnOnce() -> Replay + Send>;

struct PendingRequest {
    id: RequestId,
    owner_user_id: String,
    continuation: Continuation,
}

/// Insertion-ordered registry of replayable requests.
#[derive(Default)]
pub struct PendingRequestQueue {
    entries: Vec<PendingRequest>,
}

impl PendingRequestQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a continuation. An existing entry with the same id is replaced.
    pub fn enqueue(
        &mut self,
        id: RequestId,
        owner_user_id: impl Into<String>,
        continuation: Continuation,
    ) {
        self.entries.retain(|entry| entry.id != id);
        self.entries.push(PendingRequest {
            id,
            owner_user_id: owner_user_id.into(),
            continuation,
        });
    }

    /// Removes an entry. Returns false when the id was not registered.
    pub fn dequeue(&mut self, id: RequestId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    #[must_use]
    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    #[must_use]
    pub fn owner_of(&self, id: RequestId) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.owner_user_id.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empties the queue and returns, in order, the continuations owned by `user_id`.
    ///
    /// Entries of other users are dropped.
    #[must_use]
    pub fn take_for_replay(&mut self, user_id: &str) -> Vec<Continuation> {
        std::mem::take(&mut self.entries)
            .into_iter()
            .filter(|entry| entry.owner_user_id == user_id)
            .map(|entry| entry.continuation)
            .collect()
    }

    /// Invokes every continuation owned by `user_id` in registration order,
    /// then clears the queue.
    ///
    /// Continuations run after they left the queue, so they may enqueue new work.
    /// The returned batch drives the replays one after another.
    pub fn replay_all(&mut self, user_id: &str) -> ReplayBatch {
        let replays = self
            .take_for_replay(user_id)
            .into_iter()
            .map(|continuation| continuation())
            .collect();
        ReplayBatch { replays }
    }
}

/// Replays taken from the queue, awaited strictly in registration order.
#[must_use = "replays do nothing unless awaited or spawned"]
pub struct ReplayBatch {
    replays: Vec<Replay>,
}

impl ReplayBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.replays.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replays.is_empty()
    }
}

impl IntoFuture for ReplayBatch {
    type Output = ();
    type IntoFuture = Replay;

    fn into_future(self) -> Self::IntoFuture {
        async move {
            for replay in self.replays {
                replay.await;
            }
        }
        .boxed()
    }
}

impl fmt::Debug for ReplayBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayBatch")
            .field("replays", &self.replays.len())
            .finish()
    }
}

impl fmt::Debug for PendingRequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|entry| (entry.id, entry.owner_user_id.as_str())),
            )
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Continuation) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = Arc::clone(&log);
            move |label: &'static str| -> Continuation {
                let log = Arc::clone(&log);
                Box::new(move || {
                    log.lock().unwrap().push(label);
                    async {}.boxed()
                })
            }
        };
        (log, make)
    }

    #[test]
    fn test_replay_all_runs_matching_user_in_order_then_clears() {
        let (log, make) = recorder();
        let mut queue = PendingRequestQueue::new();
        queue.enqueue(Uuid::new_v4(), "u1", make("a"));
        queue.enqueue(Uuid::new_v4(), "u2", make("other"));
        queue.enqueue(Uuid::new_v4(), "u1", make("b"));
        queue.enqueue(Uuid::new_v4(), "u1", make("c"));

        assert_eq!(queue.replay_all("u1").len(), 3);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_replay_fires_each_entry_once() {
        let (log, make) = recorder();
        let mut queue = PendingRequestQueue::new();
        queue.enqueue(Uuid::new_v4(), "u1", make("a"));

        assert_eq!(queue.replay_all("u1").len(), 1);
        assert!(queue.replay_all("u1").is_empty());
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_enqueue_replaces_same_id() {
        let (log, make) = recorder();
        let mut queue = PendingRequestQueue::new();
        let id = Uuid::new_v4();
        queue.enqueue(id, "u1", make("old"));
        queue.enqueue(id, "u1", make("new"));

        assert_eq!(queue.len(), 1);
        let _ = queue.replay_all("u1");
        assert_eq!(*log.lock().unwrap(), vec!["new"]);
    }

    #[test]
    fn test_dequeue_reports_presence() {
        let (_log, make) = recorder();
        let mut queue = PendingRequestQueue::new();
        let id = Uuid::new_v4();
        queue.enqueue(id, "u1", make("a"));

        assert!(queue.contains(id));
        assert_eq!(queue.owner_of(id), Some("u1"));
        assert!(queue.dequeue(id));
        assert!(!queue.dequeue(id));
        assert!(!queue.contains(id));
    }

    #[test]
    fn test_replay_for_unknown_user_drops_everything() {
        let (log, make) = recorder();
        let mut queue = PendingRequestQueue::new();
        queue.enqueue(Uuid::new_v4(), "u1", make("a"));

        assert!(queue.replay_all("u9").is_empty());
        assert!(queue.is_empty());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_continuation_may_enqueue_while_replaying() {
        let queue = Arc::new(Mutex::new(PendingRequestQueue::new()));
        let inner = Arc::clone(&queue);
        queue.lock().unwrap().enqueue(
            Uuid::new_v4(),
            "u1",
            Box::new(move || {
                inner
                    .lock()
                    .unwrap()
                    .enqueue(Uuid::new_v4(), "u1", Box::new(|| async {}.boxed()));
                async {}.boxed()
            }),
        );

        let continuations = queue.lock().unwrap().take_for_replay("u1");
        for continuation in continuations {
            drop(continuation());
        }
        assert_eq!(queue.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replay_batch_runs_one_replay_at_a_time() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = PendingRequestQueue::new();
        for label in ["a", "b"] {
            let log = Arc::clone(&log);
            queue.enqueue(
                Uuid::new_v4(),
                "u1",
                Box::new(move || {
                    async move {
                        log.lock().unwrap().push(format!("start {label}"));
                        tokio::task::yield_now().await;
                        log.lock().unwrap().push(format!("end {label}"));
                    }
                    .boxed()
                }),
            );
        }

        let batch = queue.replay_all("u1");
        assert!(queue.is_empty());
        assert!(log.lock().unwrap().is_empty());
        batch.await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start a", "end a", "start b", "end b"]
        );
    }
}
