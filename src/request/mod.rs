//! Request dispatch: verbs, redirects, replay after re-authentication.
//!
//! Every verb resolves exactly once with a [`Reply`] or a [`RequestError`].
//! While a user is logged in each attempt is registered in the
//! [`PendingRequestQueue`]; an attempt rejected with HTTP 401 stays registered
//! and is re-issued after the next successful login of the same user.
//! 301/302 answers to GET requests are followed up to [`MAX_REDIRECTS`] times.

pub(crate) mod dispatch;
mod error;
mod options;
mod outcome;
mod pending;
mod redirect;
mod reply;

pub use error::RequestError;
pub use options::{AbortHandle, ErrorCallback, RequestOptions};
pub use outcome::{StatusClass, classify_status};
pub use pending::{Continuation, PendingRequestQueue, Replay, ReplayBatch, RequestId};
pub use redirect::{MAX_REDIRECTS, RedirectState, is_followable_redirect, redirect_target};
pub use reply::Reply;
