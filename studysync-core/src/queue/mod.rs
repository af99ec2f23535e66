//! Ordered, retried delivery of outbound data.
//!
//! [`RequestQueue`] hands requests to a background dispatcher task that
//! delivers exactly one at a time, in submission order, through a
//! [`RequestRunner`]. Transient failures (network errors, timeouts, 5xx) are
//! retried with a fixed wait; the terminal outcome resolves the submitter's
//! [`Delivery`].

mod dispatcher;
mod request;
mod request_queue;
mod runner;

pub use dispatcher::deliver;
pub use request::{Body, DispatchResponse, HttpRequest, HttpStatus, Method, PendingRequest};
pub use request_queue::{Delivery, RequestQueue};
pub use runner::{HttpRunner, RequestRunner};

#[cfg(test)]
pub(crate) use runner::fake;
