//! Background delivery: one request at a time, in submission order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use super::request::{DispatchResponse, PendingRequest};
use super::runner::RequestRunner;

/// Runs `pending` to its terminal outcome: success, a non-retryable
/// failure, or the last failure once the retry budget is spent.
pub async fn deliver(runner: &dyn RequestRunner, pending: &PendingRequest) -> DispatchResponse {
    let mut retries_left = pending.retries;
    loop {
        let response = match timeout(pending.timeout, runner.execute(&pending.request)).await {
            Ok(Ok(status)) => DispatchResponse::from_status(pending.id, status),
            Ok(Err(error)) => DispatchResponse::from_error(pending.id, error),
            Err(_) => DispatchResponse::from_error(pending.id, "timeout"),
        };

        if response.is_success() || !response.is_retryable() || retries_left == 0 {
            return response;
        }

        retries_left -= 1;
        tracing::warn!(
            id = pending.id,
            method = %pending.request.method,
            url = %pending.request.url,
            status = ?response.status,
            error = ?response.error,
            retries_left,
            "Request attempt failed, retrying"
        );
        sleep(pending.retry_wait).await;
    }
}

/// Spawns the dispatcher task. Requests go in on the returned sender,
/// outcomes come out on the returned receiver, in the same order.
pub(crate) fn spawn_dispatcher(
    runner: Arc<dyn RequestRunner>,
) -> (
    mpsc::UnboundedSender<PendingRequest>,
    mpsc::UnboundedReceiver<DispatchResponse>,
) {
    let (requests_tx, mut requests) = mpsc::unbounded_channel::<PendingRequest>();
    let (responses, responses_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(pending) = requests.recv().await {
            tracing::debug!(
                id = pending.id,
                method = %pending.request.method,
                url = %pending.request.url,
                "Dispatching request"
            );
            let response = deliver(runner.as_ref(), &pending).await;
            if responses.send(response).is_err() {
                break;
            }
        }
        tracing::debug!("Request dispatcher stopped");
    });

    (requests_tx, responses_rx)
}
