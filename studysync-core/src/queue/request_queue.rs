use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};

use super::dispatcher::spawn_dispatcher;
use super::request::{DispatchResponse, HttpRequest, PendingRequest};
use super::runner::RequestRunner;
use crate::config::HttpPolicy;
use crate::error::{ErrorReporter, SyncError};
use crate::session::pending::Reply;

enum QueueCommand {
    Submit {
        pending: PendingRequest,
        reply: Reply<()>,
    },
    Drained {
        reply: oneshot::Sender<()>,
    },
}

/// Serial, retried delivery of outbound requests.
///
/// Requests are delivered strictly in submission order, one at a time.
/// Each submission returns a [`Delivery`] that resolves with the request's
/// terminal outcome; [`wait_drained`](Self::wait_drained) resolves once no
/// request is pending. A failure whose `Delivery` was dropped goes to the
/// reporter's global hook instead.
#[derive(Clone)]
pub struct RequestQueue {
    commands: mpsc::UnboundedSender<QueueCommand>,
    next_id: Arc<AtomicU64>,
    policy: HttpPolicy,
}

impl RequestQueue {
    /// Spawns the queue and its background dispatcher.
    pub fn spawn(
        runner: Arc<dyn RequestRunner>,
        policy: HttpPolicy,
        reporter: ErrorReporter,
    ) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (dispatch, responses) = spawn_dispatcher(runner);
        tokio::spawn(
            QueueActor {
                commands: commands_rx,
                dispatch,
                responses,
                reporter,
                pending: BTreeMap::new(),
                drain_waiters: Vec::new(),
            }
            .run(),
        );
        Self {
            commands,
            next_id: Arc::new(AtomicU64::new(0)),
            policy,
        }
    }

    /// Queues `request` and returns a handle on its outcome.
    pub fn submit(&self, request: HttpRequest) -> Delivery {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (reply, rx) = oneshot::channel();
        let pending = PendingRequest::new(id, request, &self.policy);
        if let Err(mpsc::error::SendError(QueueCommand::Submit { reply, .. })) =
            self.commands.send(QueueCommand::Submit { pending, reply })
        {
            let _ = reply.send(Err(stopped()));
        }
        Delivery { id, rx }
    }

    /// Number of requests submitted so far.
    pub fn submitted(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Resolves once every request submitted before this call has its
    /// terminal outcome (and no newer one is still pending).
    pub async fn wait_drained(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(QueueCommand::Drained { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("submitted", &self.submitted())
            .field("policy", &self.policy)
            .finish()
    }
}

fn stopped() -> SyncError {
    SyncError::Transport("Request queue stopped".to_string())
}

/// Outcome of one queued request.
#[derive(Debug)]
pub struct Delivery {
    id: u64,
    rx: oneshot::Receiver<Result<(), SyncError>>,
}

impl Delivery {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Gives up on the outcome. A failure is then reported through the
    /// global error hook.
    pub fn detach(self) {}
}

impl Future for Delivery {
    type Output = Result<(), SyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(stopped())))
    }
}

struct PendingEntry {
    request: HttpRequest,
    reply: Reply<()>,
}

struct QueueActor {
    commands: mpsc::UnboundedReceiver<QueueCommand>,
    dispatch: mpsc::UnboundedSender<PendingRequest>,
    responses: mpsc::UnboundedReceiver<DispatchResponse>,
    reporter: ErrorReporter,
    pending: BTreeMap<u64, PendingEntry>,
    drain_waiters: Vec<oneshot::Sender<()>>,
}

impl QueueActor {
    async fn run(mut self) {
        let mut accepting = true;
        loop {
            if !accepting && self.pending.is_empty() {
                break;
            }
            tokio::select! {
                command = self.commands.recv(), if accepting => match command {
                    Some(command) => self.handle_command(command),
                    None => accepting = false,
                },
                response = self.responses.recv() => match response {
                    Some(response) => self.complete(response),
                    None => break,
                },
            }
        }
        for (_, entry) in std::mem::take(&mut self.pending) {
            let _ = entry.reply.send(Err(stopped()));
        }
    }

    fn handle_command(&mut self, command: QueueCommand) {
        match command {
            QueueCommand::Submit { pending, reply } => {
                let id = pending.id;
                let request = pending.request.clone();
                if self.dispatch.send(pending).is_err() {
                    let _ = reply.send(Err(stopped()));
                    return;
                }
                self.pending.insert(id, PendingEntry { request, reply });
            }
            QueueCommand::Drained { reply } => {
                if self.pending.is_empty() {
                    let _ = reply.send(());
                } else {
                    self.drain_waiters.push(reply);
                }
            }
        }
    }

    fn complete(&mut self, response: DispatchResponse) {
        let Some(entry) = self.pending.remove(&response.request_id) else {
            tracing::warn!(id = response.request_id, "Response for unknown request");
            return;
        };
        let result = if response.is_success() {
            Ok(())
        } else {
            Err(SyncError::Transport(
                response.failure_message(&entry.request),
            ))
        };
        match entry.reply.send(result) {
            // Nobody waits for this outcome
            Err(Err(error)) => self.reporter.report_global(&error),
            Ok(()) if !response.is_success() => {
                tracing::warn!(id = response.request_id, "Request failed");
            }
            _ => {}
        }

        if self.pending.is_empty() {
            for waiter in self.drain_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use futures::FutureExt;

    use super::super::runner::fake::{ScriptedRunner, Step};
    use super::*;

    fn queue(runner: Arc<ScriptedRunner>) -> RequestQueue {
        RequestQueue::spawn(runner, HttpPolicy::default(), ErrorReporter::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_order_and_ids() {
        let runner = Arc::new(ScriptedRunner::with_latency(Duration::from_millis(10)));
        let queue = queue(runner.clone());

        let a = queue.submit(HttpRequest::post_text("http://x/a", "1"));
        let b = queue.submit(HttpRequest::post_text("http://x/b", "2"));
        assert_eq!((a.id(), b.id()), (1, 2));
        assert_eq!(queue.submitted(), 2);

        b.await.unwrap();
        a.now_or_never().unwrap().unwrap();
        assert_eq!(
            runner.log(),
            vec!["start http://x/a", "end http://x/a", "start http://x/b", "end http://x/b"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drained_waits_for_every_retry() {
        let runner = Arc::new(ScriptedRunner::with_latency(Duration::from_millis(10)));
        runner.script("http://x/1", vec![Step::Status(503)]);
        runner.script("http://x/2", vec![Step::NetworkError("reset".into())]);
        let queue = queue(runner.clone());

        let outcomes = Arc::new(Mutex::new(Vec::new()));
        for n in 1..=3 {
            let delivery = queue.submit(HttpRequest::post_text(format!("http://x/{}", n), "d"));
            let outcomes = outcomes.clone();
            tokio::spawn(async move {
                let result = delivery.await;
                outcomes.lock().unwrap().push((n, result.is_ok()));
            });
        }

        queue.wait_drained().await;
        // Let the spawned observers record their outcome
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(runner.attempts("http://x/1"), 2);
        assert_eq!(runner.attempts("http://x/2"), 2);
        assert_eq!(runner.attempts("http://x/3"), 1);
        assert!(runner.log().ends_with(&["end http://x/3".to_string()]));
        let mut outcomes = outcomes.lock().unwrap().clone();
        outcomes.sort();
        assert_eq!(outcomes, vec![(1, true), (2, true), (3, true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_block_later_requests() {
        let runner = Arc::new(ScriptedRunner::default());
        runner.script("http://x/bad", vec![Step::Status(404)]);
        let queue = queue(runner);

        let bad = queue.submit(HttpRequest::put_text("http://x/bad", "x"));
        let good = queue.submit(HttpRequest::get("http://x/good"));

        assert_eq!(
            bad.await,
            Err(SyncError::Transport(
                "PUT to http://x/bad failed: 404".to_string()
            ))
        );
        assert_eq!(good.await, Ok(()));
    }

    #[tokio::test]
    async fn test_drained_on_empty_queue_resolves_immediately() {
        let queue = queue(Arc::new(ScriptedRunner::default()));
        queue.wait_drained().await;
        assert_eq!(queue.submitted(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_failure_goes_to_global_hook() {
        let runner = Arc::new(ScriptedRunner::default());
        runner.script("http://x/log", vec![Step::Status(404)]);
        runner.script("http://x/awaited", vec![Step::Status(404)]);
        let reported = Arc::new(Mutex::new(Vec::new()));
        let r = reported.clone();
        let reporter = ErrorReporter::new(Some(Arc::new(move |error: &SyncError| {
            r.lock().unwrap().push(error.to_string());
        })));
        let queue = RequestQueue::spawn(runner, HttpPolicy::default(), reporter);

        queue.submit(HttpRequest::post_text("http://x/log", "a")).detach();
        drop(queue.submit(HttpRequest::post_text("http://x/ok", "b")));
        let awaited = queue.submit(HttpRequest::get("http://x/awaited"));

        assert!(awaited.await.is_err());
        queue.wait_drained().await;
        assert_eq!(
            reported.lock().unwrap().clone(),
            vec!["POST to http://x/log failed: 404"]
        );
    }
}
