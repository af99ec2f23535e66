//! Periodic liveness request that tells the coordinator the run is still
//! active. Independent of the channel heartbeats and of the request queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::queue::{HttpRequest, RequestRunner};

/// Handle on the liveness task of one run.
///
/// The task stops after [`stop`](Self::stop) or once the handle is dropped.
#[derive(Debug)]
pub(crate) struct RunHeartbeat {
    period: watch::Sender<Option<Duration>>,
}

impl RunHeartbeat {
    /// Spawns the task. A zero period starts it stopped.
    pub(crate) fn spawn(
        url: String,
        period: Duration,
        timeout: Duration,
        runner: Arc<dyn RequestRunner>,
    ) -> Self {
        let initial = (!period.is_zero()).then_some(period);
        let (tx, rx) = watch::channel(initial);
        if initial.is_some() {
            tokio::spawn(beat_loop(HttpRequest::post(url), timeout, runner, rx));
        }
        Self { period: tx }
    }

    /// Changes the period; the next beat is one new period from now.
    /// Ignored for a zero period or once stopped.
    pub(crate) fn set_period(&self, period: Duration) {
        if period.is_zero() {
            return;
        }
        self.period.send_if_modified(|current| match current {
            Some(_) => {
                *current = Some(period);
                true
            }
            None => false,
        });
    }

    pub(crate) fn stop(&self) {
        self.period.send_replace(None);
    }
}

async fn beat_loop(
    request: HttpRequest,
    timeout: Duration,
    runner: Arc<dyn RequestRunner>,
    mut period: watch::Receiver<Option<Duration>>,
) {
    loop {
        let Some(every) = *period.borrow_and_update() else {
            break;
        };
        tokio::select! {
            _ = tokio::time::sleep(every) => beat(runner.as_ref(), &request, timeout).await,
            changed = period.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!(url = %request.url, "Run heartbeat stopped");
}

async fn beat(runner: &dyn RequestRunner, request: &HttpRequest, timeout: Duration) {
    match tokio::time::timeout(timeout, runner.execute(request)).await {
        Ok(Ok(status)) if (200..300).contains(&status.code) => {
            tracing::debug!(url = %request.url, "Run heartbeat sent");
        }
        Ok(Ok(status)) => {
            tracing::warn!(url = %request.url, status = status.code, "Run heartbeat rejected");
        }
        Ok(Err(error)) => {
            tracing::warn!(url = %request.url, %error, "Run heartbeat failed");
        }
        Err(_) => {
            tracing::warn!(url = %request.url, "Run heartbeat timed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::sleep;

    use super::*;
    use crate::queue::fake::{ScriptedRunner, Step};

    const URL: &str = "http://localhost:9000/publix/7/heartbeat?srid=42";

    fn spawn(runner: &Arc<ScriptedRunner>, period: Duration) -> RunHeartbeat {
        RunHeartbeat::spawn(URL.to_string(), period, Duration::from_secs(15), runner.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_beats_every_period_until_stopped() {
        let runner = Arc::new(ScriptedRunner::default());
        let heartbeat = spawn(&runner, Duration::from_secs(1));

        sleep(Duration::from_millis(3_500)).await;
        assert_eq!(runner.attempts(URL), 3);

        // Restarts the wait: beats at 5.5s and 7.5s
        heartbeat.set_period(Duration::from_secs(2));
        sleep(Duration::from_millis(4_100)).await;
        assert_eq!(runner.attempts(URL), 5);

        heartbeat.stop();
        sleep(Duration::from_secs(10)).await;
        assert_eq!(runner.attempts(URL), 5);

        heartbeat.set_period(Duration::from_secs(1));
        sleep(Duration::from_secs(10)).await;
        assert_eq!(runner.attempts(URL), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_beat_keeps_going() {
        let runner = Arc::new(ScriptedRunner::default());
        runner.script(
            URL,
            vec![Step::Status(500), Step::NetworkError("reset".into())],
        );
        let _heartbeat = spawn(&runner, Duration::from_secs(1));

        sleep(Duration::from_millis(3_500)).await;
        assert_eq!(runner.attempts(URL), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_never_beats() {
        let runner = Arc::new(ScriptedRunner::default());
        let heartbeat = spawn(&runner, Duration::ZERO);
        heartbeat.set_period(Duration::from_secs(1));

        sleep(Duration::from_secs(10)).await;
        assert_eq!(runner.attempts(URL), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_stops_task() {
        let runner = Arc::new(ScriptedRunner::default());
        let heartbeat = spawn(&runner, Duration::from_secs(1));
        sleep(Duration::from_millis(1_500)).await;
        drop(heartbeat);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(runner.attempts(URL), 1);
    }
}
