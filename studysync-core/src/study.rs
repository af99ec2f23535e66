//! One active study run: its channels, its request queue and the
//! navigation steps that depend on both.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::channel::{BatchCallbacks, BatchChannel, ChannelState};
use crate::config::SyncConfig;
use crate::error::{ErrorCallback, ErrorReporter, SyncError};
use crate::group::{GroupCallbacks, GroupChannel};
use crate::liveness::RunHeartbeat;
use crate::queue::{Delivery, HttpRequest, HttpRunner, RequestQueue, RequestRunner};
use crate::run::RunContext;
use crate::session::PatchOp;
use crate::transport::{Transport, WebSocketTransport};

/// Content of an uploaded result file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    /// Uploaded as `text/plain`
    Text(String),
    /// Uploaded as pretty-printed `application/json`
    Json(Value),
    Bytes { data: Vec<u8>, content_type: String },
}

/// Options of [`StudyRun::start_component`].
#[derive(Debug, Clone, Default)]
pub struct ComponentStart {
    /// Appended to the current component's result data before leaving it
    pub result_data: Option<String>,
    /// Logged by the coordinator
    pub message: Option<String>,
}

/// Options of [`StudyRun::end_study`].
#[derive(Debug, Clone, Default)]
pub struct EndStudy {
    pub result_data: Option<String>,
    pub successful: Option<bool>,
    pub message: Option<String>,
}

/// Hooks installed when a run is created.
#[derive(Clone, Default)]
pub struct RunHooks {
    /// Global error hook for errors no caller-specific slot takes
    pub on_error: Option<ErrorCallback>,
    pub batch: BatchCallbacks,
}

impl RunHooks {
    pub fn on_error(mut self, callback: impl Fn(&SyncError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_batch_session(
        mut self,
        callback: impl Fn(&str, PatchOp) + Send + Sync + 'static,
    ) -> Self {
        self.batch = self.batch.on_session(callback);
        self
    }
}

/// Everything one study run synchronizes with the coordinator.
///
/// Must be created inside a tokio runtime: the batch channel actor, the
/// request dispatcher and the run heartbeat are spawned right away. The group channel is spawned
/// on the first [`join_group`](Self::join_group).
pub struct StudyRun {
    run: RunContext,
    config: SyncConfig,
    transport: Arc<dyn Transport>,
    runner: Arc<dyn RequestRunner>,
    reporter: ErrorReporter,
    batch: BatchChannel,
    group: Mutex<Option<GroupChannel>>,
    queue: RequestQueue,
    heartbeat: RunHeartbeat,
    study_session_data: Mutex<Value>,
    starting_component: AtomicBool,
    ending: AtomicBool,
}

impl StudyRun {
    /// Creates a run that talks to the coordinator over WebSockets and HTTP.
    pub fn new(run: RunContext, config: SyncConfig, hooks: RunHooks) -> Self {
        Self::with_ports(
            run,
            config,
            Arc::new(WebSocketTransport::new()),
            Arc::new(HttpRunner::new()),
            hooks,
        )
    }

    pub fn with_ports(
        run: RunContext,
        config: SyncConfig,
        transport: Arc<dyn Transport>,
        runner: Arc<dyn RequestRunner>,
        hooks: RunHooks,
    ) -> Self {
        let reporter = ErrorReporter::new(hooks.on_error);
        let batch = BatchChannel::spawn(
            &run,
            config.channel.clone(),
            transport.clone(),
            reporter.clone(),
            hooks.batch,
        );
        let queue = RequestQueue::spawn(runner.clone(), config.http.clone(), reporter.clone());
        let heartbeat = RunHeartbeat::spawn(
            run.heartbeat_url(),
            config.heartbeat_period(),
            config.http.timeout(),
            runner.clone(),
        );
        tracing::debug!(
            study_id = run.study_id,
            study_result_id = run.study_result_id,
            "Study run created"
        );
        Self {
            run,
            config,
            transport,
            runner,
            reporter,
            batch,
            group: Mutex::new(None),
            queue,
            heartbeat,
            study_session_data: Mutex::new(Value::Object(Map::new())),
            starting_component: AtomicBool::new(false),
            ending: AtomicBool::new(false),
        }
    }

    pub fn run(&self) -> &RunContext {
        &self.run
    }

    /// Opens the batch channel. Failed attempts are retried with backoff
    /// until one succeeds.
    pub async fn open_batch(&self) -> Result<(), SyncError> {
        self.batch.open().await
    }

    pub fn batch(&self) -> &BatchChannel {
        &self.batch
    }

    /// Joins a group. A failed join is not retried.
    ///
    /// A group channel that is still connected (or connecting) is reused and
    /// reports its own error; otherwise a new one is spawned with `callbacks`.
    pub async fn join_group(&self, callbacks: GroupCallbacks) -> Result<GroupChannel, SyncError> {
        let group = {
            let mut slot = lock(&self.group);
            match slot.as_ref() {
                Some(existing) if existing.session().state() != ChannelState::Closed => {
                    existing.clone()
                }
                _ => {
                    if let Some(old) = slot.take() {
                        old.close();
                    }
                    let group = GroupChannel::spawn(
                        &self.run,
                        &self.config,
                        self.transport.clone(),
                        self.runner.clone(),
                        self.reporter.clone(),
                        callbacks,
                    );
                    *slot = Some(group.clone());
                    group
                }
            }
        };
        group.join().await?;
        Ok(group)
    }

    /// The group channel, once [`join_group`](Self::join_group) was called.
    pub fn group(&self) -> Option<GroupChannel> {
        lock(&self.group).clone()
    }

    /// Replaces the current component's result data.
    pub fn submit_result_data(&self, data: impl Into<String>) -> Delivery {
        self.queue
            .submit(HttpRequest::put_text(self.run.result_data_url(), data))
    }

    /// Appends to the current component's result data.
    pub fn append_result_data(&self, data: impl Into<String>) -> Delivery {
        self.queue
            .submit(HttpRequest::post_text(self.run.result_data_url(), data))
    }

    /// Stores the study session data locally and sends it to the coordinator.
    pub fn set_study_session_data(&self, value: Value) -> Delivery {
        let text = value.to_string();
        *lock(&self.study_session_data) = value;
        self.queue
            .submit(HttpRequest::post_text(self.run.study_session_data_url(), text))
    }

    pub fn study_session_data(&self) -> Value {
        lock(&self.study_session_data).clone()
    }

    /// Sends a message to the coordinator's log. The returned delivery may
    /// be dropped; a failure then goes to the global error hook.
    pub fn log(&self, message: impl Into<String>) -> Delivery {
        self.queue
            .submit(HttpRequest::post_text(self.run.log_url(), message))
    }

    pub fn upload_result_file(
        &self,
        filename: &str,
        content: FileContent,
    ) -> Result<Delivery, SyncError> {
        if filename.is_empty() {
            return Err(SyncError::InvalidInput("No filename specified".to_string()));
        }
        let (data, content_type) = match content {
            FileContent::Text(text) => (text.into_bytes(), "text/plain".to_string()),
            FileContent::Json(value) => (
                serde_json::to_vec_pretty(&value)
                    .map_err(|e| SyncError::InvalidInput(e.to_string()))?,
                "application/json".to_string(),
            ),
            FileContent::Bytes { data, content_type } => (data, content_type),
        };
        Ok(self.queue.submit(HttpRequest::post_bytes(
            self.run.upload_file_url(filename),
            data,
            content_type,
        )))
    }

    /// Flushes result data and study session data, waits until the queue is
    /// drained and returns the URL that starts `component_id`.
    pub async fn start_component(
        &self,
        component_id: u64,
        start: ComponentStart,
    ) -> Result<String, SyncError> {
        if self.starting_component.swap(true, Ordering::SeqCst) {
            return Err(SyncError::concurrency(
                "Can start only one component at the same time",
            ));
        }
        let _starting = ClearOnDrop(&self.starting_component);

        if let Some(data) = start.result_data {
            self.append_result_data(data).detach();
        }
        self.set_study_session_data(self.study_session_data())
            .detach();
        self.queue.wait_drained().await;

        tracing::info!(component_id, "Component ready to start");
        Ok(self
            .run
            .start_component_url(component_id, start.message.as_deref()))
    }

    /// Ends the run through the coordinator. Allowed once per run, shared
    /// with [`abort_study`](Self::abort_study).
    pub async fn end_study(&self, end: EndStudy) -> Result<(), SyncError> {
        self.begin_ending()?;
        if let Some(data) = end.result_data {
            self.append_result_data(data).detach();
        }
        let url = self.run.end_url(end.successful, end.message.as_deref());
        self.finish_run(url).await
    }

    /// Aborts the run; the coordinator discards its result data.
    pub async fn abort_study(&self, message: Option<&str>) -> Result<(), SyncError> {
        self.begin_ending()?;
        let url = self.run.abort_url(message);
        self.finish_run(url).await
    }

    /// Like [`end_study`](Self::end_study) but returns the end URL for the
    /// embedder to navigate to, once everything queued has been delivered.
    pub async fn end_study_url(&self, end: EndStudy) -> Result<String, SyncError> {
        self.begin_ending()?;
        if let Some(data) = end.result_data {
            self.append_result_data(data).detach();
        }
        self.queue.wait_drained().await;
        self.heartbeat.stop();
        Ok(self.run.end_url(end.successful, end.message.as_deref()))
    }

    pub async fn abort_study_url(&self, message: Option<&str>) -> Result<String, SyncError> {
        self.begin_ending()?;
        self.queue.wait_drained().await;
        self.heartbeat.stop();
        Ok(self.run.abort_url(message))
    }

    /// Changes the period of the run's liveness request. Ignored once the
    /// run ended.
    pub fn set_heartbeat_period(&self, period: Duration) {
        self.heartbeat.set_period(period);
    }

    /// Number of requests handed to the queue so far.
    pub fn request_count(&self) -> u64 {
        self.queue.submitted()
    }

    /// Resolves once no queued request is pending.
    pub async fn wait_drained(&self) {
        self.queue.wait_drained().await
    }

    fn begin_ending(&self) -> Result<(), SyncError> {
        if self.ending.swap(true, Ordering::SeqCst) {
            return Err(SyncError::concurrency("Can end/abort study only once"));
        }
        Ok(())
    }

    async fn finish_run(&self, url: String) -> Result<(), SyncError> {
        self.queue.submit(HttpRequest::get(url)).await?;
        tracing::info!(study_result_id = self.run.study_result_id, "Study run finished");
        self.heartbeat.stop();
        self.batch.close();
        if let Some(group) = self.group() {
            group.close();
        }
        Ok(())
    }
}

impl std::fmt::Debug for StudyRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudyRun")
            .field("run", &self.run)
            .field("batch", &self.batch)
            .field("queue", &self.queue)
            .finish()
    }
}

/// Clears an in-flight flag when the operation ends, even if its future is
/// dropped early.
struct ClearOnDrop<'a>(&'a AtomicBool);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
