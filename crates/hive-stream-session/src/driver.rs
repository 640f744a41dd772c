//! Session driver shared by managed and custom handles.
//!
//! The driver owns the connection lifecycle of one session: it attaches to a
//! thread, submits runs, consumes their frames in a background task, and
//! exposes the resulting thread state.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use futures::{StreamExt, stream::BoxStream};
use hive_stream_core::{
    Callbacks, Command, CommonOptions, DefaultBag, FrameStore, FrameStream, RunConfig, RunTicket,
    StreamEvent, StreamFrame, StreamTransport, SubmitRequest, ThreadSnapshot, TransportError,
    TypeBag, frame::INTERRUPT_KEY,
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::{sync::watch, task::JoinHandle};
use uuid::Uuid;

use crate::StreamError;

/// Bounds a thread state type must satisfy.
pub trait ThreadValues: DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> ThreadValues for T where T: DeserializeOwned + Clone + Send + Sync + 'static {}

/// Interrupt raised by a run, waiting for caller input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Interrupt<I> {
    pub value: I,
    #[serde(default)]
    pub id: Option<String>,
}

/// Per-submit options.
pub struct SubmitOptions<B: TypeBag = DefaultBag> {
    /// Replaces the session config for this run only.
    pub config: Option<RunConfig<B::Configurable>>,
    /// Resume or redirect an interrupted run.
    pub command: Option<Command>,
    /// Merge-patched onto the current values before the run starts.
    pub optimistic_values: Option<Value>,
    /// Run metadata.
    pub metadata: HashMap<String, Value>,
}

impl<B: TypeBag> Default for SubmitOptions<B> {
    fn default() -> Self {
        Self {
            config: None,
            command: None,
            optimistic_values: None,
            metadata: HashMap::new(),
        }
    }
}

impl<B: TypeBag> SubmitOptions<B> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume an interrupted run with `value`.
    #[must_use]
    pub fn resume(value: impl Into<Value>) -> Self {
        Self {
            command: Some(Command::resume(value)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: RunConfig<B::Configurable>) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn with_optimistic_values(mut self, values: Value) -> Self {
        self.optimistic_values = Some(values);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

struct Snapshot<S, I> {
    thread_id: Option<String>,
    raw: Value,
    values: Option<S>,
    interrupt: Option<Interrupt<I>>,
    error: Option<String>,
    run: Option<RunTicket>,
    /// Bumped by every stop and thread switch; runs started under an older
    /// generation may no longer touch session state.
    generation: u64,
}

impl<S, I> Snapshot<S, I> {
    const fn new(thread_id: Option<String>) -> Self {
        Self {
            thread_id,
            raw: Value::Null,
            values: None,
            interrupt: None,
            error: None,
            run: None,
            generation: 0,
        }
    }

    fn reset_thread_state(&mut self) {
        self.raw = Value::Null;
        self.values = None;
        self.interrupt = None;
        self.error = None;
    }
}

/// Who asked for a thread load, which decides whether its outcome may touch
/// session state.
#[derive(Debug, Clone, Copy)]
enum Load {
    /// An explicit `connect`.
    Foreground,
    /// Started on attach or thread switch; gives way to any run in flight.
    Background,
    /// Issued by a submit of the given generation.
    Run(u64),
}

struct Inner<S, B: TypeBag> {
    id: Uuid,
    transport: Arc<dyn StreamTransport>,
    settings: RwLock<CommonOptions<S, B>>,
    snapshot: RwLock<Snapshot<S, B::Interrupt>>,
    loading: watch::Sender<bool>,
    frames: FrameStore,
    task: Mutex<Option<JoinHandle<()>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Remove the interrupt list from a payload, returning its first entry.
fn take_interrupt(payload: &mut Value) -> Option<Value> {
    match payload.as_object_mut()?.remove(INTERRUPT_KEY)? {
        Value::Array(entries) => entries.into_iter().next(),
        Value::Null => None,
        single => Some(single),
    }
}

impl<S: ThreadValues, B: TypeBag> Inner<S, B> {
    fn callbacks(&self) -> Callbacks<S, B> {
        read(&self.settings).callbacks.clone()
    }

    fn decode_values(&self, raw: &Value) -> Option<S> {
        if raw.is_null() {
            return None;
        }
        match serde_json::from_value(raw.clone()) {
            Ok(values) => Some(values),
            Err(e) => {
                tracing::warn!(session = %self.id, "thread values do not match state type: {e}");
                None
            }
        }
    }

    fn decode_interrupt(&self, raw: Value) -> Option<Interrupt<B::Interrupt>> {
        let entry = serde_json::from_value::<Interrupt<B::Interrupt>>(raw.clone());
        match entry.or_else(|_| {
            serde_json::from_value(raw).map(|value| Interrupt { value, id: None })
        }) {
            Ok(interrupt) => Some(interrupt),
            Err(e) => {
                tracing::warn!(session = %self.id, "interrupt does not match interrupt type: {e}");
                None
            }
        }
    }

    /// Claim the loading flag; false if a run already holds it.
    fn try_begin(&self) -> bool {
        self.loading.send_if_modified(|loading| {
            if *loading {
                false
            } else {
                *loading = true;
                true
            }
        })
    }

    fn settle(&self) {
        self.loading.send_replace(false);
    }

    /// Claim the loading flag for a new run, returning its generation.
    fn begin(&self) -> Option<u64> {
        let snap = write(&self.snapshot);
        self.try_begin().then_some(snap.generation)
    }

    fn generation(&self) -> u64 {
        read(&self.snapshot).generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Release the loading flag held by `generation`. A superseded run leaves
    /// it alone; it may already belong to a newer run.
    fn release(&self, generation: u64) {
        let snap = write(&self.snapshot);
        if snap.generation == generation {
            self.loading.send_replace(false);
        }
    }

    /// Record `run` as the session's run unless a stop or thread switch has
    /// superseded `generation`.
    fn claim_run(&self, generation: u64, run: &RunTicket) -> bool {
        let mut snap = write(&self.snapshot);
        if snap.generation != generation {
            return false;
        }
        snap.run = Some(run.clone());
        true
    }

    /// Whether a failed load of `requested` may still report its error.
    fn owns_load(&self, requested: Option<&str>, load: Load) -> bool {
        let snap = read(&self.snapshot);
        if snap.thread_id.as_deref() != requested {
            return false;
        }
        match load {
            Load::Foreground => true,
            Load::Background => snap.run.is_none() && !*self.loading.borrow(),
            Load::Run(generation) => snap.generation == generation,
        }
    }

    /// Take over a loaded thread. Returns false when the session moved to
    /// another thread while `requested` was loading.
    fn adopt(&self, requested: Option<&str>, load: Load, snapshot: ThreadSnapshot) -> bool {
        let ThreadSnapshot {
            thread_id,
            values,
            interrupts,
        } = snapshot;
        let decoded = self.decode_values(&values);
        let interrupt = interrupts
            .into_iter()
            .next()
            .and_then(|raw| self.decode_interrupt(raw));

        let mut snap = write(&self.snapshot);
        if snap.thread_id.as_deref() != requested {
            return false;
        }
        snap.thread_id = Some(thread_id);
        let busy = snap.run.is_some()
            || (matches!(load, Load::Background) && *self.loading.borrow());
        if !busy {
            snap.raw = values;
            snap.values = decoded;
            snap.interrupt = interrupt;
        }
        true
    }

    fn set_values(&self, mut values: Value) {
        let interrupt = take_interrupt(&mut values).and_then(|raw| self.decode_interrupt(raw));
        let decoded = self.decode_values(&values);

        let mut snap = write(&self.snapshot);
        snap.raw = values;
        snap.values = decoded;
        if interrupt.is_some() {
            snap.interrupt = interrupt;
        }
    }

    fn merge_values(&self, patch: &Value) {
        let mut raw = read(&self.snapshot).raw.clone();
        if raw.is_null() {
            raw = Value::Object(serde_json::Map::new());
        }
        json_patch::merge(&mut raw, patch);
        self.set_values(raw);
    }

    fn fail(&self, message: String) {
        tracing::error!(session = %self.id, "run failed: {message}");
        write(&self.snapshot).error = Some(message.clone());
        if let Some(on_error) = self.callbacks().on_error {
            on_error(&message);
        }
    }

    fn fail_at(&self, generation: u64, message: String) {
        if self.is_current(generation) {
            self.fail(message);
        } else {
            tracing::debug!(session = %self.id, "ignoring failure of superseded run: {message}");
        }
    }

    /// Apply one frame. Returns true when the run has ended.
    fn apply(&self, frame: StreamFrame) -> bool {
        let root = frame.is_root();
        match frame.event {
            StreamEvent::Metadata(metadata) => {
                if let Some(on_metadata) = self.callbacks().on_metadata_event {
                    on_metadata(&metadata);
                }
            }
            StreamEvent::Values(values) if root => self.set_values(values),
            StreamEvent::Updates(mut update) => {
                if root {
                    if let Some(interrupt) =
                        take_interrupt(&mut update).and_then(|raw| self.decode_interrupt(raw))
                    {
                        write(&self.snapshot).interrupt = Some(interrupt);
                    }
                }
                if let Some(on_update) = self.callbacks().on_update_event {
                    on_update(&update);
                }
            }
            StreamEvent::Custom(data) => match serde_json::from_value::<B::CustomEvent>(data) {
                Ok(event) => {
                    if let Some(on_custom) = self.callbacks().on_custom_event {
                        on_custom(&event);
                    }
                }
                Err(e) => {
                    tracing::warn!(session = %self.id, "custom event does not match event type: {e}");
                }
            },
            StreamEvent::Error(fault) => self.fail(fault.to_string()),
            StreamEvent::End => return true,
            StreamEvent::Values(_) | StreamEvent::Messages(_) | StreamEvent::Other { .. } => {}
        }
        false
    }

    fn finish(&self, generation: u64) {
        let (values, failed) = {
            let mut snap = write(&self.snapshot);
            if snap.generation != generation {
                return;
            }
            snap.run = None;
            (snap.values.clone(), snap.error.is_some())
        };
        tracing::debug!(session = %self.id, failed, "run finished");

        if !failed {
            if let (Some(values), Some(on_finish)) = (values, self.callbacks().on_finish) {
                on_finish(&values);
            }
        }
        self.release(generation);
    }

    async fn consume(self: Arc<Self>, generation: u64, mut frames: FrameStream) {
        while let Some(next) = frames.next().await {
            if !self.is_current(generation) {
                tracing::debug!(session = %self.id, "dropping frames of superseded run");
                return;
            }
            match next {
                Ok(frame) => {
                    self.frames.push(frame.clone());
                    if self.apply(frame) {
                        break;
                    }
                }
                Err(TransportError::Decode(e)) => {
                    tracing::warn!(session = %self.id, "skipping frame: {e}");
                }
                Err(e) => {
                    self.fail(e.to_string());
                    break;
                }
            }
        }
        self.finish(generation);
    }
}

/// Engine behind every session handle.
///
/// Cheap to clone; clones share state.
pub struct SessionDriver<S, B: TypeBag> {
    inner: Arc<Inner<S, B>>,
}

impl<S, B: TypeBag> Clone for SessionDriver<S, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ThreadValues, B: TypeBag> SessionDriver<S, B> {
    pub(crate) fn new(transport: Arc<dyn StreamTransport>, options: CommonOptions<S, B>) -> Self {
        let (loading, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                transport,
                snapshot: RwLock::new(Snapshot::new(options.thread_id.clone())),
                settings: RwLock::new(options),
                loading,
                frames: FrameStore::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// Begin the connection lifecycle: load an existing thread in the
    /// background when one is named and a runtime is available.
    pub(crate) fn start(&self) {
        if self.thread_id().is_some() {
            self.spawn_connect();
        }
    }

    /// Honor re-supplied options on a live session.
    pub(crate) fn refresh(&self, options: CommonOptions<S, B>) {
        let next_thread = options.thread_id.clone();
        *write(&self.inner.settings) = options;

        let Some(next_thread) = next_thread else {
            return;
        };
        let abandoned = {
            let mut snap = write(&self.inner.snapshot);
            if snap.thread_id.as_deref() == Some(next_thread.as_str()) {
                return;
            }
            tracing::debug!(session = %self.inner.id, thread_id = %next_thread, "switching thread");
            snap.thread_id = Some(next_thread);
            snap.generation += 1;
            snap.reset_thread_state();
            snap.run.take()
        };

        self.abort_task();
        self.inner.settle();
        self.inner.frames.clear();
        if let Some(run) = abandoned {
            self.spawn_cancel(run);
        }
        self.spawn_connect();
    }

    fn spawn_connect(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(session = %self.inner.id, "no runtime; thread loads on first submit");
            return;
        };
        let driver = self.clone();
        let requested = self.thread_id();
        runtime.spawn(async move {
            if let Err(e) = driver.load(requested, Load::Background).await {
                tracing::warn!(session = %driver.inner.id, "thread load failed: {e}");
            }
        });
    }

    fn spawn_cancel(&self, run: RunTicket) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let transport = Arc::clone(&self.inner.transport);
        runtime.spawn(async move {
            if let Err(e) = transport.cancel(&run).await {
                tracing::warn!(run_id = %run.run_id, "cancel failed: {e}");
            }
        });
    }

    fn abort_task(&self) {
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }

    /// Start consuming `frames` for `run`. Returns false, without consuming,
    /// when `generation` was superseded before the run could be claimed.
    fn spawn_consumer(&self, generation: u64, run: &RunTicket, frames: FrameStream) -> bool {
        if !self.inner.claim_run(generation, run) {
            return false;
        }
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(inner.consume(generation, frames));
        let mut slot = self.inner.task.lock().unwrap_or_else(PoisonError::into_inner);
        // A stop or thread switch may have landed since the claim.
        if self.inner.is_current(generation) {
            *slot = Some(task);
        } else {
            task.abort();
        }
        true
    }

    /// Session identifier used in logs.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.inner.id
    }

    /// Whether a run is currently streaming.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        *self.inner.loading.borrow()
    }

    /// Current thread values, decoded as the state type.
    #[must_use]
    pub fn values(&self) -> Option<S> {
        read(&self.inner.snapshot).values.clone()
    }

    /// Current thread values as received.
    #[must_use]
    pub fn raw_values(&self) -> Value {
        read(&self.inner.snapshot).raw.clone()
    }

    /// Pending interrupt, if the run paused for input.
    #[must_use]
    pub fn interrupt(&self) -> Option<Interrupt<B::Interrupt>> {
        read(&self.inner.snapshot).interrupt.clone()
    }

    /// Last error reported for the session.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        read(&self.inner.snapshot).error.clone()
    }

    #[must_use]
    pub fn thread_id(&self) -> Option<String> {
        read(&self.inner.snapshot).thread_id.clone()
    }

    /// The run currently streaming, if any.
    #[must_use]
    pub fn run(&self) -> Option<RunTicket> {
        read(&self.inner.snapshot).run.clone()
    }

    /// Frames of the current run so far, then live frames.
    #[must_use]
    pub fn subscribe(&self) -> BoxStream<'static, StreamFrame> {
        self.inner.frames.replay()
    }

    /// Frames of the current run so far.
    #[must_use]
    pub fn history(&self) -> Vec<StreamFrame> {
        self.inner.frames.history()
    }

    /// Attach to the session's thread, creating one when none is set.
    ///
    /// # Errors
    /// Returns error if the transport fails to connect.
    pub async fn connect(&self) -> Result<String, StreamError> {
        self.load(self.thread_id(), Load::Foreground).await
    }

    async fn load(&self, current: Option<String>, load: Load) -> Result<String, StreamError> {
        let snapshot = match self.inner.transport.connect(current.as_deref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if self.inner.owns_load(current.as_deref(), load) {
                    self.inner.fail(e.to_string());
                } else {
                    tracing::debug!(session = %self.inner.id, ?load, "ignoring failed thread load: {e}");
                }
                return Err(e.into());
            }
        };

        let thread_id = snapshot.thread_id.clone();
        if !self.inner.adopt(current.as_deref(), load, snapshot) {
            tracing::debug!(session = %self.inner.id, thread_id = %thread_id, "discarding stale thread load");
            return Ok(thread_id);
        }
        if current.as_deref() != Some(thread_id.as_str()) {
            tracing::debug!(session = %self.inner.id, thread_id = %thread_id, "thread assigned");
            if let Some(on_thread_id) = self.inner.callbacks().on_thread_id {
                on_thread_id(&thread_id);
            }
        }
        Ok(thread_id)
    }

    /// Submit `update` and start streaming the resulting run.
    ///
    /// Returns once the run has started; frames are consumed in the
    /// background. Use [`wait`](Self::wait) to await completion.
    ///
    /// # Errors
    /// Returns [`StreamError::Busy`] while another run is streaming, or the
    /// transport/serialization error that prevented the run from starting.
    /// Returns [`StreamError::Superseded`] when a stop or thread switch lands
    /// before the run starts; a run already created remotely is cancelled.
    pub async fn submit(
        &self,
        update: Option<B::Update>,
        options: SubmitOptions<B>,
    ) -> Result<RunTicket, StreamError> {
        let Some(generation) = self.inner.begin() else {
            return Err(StreamError::Busy);
        };
        self.inner.frames.clear();
        {
            let mut snap = write(&self.inner.snapshot);
            if snap.generation == generation {
                snap.error = None;
                snap.interrupt = None;
            }
        }

        match self.start_run(generation, update, options).await {
            Ok(run) => Ok(run),
            Err(e) => {
                if let StreamError::Serialize(ref err) = e {
                    self.inner.fail_at(generation, err.to_string());
                }
                self.inner.release(generation);
                Err(e)
            }
        }
    }

    async fn start_run(
        &self,
        generation: u64,
        update: Option<B::Update>,
        options: SubmitOptions<B>,
    ) -> Result<RunTicket, StreamError> {
        let thread_id = match self.thread_id() {
            Some(id) => id,
            None => self.load(None, Load::Run(generation)).await?,
        };
        if !self.inner.is_current(generation) {
            return Err(StreamError::Superseded);
        }

        if let Some(patch) = &options.optimistic_values {
            self.inner.merge_values(patch);
        }

        let (session_config, stream_modes, stream_subgraphs) = {
            let settings = read(&self.inner.settings);
            (
                settings.config.clone(),
                settings.stream_modes.clone(),
                settings.stream_subgraphs,
            )
        };
        let config = options
            .config
            .or(session_config)
            .map(|c| serde_json::to_value(&c))
            .transpose()?;
        let input = update.map(|u| serde_json::to_value(&u)).transpose()?;

        let request = SubmitRequest {
            thread_id,
            input,
            command: options.command,
            config,
            stream_modes,
            stream_subgraphs,
            metadata: options.metadata,
        };

        let transport = &self.inner.transport;
        let run = transport
            .submit(request)
            .await
            .inspect_err(|e| self.inner.fail_at(generation, e.to_string()))?;
        if !self.inner.is_current(generation) {
            return Err(self.abandon(run).await);
        }
        let frames = match transport.stream(&run).await {
            Ok(frames) => frames,
            Err(e) if self.inner.is_current(generation) => {
                self.inner.fail(e.to_string());
                return Err(e.into());
            }
            Err(_) => return Err(self.abandon(run).await),
        };

        if !self.spawn_consumer(generation, &run, frames) {
            return Err(self.abandon(run).await);
        }
        tracing::debug!(session = %self.inner.id, run_id = %run.run_id, "run started");
        Ok(run)
    }

    /// Cancel a run that started after its submit was superseded.
    async fn abandon(&self, run: RunTicket) -> StreamError {
        tracing::debug!(session = %self.inner.id, run_id = %run.run_id, "cancelling superseded run");
        if let Err(e) = self.inner.transport.cancel(&run).await {
            tracing::warn!(run_id = %run.run_id, "cancel failed: {e}");
        }
        StreamError::Superseded
    }

    /// Rejoin a run that is already executing on the session's thread.
    pub(crate) async fn join(&self, run: RunTicket) -> Result<(), StreamError> {
        let Some(generation) = self.inner.begin() else {
            return Err(StreamError::Busy);
        };
        self.inner.frames.clear();
        match self.inner.transport.stream(&run).await {
            Ok(frames) => {
                {
                    let mut snap = write(&self.inner.snapshot);
                    if snap.generation == generation {
                        snap.error = None;
                    }
                }
                if !self.spawn_consumer(generation, &run, frames) {
                    return Err(StreamError::Superseded);
                }
                tracing::debug!(session = %self.inner.id, run_id = %run.run_id, "joined run");
                Ok(())
            }
            Err(e) => {
                self.inner.fail_at(generation, e.to_string());
                self.inner.release(generation);
                Err(e.into())
            }
        }
    }

    /// Stop the current run: stop consuming frames and cancel it remotely.
    ///
    /// # Errors
    /// Returns error if the transport fails to cancel the run.
    pub async fn stop(&self) -> Result<(), StreamError> {
        let run = {
            let mut snap = write(&self.inner.snapshot);
            snap.generation += 1;
            snap.run.take()
        };
        self.abort_task();
        let was_loading = self.inner.loading.send_replace(false);

        if was_loading || run.is_some() {
            tracing::debug!(session = %self.inner.id, "run stopped");
            if let Some(on_stop) = self.inner.callbacks().on_stop {
                on_stop();
            }
        }
        if let Some(run) = run {
            self.inner.transport.cancel(&run).await?;
        }
        Ok(())
    }

    /// Wait until no run is streaming.
    pub async fn wait(&self) {
        let mut rx = self.inner.loading.subscribe();
        let _ = rx.wait_for(|loading| !*loading).await;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_take_interrupt_first_entry() {
        let mut payload = json!({
            "count": 1,
            "__interrupt__": [{"value": "a"}, {"value": "b"}]
        });
        assert_eq!(take_interrupt(&mut payload), Some(json!({"value": "a"})));
        assert_eq!(payload, json!({"count": 1}));
    }

    #[test]
    fn test_take_interrupt_absent_or_empty() {
        assert_eq!(take_interrupt(&mut json!({"count": 1})), None);
        assert_eq!(take_interrupt(&mut json!({"__interrupt__": []})), None);
        assert_eq!(take_interrupt(&mut json!("not an object")), None);
    }

    #[test]
    fn test_submit_options_resume() {
        let options: SubmitOptions = SubmitOptions::resume("yes").with_metadata("k", json!(1));
        assert_eq!(options.command, Some(Command::resume("yes")));
        assert_eq!(options.metadata.get("k"), Some(&json!(1)));
    }
}
