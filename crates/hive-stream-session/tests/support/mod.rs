//! Scripted transport shared by the session tests.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use hive_stream_core::{
    FrameStream, RunMetadata, RunTicket, StreamEvent, StreamFrame, StreamTransport, SubmitRequest,
    ThreadSnapshot, TransportError,
};
use serde_json::Value;
use tokio::sync::Notify;

/// Transport that records every call and replays one frame script per run.
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<VecDeque<Vec<StreamFrame>>>,
    /// Keep the frame stream open after its script is exhausted.
    pub hold: bool,
    /// Values reported for any thread on connect.
    pub thread_values: Value,
    pub fail_submit: bool,
    pub fail_connect: bool,
    /// Held by `submit` after recording the request, until notified.
    pub submit_gate: Option<Arc<Notify>>,
    /// Held by `connect` after recording the call, until notified.
    pub connect_gate: Option<Arc<Notify>>,
    pub connects: Mutex<Vec<Option<String>>>,
    pub submits: Mutex<Vec<SubmitRequest>>,
    pub cancels: Mutex<Vec<RunTicket>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holding() -> Self {
        Self {
            hold: true,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_submit: true,
            ..Self::default()
        }
    }

    pub fn with_thread_values(mut self, values: Value) -> Self {
        self.thread_values = values;
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn gate_submit(mut self, gate: Arc<Notify>) -> Self {
        self.submit_gate = Some(gate);
        self
    }

    pub fn gate_connect(mut self, gate: Arc<Notify>) -> Self {
        self.connect_gate = Some(gate);
        self
    }

    /// Queue the frames of the next run.
    pub fn script(self, frames: Vec<StreamFrame>) -> Self {
        self.scripts.lock().unwrap().push_back(frames);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn connects(&self) -> Vec<Option<String>> {
        self.connects.lock().unwrap().clone()
    }

    pub fn submits(&self) -> Vec<SubmitRequest> {
        self.submits.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> Vec<RunTicket> {
        self.cancels.lock().unwrap().clone()
    }

    pub fn untouched(&self) -> bool {
        self.connects().is_empty() && self.submits().is_empty() && self.cancels().is_empty()
    }
}

#[async_trait]
impl StreamTransport for MockTransport {
    async fn connect(&self, thread_id: Option<&str>) -> Result<ThreadSnapshot, TransportError> {
        self.connects
            .lock()
            .unwrap()
            .push(thread_id.map(str::to_string));
        if let Some(gate) = &self.connect_gate {
            gate.notified().await;
        }
        if self.fail_connect {
            return Err(TransportError::Http {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(ThreadSnapshot {
            thread_id: thread_id.unwrap_or("thread-new").to_string(),
            values: self.thread_values.clone(),
            interrupts: Vec::new(),
        })
    }

    async fn submit(&self, request: SubmitRequest) -> Result<RunTicket, TransportError> {
        if self.fail_submit {
            return Err(TransportError::Http {
                status: 500,
                body: "boom".into(),
            });
        }
        let ticket = {
            let mut submits = self.submits.lock().unwrap();
            let ticket = RunTicket {
                run_id: format!("run-{}", submits.len() + 1),
                thread_id: request.thread_id.clone(),
            };
            submits.push(request);
            ticket
        };
        if let Some(gate) = &self.submit_gate {
            gate.notified().await;
        }
        Ok(ticket)
    }

    async fn stream(&self, _run: &RunTicket) -> Result<FrameStream, TransportError> {
        let frames = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        let scripted = stream::iter(frames.into_iter().map(Ok));
        if self.hold {
            Ok(scripted.chain(stream::pending()).boxed())
        } else {
            Ok(scripted.boxed())
        }
    }

    async fn cancel(&self, run: &RunTicket) -> Result<(), TransportError> {
        self.cancels.lock().unwrap().push(run.clone());
        Ok(())
    }
}

pub fn metadata(run_id: &str) -> StreamFrame {
    StreamFrame::root(StreamEvent::Metadata(RunMetadata {
        run_id: run_id.into(),
        thread_id: None,
    }))
}

pub fn values(data: Value) -> StreamFrame {
    StreamFrame::root(StreamEvent::Values(data))
}

pub fn updates(data: Value) -> StreamFrame {
    StreamFrame::root(StreamEvent::Updates(data))
}

pub fn custom(data: Value) -> StreamFrame {
    StreamFrame::root(StreamEvent::Custom(data))
}

pub fn end() -> StreamFrame {
    StreamFrame::root(StreamEvent::End)
}

/// Collects callback payloads.
pub struct Recorder<T>(Arc<Mutex<Vec<T>>>);

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Clone> Recorder<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn push(&self, value: T) {
        self.0.lock().unwrap().push(value);
    }

    pub fn take(&self) -> Vec<T> {
        self.0.lock().unwrap().clone()
    }
}

/// Yield to spawned tasks until `done` holds.
pub async fn settle_until(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    assert!(done(), "condition not reached");
}
