//! Transport capability used by every session.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{StreamFrame, StreamMode};

/// Lazy sequence of frames for one run.
pub type FrameStream = BoxStream<'static, Result<StreamFrame, TransportError>>;

/// Identifies a run once it has been submitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunTicket {
    pub run_id: String,
    pub thread_id: String,
}

/// Thread state observed when connecting.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThreadSnapshot {
    pub thread_id: String,
    #[serde(default)]
    pub values: Value,
    /// Pending interrupts, as `{ value, id? }` objects.
    #[serde(default)]
    pub interrupts: Vec<Value>,
}

/// Control instruction for an interrupted run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Command {
    /// Value handed back to the node that interrupted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<Value>,
    /// State update applied before resuming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,
    /// Node(s) to continue from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goto: Option<Value>,
}

impl Command {
    /// Resume an interrupted run with `value`.
    #[must_use]
    pub fn resume(value: impl Into<Value>) -> Self {
        Self {
            resume: Some(value.into()),
            ..Self::default()
        }
    }
}

/// Everything a transport needs to start a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
    /// Serialized [`RunConfig`](crate::RunConfig).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    pub stream_modes: Vec<StreamMode>,
    #[serde(default)]
    pub stream_subgraphs: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl SubmitRequest {
    /// Request with default stream modes and nothing else set.
    #[must_use]
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            input: None,
            command: None,
            config: None,
            stream_modes: StreamMode::DEFAULTS.to_vec(),
            stream_subgraphs: false,
            metadata: HashMap::new(),
        }
    }
}

/// Transport error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Thread not found: {0}")]
    NoThread(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Connection strategy for a session.
///
/// Managed sessions get the HTTP implementation by default; custom sessions
/// pass their own.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Attach to `thread_id`, or create a thread when `None`.
    async fn connect(&self, thread_id: Option<&str>) -> Result<ThreadSnapshot, TransportError>;

    /// Start a run.
    async fn submit(&self, request: SubmitRequest) -> Result<RunTicket, TransportError>;

    /// Subscribe to a run's frames. Every call opens a fresh subscription.
    async fn stream(&self, run: &RunTicket) -> Result<FrameStream, TransportError>;

    /// Cancel a run.
    async fn cancel(&self, run: &RunTicket) -> Result<(), TransportError>;
}
