//! Frames emitted by a running agent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which interrupts travel inside `values` and `updates` payloads.
pub const INTERRUPT_KEY: &str = "__interrupt__";

/// Which kinds of frames a run should stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamMode {
    /// Full thread state after each step.
    Values,
    /// Per-node state deltas.
    Updates,
    /// Events written by nodes through the custom stream writer.
    Custom,
    /// Message chunks paired with their metadata.
    MessagesTuple,
    /// Raw execution events.
    Events,
    /// Checkpoint and task debug frames.
    Debug,
}

impl StreamMode {
    /// Modes requested when a session does not choose its own.
    pub const DEFAULTS: [Self; 3] = [Self::Values, Self::Updates, Self::Custom];
}

/// Identifiers announced at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Error reported by the server inside the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFault {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for StreamFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.error.is_empty(), self.message.is_empty()) {
            (false, false) => write!(f, "{}: {}", self.error, self.message),
            (false, true) => f.write_str(&self.error),
            _ => f.write_str(&self.message),
        }
    }
}

/// Payload of a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Metadata(RunMetadata),
    Values(Value),
    Updates(Value),
    Custom(Value),
    Messages(Value),
    Error(StreamFault),
    End,
    /// Event kind this layer does not interpret.
    Other { event: String, data: Value },
}

impl StreamEvent {
    /// Interrupt entries carried by a `values` or `updates` payload.
    #[must_use]
    pub fn interrupts(&self) -> Option<&[Value]> {
        match self {
            Self::Values(v) | Self::Updates(v) => v
                .get(INTERRUPT_KEY)
                .and_then(Value::as_array)
                .map(Vec::as_slice),
            _ => None,
        }
    }
}

/// A frame together with the subgraph namespace that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFrame {
    /// Empty for the root graph.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespace: Vec<String>,
    #[serde(flatten)]
    pub event: StreamEvent,
}

impl StreamFrame {
    /// Frame from the root graph.
    #[must_use]
    pub const fn root(event: StreamEvent) -> Self {
        Self {
            namespace: Vec::new(),
            event,
        }
    }

    /// Decode a frame from an SSE event name and its data line.
    ///
    /// The name is split on `|`: the head is the event kind, the rest the
    /// subgraph namespace. Empty data decodes as `null`.
    ///
    /// # Errors
    /// Returns error if the data is not valid JSON for the event kind.
    pub fn from_sse(name: &str, data: &str) -> Result<Self, serde_json::Error> {
        let mut parts = name.split('|');
        let kind = parts.next().unwrap_or_default();
        let namespace = parts.map(str::to_string).collect();

        let data: Value = if data.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(data)?
        };

        let event = match kind {
            "metadata" => StreamEvent::Metadata(serde_json::from_value(data)?),
            "values" => StreamEvent::Values(data),
            "updates" => StreamEvent::Updates(data),
            "custom" => StreamEvent::Custom(data),
            "error" => StreamEvent::Error(fault_from(data)),
            "end" => StreamEvent::End,
            k if k.starts_with("messages") => StreamEvent::Messages(data),
            other => StreamEvent::Other {
                event: other.to_string(),
                data,
            },
        };

        Ok(Self { namespace, event })
    }

    /// Whether this frame came from the root graph.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.namespace.is_empty()
    }

    /// Approximate size in bytes, for history accounting.
    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        const OVERHEAD: usize = 16;
        let payload = match &self.event {
            StreamEvent::Values(v)
            | StreamEvent::Updates(v)
            | StreamEvent::Custom(v)
            | StreamEvent::Messages(v)
            | StreamEvent::Other { data: v, .. } => v.to_string().len(),
            StreamEvent::Metadata(m) => m.run_id.len(),
            StreamEvent::Error(f) => f.error.len() + f.message.len(),
            StreamEvent::End => 0,
        };
        payload + self.namespace.iter().map(String::len).sum::<usize>() + OVERHEAD
    }
}

fn fault_from(data: Value) -> StreamFault {
    match data {
        Value::String(message) => StreamFault {
            error: String::new(),
            message,
        },
        other => serde_json::from_value(other.clone()).unwrap_or_else(|_| StreamFault {
            error: String::new(),
            message: other.to_string(),
        }),
    }
}
