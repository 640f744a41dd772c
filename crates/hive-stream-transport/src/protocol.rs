//! Request and response bodies exchanged with the agent server.

use std::collections::HashMap;

use hive_stream_core::{Command, StreamMode, SubmitRequest, ThreadSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /threads/{thread_id}/runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRunBody {
    pub assistant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    pub stream_mode: Vec<StreamMode>,
    #[serde(default)]
    pub stream_subgraphs: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl CreateRunBody {
    /// Body for starting `request` on `assistant_id`.
    #[must_use]
    pub fn new(assistant_id: &str, request: SubmitRequest) -> Self {
        let SubmitRequest {
            input,
            command,
            config,
            stream_modes,
            stream_subgraphs,
            metadata,
            ..
        } = request;
        Self {
            assistant_id: assistant_id.to_string(),
            input,
            command,
            config,
            stream_mode: stream_modes,
            stream_subgraphs,
            metadata,
        }
    }
}

/// Run as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResponse {
    pub run_id: String,
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Thread as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub thread_id: String,
}

/// Pending task inside a thread state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskState {
    #[serde(default)]
    pub interrupts: Vec<Value>,
}

/// Body of `GET /threads/{thread_id}/state`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThreadStateResponse {
    #[serde(default)]
    pub values: Value,
    #[serde(default)]
    pub tasks: Vec<TaskState>,
}

impl ThreadStateResponse {
    /// Flatten into a snapshot for `thread_id`.
    #[must_use]
    pub fn into_snapshot(self, thread_id: &str) -> ThreadSnapshot {
        ThreadSnapshot {
            thread_id: thread_id.to_string(),
            values: self.values,
            interrupts: self.tasks.into_iter().flat_map(|t| t.interrupts).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_create_run_body_wire_shape() {
        let mut request = SubmitRequest::new("t1");
        request.input = Some(json!({"messages": ["hi"]}));
        request.stream_subgraphs = true;

        let body = CreateRunBody::new("agent", request);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "assistant_id": "agent",
                "input": {"messages": ["hi"]},
                "stream_mode": ["values", "updates", "custom"],
                "stream_subgraphs": true
            })
        );
    }

    #[test]
    fn test_resume_command_on_wire() {
        let mut request = SubmitRequest::new("t1");
        request.command = Some(Command::resume("yes"));

        let body = serde_json::to_value(CreateRunBody::new("agent", request)).unwrap();
        assert_eq!(body["command"], json!({"resume": "yes"}));
        assert!(body.get("input").is_none());
    }

    #[test]
    fn test_state_collects_task_interrupts() {
        let state: ThreadStateResponse = serde_json::from_value(json!({
            "values": {"count": 2},
            "next": ["review"],
            "tasks": [
                {"id": "a", "interrupts": [{"value": "approve?", "id": "i1"}]},
                {"id": "b"}
            ]
        }))
        .unwrap();

        let snapshot = state.into_snapshot("t1");
        assert_eq!(snapshot.thread_id, "t1");
        assert_eq!(snapshot.values, json!({"count": 2}));
        assert_eq!(snapshot.interrupts, vec![json!({"value": "approve?", "id": "i1"})]);
    }
}
