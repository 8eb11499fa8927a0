//! Wire protocol between the server and WebSocket clients.
//!
//! Every server frame is a JSON object `{"event": <kind>, "data": {...}}`
//! whose `data` carries an RFC 3339 `timestamp`. Frames either forward a
//! run's [`AgentEvent`] or answer a client request ([`Reply`]).
//!
//! Client frames are discriminated on `type`:
//!
//! ```json
//! {"type": "run_agent", "instruction": "Summarize README.md", "max_steps": 5}
//! {"type": "user_input", "input": "y"}
//! {"type": "stop_agent"}
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use stepwire::SessionId;
use stepwire::config::{DEFAULT_MAX_STEPS, RunConfig};
use stepwire::events::AgentEvent;
use stepwire::session::{FileInfo, SessionStatus};

/// Maximum tool result size forwarded in a `tool_call` frame (8 KB).
/// Larger results are cut at a character boundary and annotated.
pub const MAX_WS_TOOL_RESULT_BYTES: usize = 8 * 1024;

// ── Client → server ────────────────────────────────────────────────

/// A request sent by a WebSocket client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Launch a run on this connection's session.
    RunAgent {
        #[serde(default)]
        instruction: String,
        #[serde(default = "default_max_steps")]
        max_steps: u32,
        #[serde(default)]
        auto_continue: u32,
    },
    /// Answer a `waiting_for_input` prompt.
    UserInput {
        #[serde(default)]
        input: String,
    },
    StopAgent,
    GetStatus,
    GetFiles,
    RefreshFiles,
}

fn default_max_steps() -> u32 {
    DEFAULT_MAX_STEPS
}

impl ClientMessage {
    /// The run configuration carried by a `run_agent` request.
    pub fn run_config(&self) -> Option<RunConfig> {
        match self {
            Self::RunAgent {
                instruction,
                max_steps,
                auto_continue,
            } => Some(
                RunConfig::new(instruction.clone())
                    .with_max_steps(*max_steps)
                    .with_auto_continue(*auto_continue),
            ),
            _ => None,
        }
    }
}

// ── Server → client ────────────────────────────────────────────────

/// Body of a `status` reply.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReply {
    pub session_id: SessionId,
    pub is_running: bool,
    pub status: SessionStatus,
    pub step_count: u32,
    /// Configuration of the current or last run.
    pub config: Option<RunConfig>,
    pub run_id: u64,
    pub last_error: Option<String>,
    pub connected_at: String,
    pub agent_version: String,
    pub api_provider: String,
    pub output_dir: Option<String>,
}

/// A direct answer to a client request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Reply {
    Status(StatusReply),
    FilesList {
        session_id: SessionId,
        files: Vec<FileInfo>,
        count: usize,
    },
    FilesRefreshed {
        session_id: SessionId,
        new_files: Vec<FileInfo>,
        count: usize,
    },
    UserInputSent {
        input: String,
    },
    AgentStopRequested {
        success: bool,
    },
    Error {
        message: String,
    },
}

impl Reply {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// One outbound frame, queued per connection.
#[derive(Debug, Clone)]
pub enum WsMessage {
    Event(AgentEvent),
    Reply(Reply),
}

impl WsMessage {
    /// The JSON frame sent to the client, timestamped at call time.
    pub fn to_frame(&self) -> serde_json::Value {
        let mut frame = match self {
            Self::Event(AgentEvent::ToolCall {
                step,
                function_name,
                function_args,
                result,
            }) if result.len() > MAX_WS_TOOL_RESULT_BYTES => {
                serde_json::to_value(AgentEvent::ToolCall {
                    step: *step,
                    function_name: function_name.clone(),
                    function_args: function_args.clone(),
                    result: truncate_result(result),
                })
            }
            Self::Event(event) => serde_json::to_value(event),
            Self::Reply(reply) => serde_json::to_value(reply),
        }
        .unwrap_or_default();

        stamp(&mut frame);
        frame
    }

    /// The frame's `event` name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Event(event) => event.kind().as_str(),
            Self::Reply(reply) => match reply {
                Reply::Status(_) => "status",
                Reply::FilesList { .. } => "files_list",
                Reply::FilesRefreshed { .. } => "files_refreshed",
                Reply::UserInputSent { .. } => "user_input_sent",
                Reply::AgentStopRequested { .. } => "agent_stop_requested",
                Reply::Error { .. } => "error",
            },
        }
    }
}

impl From<Reply> for WsMessage {
    fn from(reply: Reply) -> Self {
        Self::Reply(reply)
    }
}

/// Add `data.timestamp`, creating `data` when the frame has none.
fn stamp(frame: &mut serde_json::Value) {
    let Some(obj) = frame.as_object_mut() else {
        return;
    };
    let data = obj
        .entry("data")
        .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    if let Some(data) = data.as_object_mut() {
        data.insert(
            "timestamp".to_string(),
            serde_json::Value::String(Utc::now().to_rfc3339()),
        );
    }
}

fn truncate_result(result: &str) -> String {
    let mut cut = MAX_WS_TOOL_RESULT_BYTES;
    while !result.is_char_boundary(cut) {
        cut -= 1;
    }
    let head = result.get(..cut).unwrap_or_default();
    format!(
        "{head}\n... (truncated, {} bytes total)",
        result.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwire::events::CompletionReason;

    #[test]
    fn run_agent_defaults() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"run_agent","instruction":"hi"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::RunAgent {
                instruction: "hi".into(),
                max_steps: 10,
                auto_continue: 0,
            }
        );
        let config = msg.run_config().unwrap();
        assert_eq!(config.max_steps, 10);
    }

    #[test]
    fn missing_fields_deserialize_empty() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"user_input"}"#).unwrap();
        assert_eq!(msg, ClientMessage::UserInput { input: String::new() });

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"run_agent"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::RunAgent { ref instruction, .. } if instruction.is_empty()));
    }

    #[test]
    fn unit_requests_deserialize() {
        for (json, expected) in [
            (r#"{"type":"stop_agent"}"#, ClientMessage::StopAgent),
            (r#"{"type":"get_status"}"#, ClientMessage::GetStatus),
            (r#"{"type":"get_files"}"#, ClientMessage::GetFiles),
            (r#"{"type":"refresh_files"}"#, ClientMessage::RefreshFiles),
        ] {
            assert_eq!(serde_json::from_str::<ClientMessage>(json).unwrap(), expected);
        }
    }

    #[test]
    fn event_frame_has_event_data_and_timestamp() {
        let frame = WsMessage::Event(AgentEvent::TaskCompleted {
            message: "done".into(),
            reason: CompletionReason::TaskDone,
        })
        .to_frame();
        assert_eq!(frame["event"], "task_completed");
        assert_eq!(frame["data"]["reason"], "task_done");
        assert!(frame["data"]["timestamp"].is_string());
    }

    #[test]
    fn reply_frame_shape() {
        let msg = WsMessage::from(Reply::error("Agent is not running"));
        assert_eq!(msg.event_name(), "error");
        let frame = msg.to_frame();
        assert_eq!(frame["event"], "error");
        assert_eq!(frame["data"]["message"], "Agent is not running");
        assert!(frame["data"]["timestamp"].is_string());
    }

    #[test]
    fn large_tool_results_are_truncated() {
        let result = "é".repeat(MAX_WS_TOOL_RESULT_BYTES);
        let frame = WsMessage::Event(AgentEvent::ToolCall {
            step: 1,
            function_name: "read_file".into(),
            function_args: serde_json::json!({}),
            result: result.clone(),
        })
        .to_frame();
        let sent = frame["data"]["result"].as_str().unwrap();
        assert!(sent.len() < result.len());
        assert!(sent.ends_with(&format!("({} bytes total)", result.len())));
    }
}
