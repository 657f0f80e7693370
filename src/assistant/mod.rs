//! Remote assistant service: wire shapes of the assistants/threads/runs/files
//! endpoints and the [`AssistantApi`] seam the orchestrator talks through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SessionResult;

pub mod openai;
#[cfg(test)]
pub mod fake;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct List<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantTool {
    Retrieval,
    CodeInterpreter,
    Function { function: FunctionDefinition },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub model: String,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub tools: Vec<AssistantTool>,
    #[serde(default)]
    pub file_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateAssistant {
    pub name: String,
    pub model: String,
}

/// Partial update; absent fields are left untouched remotely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AssistantUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<AssistantTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn counterpart(&self) -> Role {
        match self {
            Role::User => Role::Assistant,
            Role::Assistant => Role::User,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextContent {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub created_at: i64,
    #[serde(default)]
    pub thread_id: String,
    pub role: Role,
    #[serde(default)]
    pub content: Vec<MessageContent>,
    #[serde(default)]
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub assistant_id: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
}

impl ThreadMessage {
    /// Text of the first content block, empty when the message has none.
    pub fn first_text(&self) -> &str {
        match self.content.first() {
            Some(MessageContent::Text { text }) => &text.value,
            _ => "",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub file_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Statuses after which the run will never reach `completed`.
    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::Cancelled | RunStatus::Failed | RunStatus::Expired)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitToolOutputs {
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequiredAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub assistant_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

impl Run {
    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        self.required_action
            .as_ref()
            .map(|a| a.submit_tool_outputs.tool_calls.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateRun {
    pub assistant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<AssistantTool>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStep {
    pub id: String,
    pub run_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    #[serde(default)]
    pub step_details: Value,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileObject {
    pub id: String,
    pub bytes: u64,
    #[serde(default)]
    pub created_at: i64,
    pub filename: String,
    pub purpose: String,
}

#[async_trait]
pub trait AssistantApi: Send + Sync {
    async fn list_assistants(&self) -> SessionResult<Vec<Assistant>>;
    async fn retrieve_assistant(&self, assistant_id: &str) -> SessionResult<Assistant>;
    async fn create_assistant(&self, req: CreateAssistant) -> SessionResult<Assistant>;
    async fn update_assistant(&self, assistant_id: &str, update: AssistantUpdate) -> SessionResult<Assistant>;

    async fn create_thread(&self) -> SessionResult<Thread>;
    async fn create_message(&self, thread_id: &str, msg: NewMessage) -> SessionResult<ThreadMessage>;
    async fn list_messages(&self, thread_id: &str) -> SessionResult<Vec<ThreadMessage>>;

    async fn create_run(&self, thread_id: &str, req: CreateRun) -> SessionResult<Run>;
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> SessionResult<Run>;
    async fn submit_tool_outputs(&self, thread_id: &str, run_id: &str, outputs: Vec<ToolOutput>) -> SessionResult<Run>;
    async fn list_run_steps(&self, thread_id: &str, run_id: &str) -> SessionResult<Vec<RunStep>>;

    async fn list_files(&self) -> SessionResult<Vec<FileObject>>;
    async fn upload_file(&self, filename: &str, bytes: Vec<u8>, purpose: &str) -> SessionResult<FileObject>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_with_required_action_deserializes() {
        let raw = serde_json::json!({
            "id": "run_1",
            "object": "thread.run",
            "thread_id": "thread_1",
            "assistant_id": "asst_1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [
                        {"id": "call_1", "type": "function", "function": {"name": "writeFile", "arguments": "{}"}}
                    ]
                }
            },
            "last_error": null
        });
        let run: Run = serde_json::from_value(raw).unwrap();
        assert_eq!(run.status, RunStatus::RequiresAction);
        assert_eq!(run.pending_tool_calls().len(), 1);
        assert_eq!(run.pending_tool_calls()[0].function.name, "writeFile");
    }

    #[test]
    fn unknown_run_status_and_content_are_tolerated() {
        let run: Run = serde_json::from_value(serde_json::json!({"id": "r", "status": "incomplete"})).unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(!run.status.is_failure());

        let msg: ThreadMessage = serde_json::from_value(serde_json::json!({
            "id": "m", "created_at": 1, "role": "assistant",
            "content": [{"type": "image_file", "image_file": {"file_id": "f"}}]
        }))
        .unwrap();
        assert_eq!(msg.first_text(), "");
    }

    #[test]
    fn tools_serialize_with_type_tag() {
        let tools = vec![
            AssistantTool::Function {
                function: FunctionDefinition {
                    name: "writeFile".into(),
                    description: Some("Write a file to disk".into()),
                    parameters: serde_json::json!({"type": "object"}),
                },
            },
            AssistantTool::Retrieval,
        ];
        let v = serde_json::to_value(&tools).unwrap();
        assert_eq!(v[0]["type"], "function");
        assert_eq!(v[0]["function"]["name"], "writeFile");
        assert_eq!(v[1], serde_json::json!({"type": "retrieval"}));
    }
}
