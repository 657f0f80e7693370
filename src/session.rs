use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::tools::ToolSet;
use crate::assistant::ThreadMessage;
use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantHandle {
    pub id: String,
    pub name: String,
    pub model: String,
}

/// Everything one orchestrator session knows about its remote counterpart.
///
/// Operations take a state and hand back the next one; nothing is mutated in
/// place, so a failed call leaves the caller's previous state intact.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub assistant: Option<AssistantHandle>,
    pub thread_id: Option<String>,
    pub run_id: Option<String>,
    pub retrieval_enabled: bool,
    pub tools: ToolSet,
    /// Messages as last loaded from the remote thread.
    pub messages: Vec<ThreadMessage>,
    /// Texts this session appended, in call order.
    pub local_messages: Vec<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_assistant(&self, msg: &'static str) -> SessionResult<&AssistantHandle> {
        self.assistant.as_ref().ok_or(SessionError::Precondition(msg))
    }

    pub fn require_thread(&self, msg: &'static str) -> SessionResult<&str> {
        self.thread_id.as_deref().ok_or(SessionError::Precondition(msg))
    }

    pub fn require_run(&self, msg: &'static str) -> SessionResult<&str> {
        self.run_id.as_deref().ok_or(SessionError::Precondition(msg))
    }

    /// Cached thread messages as chat records, in cache order.
    pub fn chat_messages(&self) -> Vec<ChatRecord> {
        self.messages.iter().map(ChatRecord::from_message).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub from_name: String,
    pub to_name: String,
    pub message: String,
    pub created: DateTime<Utc>,
}

impl ChatRecord {
    pub fn from_message(msg: &ThreadMessage) -> Self {
        Self {
            from_name: msg.role.as_str().into(),
            to_name: msg.role.counterpart().as_str().into(),
            message: msg.first_text().into(),
            created: Utc.timestamp_opt(msg.created_at, 0).single().unwrap_or_default(),
        }
    }
}

/// Chat records ordered oldest first; ties keep cache order.
pub fn conversation(state: &SessionState) -> Vec<ChatRecord> {
    let mut records = state.chat_messages();
    records.sort_by_key(|r| r.created);
    records
}

pub async fn export_conversation(state: &SessionState, path: &Path) -> SessionResult<Vec<ChatRecord>> {
    let records = conversation(state);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(&records)?;
    tokio::fs::write(path, json).await?;
    tracing::info!(path = %path.display(), messages = records.len(), "conversation exported");
    Ok(records)
}
