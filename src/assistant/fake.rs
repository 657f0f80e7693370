//! In-memory [`AssistantApi`] used by orchestrator tests. Records every call
//! and replays scripted run statuses.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::*;
use crate::error::{SessionError, SessionResult};

#[derive(Default)]
pub struct FakeState {
    pub assistants: Vec<Assistant>,
    pub created_assistants: Vec<CreateAssistant>,
    pub updates: Vec<(String, AssistantUpdate)>,
    pub threads: HashMap<String, Vec<ThreadMessage>>,
    pub created_runs: Vec<(String, CreateRun)>,
    pub run_script: VecDeque<Run>,
    pub submissions: Vec<(String, Vec<ToolOutput>)>,
    pub list_messages_calls: usize,
    pub files: Vec<FileObject>,
    pub uploads: Vec<(String, usize)>,
    /// Ordered call log, e.g. `retrieve_run`, `submit_tool_outputs:2`.
    pub log: Vec<String>,
    pub clock: i64,
    next_id: usize,
}

impl FakeState {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{}", self.next_id)
    }
}

#[derive(Default)]
pub struct FakeAssistants {
    pub state: Mutex<FakeState>,
}

impl FakeAssistants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assistant(self, id: &str, name: &str, model: &str) -> Self {
        self.state.lock().unwrap().assistants.push(Assistant {
            id: id.into(),
            name: Some(name.into()),
            model: model.into(),
            instructions: None,
            tools: Vec::new(),
            file_ids: Vec::new(),
        });
        self
    }

    pub fn with_file(self, id: &str, filename: &str, bytes: u64) -> Self {
        self.state.lock().unwrap().files.push(FileObject {
            id: id.into(),
            bytes,
            created_at: 0,
            filename: filename.into(),
            purpose: "assistants".into(),
        });
        self
    }

    /// Statuses returned by successive `retrieve_run` calls; `completed` once exhausted.
    pub fn script_run(&self, runs: Vec<Run>) {
        self.state.lock().unwrap().run_script.extend(runs);
    }

    /// Timestamp given to the next created message.
    pub fn set_clock(&self, ts: i64) {
        self.state.lock().unwrap().clock = ts;
    }

    pub fn push_message(&self, thread_id: &str, role: Role, text: &str, created_at: i64) {
        let mut st = self.state.lock().unwrap();
        let id = st.id("msg");
        st.threads.entry(thread_id.to_string()).or_default().push(message(id, thread_id, role, text, created_at, Vec::new()));
    }
}

pub fn message(id: String, thread_id: &str, role: Role, text: &str, created_at: i64, file_ids: Vec<String>) -> ThreadMessage {
    ThreadMessage {
        id,
        created_at,
        thread_id: thread_id.to_string(),
        role,
        content: vec![MessageContent::Text { text: TextContent { value: text.to_string(), annotations: Vec::new() } }],
        file_ids,
        assistant_id: None,
        run_id: None,
    }
}

pub fn run_with_status(id: &str, status: RunStatus) -> Run {
    Run {
        id: id.into(),
        thread_id: String::new(),
        assistant_id: String::new(),
        status,
        required_action: None,
        last_error: None,
    }
}

pub fn run_requiring(id: &str, calls: Vec<(&str, &str, &str)>) -> Run {
    let tool_calls = calls
        .into_iter()
        .map(|(call_id, name, arguments)| ToolCall {
            id: call_id.into(),
            kind: "function".into(),
            function: FunctionCall { name: name.into(), arguments: arguments.into() },
        })
        .collect();
    Run {
        required_action: Some(RequiredAction {
            kind: "submit_tool_outputs".into(),
            submit_tool_outputs: SubmitToolOutputs { tool_calls },
        }),
        ..run_with_status(id, RunStatus::RequiresAction)
    }
}

fn not_found(what: &str) -> SessionError {
    SessionError::RemoteStatus { method: "GET", path: what.to_string(), status: 404, body: "not found".into() }
}

#[async_trait]
impl AssistantApi for FakeAssistants {
    async fn list_assistants(&self) -> SessionResult<Vec<Assistant>> {
        let mut st = self.state.lock().unwrap();
        st.log.push("list_assistants".into());
        Ok(st.assistants.clone())
    }

    async fn retrieve_assistant(&self, assistant_id: &str) -> SessionResult<Assistant> {
        let mut st = self.state.lock().unwrap();
        st.log.push("retrieve_assistant".into());
        st.assistants.iter().find(|a| a.id == assistant_id).cloned().ok_or_else(|| not_found(assistant_id))
    }

    async fn create_assistant(&self, req: CreateAssistant) -> SessionResult<Assistant> {
        let mut st = self.state.lock().unwrap();
        st.log.push("create_assistant".into());
        let id = st.id("asst");
        let a = Assistant {
            id,
            name: Some(req.name.clone()),
            model: req.model.clone(),
            instructions: None,
            tools: Vec::new(),
            file_ids: Vec::new(),
        };
        st.created_assistants.push(req);
        st.assistants.push(a.clone());
        Ok(a)
    }

    async fn update_assistant(&self, assistant_id: &str, update: AssistantUpdate) -> SessionResult<Assistant> {
        let mut st = self.state.lock().unwrap();
        st.log.push("update_assistant".into());
        st.updates.push((assistant_id.to_string(), update.clone()));
        let a = st.assistants.iter_mut().find(|a| a.id == assistant_id).ok_or_else(|| not_found(assistant_id))?;
        if let Some(m) = update.model {
            a.model = m;
        }
        if let Some(i) = update.instructions {
            a.instructions = Some(i);
        }
        if let Some(t) = update.tools {
            a.tools = t;
        }
        if let Some(f) = update.file_ids {
            a.file_ids = f;
        }
        Ok(a.clone())
    }

    async fn create_thread(&self) -> SessionResult<Thread> {
        let mut st = self.state.lock().unwrap();
        st.log.push("create_thread".into());
        let id = st.id("thread");
        st.threads.insert(id.clone(), Vec::new());
        Ok(Thread { id, created_at: st.clock })
    }

    async fn create_message(&self, thread_id: &str, msg: NewMessage) -> SessionResult<ThreadMessage> {
        let mut st = self.state.lock().unwrap();
        st.log.push("create_message".into());
        let id = st.id("msg");
        let created = message(id, thread_id, msg.role, &msg.content, st.clock, msg.file_ids);
        st.threads.get_mut(thread_id).ok_or_else(|| not_found(thread_id))?.push(created.clone());
        Ok(created)
    }

    async fn list_messages(&self, thread_id: &str) -> SessionResult<Vec<ThreadMessage>> {
        let mut st = self.state.lock().unwrap();
        st.log.push("list_messages".into());
        st.list_messages_calls += 1;
        // newest first, like the remote listing
        let mut msgs = st.threads.get(thread_id).cloned().ok_or_else(|| not_found(thread_id))?;
        msgs.reverse();
        Ok(msgs)
    }

    async fn create_run(&self, thread_id: &str, req: CreateRun) -> SessionResult<Run> {
        let mut st = self.state.lock().unwrap();
        st.log.push("create_run".into());
        let id = st.id("run");
        st.created_runs.push((thread_id.to_string(), req));
        Ok(run_with_status(&id, RunStatus::Queued))
    }

    async fn retrieve_run(&self, _thread_id: &str, run_id: &str) -> SessionResult<Run> {
        let mut st = self.state.lock().unwrap();
        st.log.push("retrieve_run".into());
        Ok(st.run_script.pop_front().unwrap_or_else(|| run_with_status(run_id, RunStatus::Completed)))
    }

    async fn submit_tool_outputs(&self, _thread_id: &str, run_id: &str, outputs: Vec<ToolOutput>) -> SessionResult<Run> {
        let mut st = self.state.lock().unwrap();
        st.log.push(format!("submit_tool_outputs:{}", outputs.len()));
        st.submissions.push((run_id.to_string(), outputs));
        Ok(run_with_status(run_id, RunStatus::Queued))
    }

    async fn list_run_steps(&self, _thread_id: &str, run_id: &str) -> SessionResult<Vec<RunStep>> {
        let mut st = self.state.lock().unwrap();
        st.log.push("list_run_steps".into());
        Ok(vec![RunStep {
            id: "step_1".into(),
            run_id: run_id.into(),
            kind: "message_creation".into(),
            status: "completed".into(),
            step_details: serde_json::Value::Null,
            created_at: st.clock,
        }])
    }

    async fn list_files(&self) -> SessionResult<Vec<FileObject>> {
        let mut st = self.state.lock().unwrap();
        st.log.push("list_files".into());
        Ok(st.files.clone())
    }

    async fn upload_file(&self, filename: &str, bytes: Vec<u8>, purpose: &str) -> SessionResult<FileObject> {
        let mut st = self.state.lock().unwrap();
        st.log.push("upload_file".into());
        let id = st.id("file");
        let f = FileObject { id, bytes: bytes.len() as u64, created_at: st.clock, filename: filename.into(), purpose: purpose.into() };
        st.uploads.push((filename.to_string(), bytes.len()));
        st.files.push(f.clone());
        Ok(f)
    }
}
