use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::future::try_join_all;
use tracing::{debug, info, warn};

use crate::agent::tools::{self, ToolContext, ToolInvocation, ToolKind, ToolResult, ToolSet};
use crate::assistant::{
    AssistantApi, AssistantTool, AssistantUpdate, CreateAssistant, CreateRun, FileObject, NewMessage, Role, RunStatus,
    RunStep, ToolCall, ToolOutput,
};
use crate::error::{SessionError, SessionResult};
use crate::session::{self, AssistantHandle, ChatRecord, SessionState};
use crate::settings::{DEFAULT_POLL_INTERVAL_MS, EffectiveSettings};

/// Drives one assistant/thread pairing against the remote service.
///
/// Holds only configuration; all remote identity lives in the [`SessionState`]
/// passed into and returned from each operation.
pub struct Turbo4<A: AssistantApi> {
    api: A,
    output_dir: PathBuf,
    db_path: PathBuf,
    poll_interval: Duration,
    max_polls: Option<u32>,
}

impl<A: AssistantApi> Turbo4<A> {
    pub fn new(api: A, output_dir: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            api,
            output_dir: output_dir.into(),
            db_path: db_path.into(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_polls: None,
        }
    }

    pub fn from_settings(api: A, settings: &EffectiveSettings) -> Self {
        Self::new(api, settings.output_dir(), settings.db_path())
            .with_poll_interval(settings.poll_interval)
            .with_max_polls(settings.max_polls)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_polls(mut self, max_polls: Option<u32>) -> Self {
        self.max_polls = max_polls;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Adopts the assistant called `name`, creating it if absent. An existing
    /// assistant is only updated when its model differs from `model`.
    pub async fn acquire_assistant(&self, state: SessionState, name: &str, model: &str) -> SessionResult<SessionState> {
        info!(name, model, "acquire assistant");
        let existing = self.api.list_assistants().await?.into_iter().find(|a| a.name.as_deref() == Some(name));
        let id = match existing {
            Some(assistant) => {
                if assistant.model != model {
                    info!(from = %assistant.model, to = model, "updating assistant model");
                    let update = AssistantUpdate { model: Some(model.into()), ..Default::default() };
                    self.api.update_assistant(&assistant.id, update).await?;
                }
                info!(name, id = %assistant.id, "assistant retrieved");
                assistant.id
            }
            None => {
                let created = self.api.create_assistant(CreateAssistant { name: name.into(), model: model.into() }).await?;
                info!(name, id = %created.id, "assistant created");
                created.id
            }
        };
        Ok(SessionState { assistant: Some(AssistantHandle { id, name: name.into(), model: model.into() }), ..state })
    }

    /// Adopts the assistant with `assistant_id`; creates one named `name` when the
    /// service reports it does not exist.
    pub async fn acquire_assistant_by_id(
        &self,
        state: SessionState,
        name: &str,
        assistant_id: &str,
        model: &str,
    ) -> SessionResult<SessionState> {
        let handle = match self.api.retrieve_assistant(assistant_id).await {
            Ok(assistant) => {
                if assistant.name.as_deref() != Some(name) {
                    warn!(requested = name, actual = ?assistant.name, "retrieved assistant name does not match");
                }
                info!(name, id = %assistant.id, "assistant retrieved");
                AssistantHandle { id: assistant.id, name: name.into(), model: assistant.model }
            }
            Err(e) if e.is_not_found() => {
                let created = self.api.create_assistant(CreateAssistant { name: name.into(), model: model.into() }).await?;
                info!(name, id = %created.id, "assistant created");
                AssistantHandle { id: created.id, name: name.into(), model: created.model }
            }
            Err(e) => return Err(e),
        };
        Ok(SessionState { assistant: Some(handle), ..state })
    }

    pub async fn set_instructions(&self, state: SessionState, instructions: &str) -> SessionResult<SessionState> {
        let assistant = state.require_assistant("Assistant must be created before setting instructions.")?;
        let update = AssistantUpdate { instructions: Some(instructions.into()), ..Default::default() };
        self.api.update_assistant(&assistant.id, update).await?;
        info!(assistant = %assistant.name, "instructions updated");
        Ok(state)
    }

    /// Turns on document retrieval. The remote tool list is replaced by
    /// `[retrieval]`, dropping anything equipped before.
    pub async fn enable_retrieval(&self, state: SessionState) -> SessionResult<SessionState> {
        let assistant = state.require_assistant("Assistant must be created before enabling retrieval.")?;
        info!(assistant = %assistant.name, "enable retrieval");
        let update = AssistantUpdate { tools: Some(vec![AssistantTool::Retrieval]), ..Default::default() };
        self.api.update_assistant(&assistant.id, update).await?;
        Ok(SessionState { retrieval_enabled: true, ..state })
    }

    /// Replaces the registered tool set. Pushing the schemas onto the remote
    /// assistant is not supported.
    pub fn register_tools(
        &self,
        state: SessionState,
        kinds: impl IntoIterator<Item = ToolKind>,
        equip_on_assistant: bool,
    ) -> SessionResult<SessionState> {
        let tools = ToolSet::from_kinds(kinds);
        info!(tools = ?tools.names(), equip_on_assistant, "register tools");
        if equip_on_assistant {
            return Err(SessionError::NotImplemented("equipping tools on the remote assistant"));
        }
        Ok(SessionState { tools, ..state })
    }

    pub async fn create_thread(&self, state: SessionState) -> SessionResult<SessionState> {
        state.require_assistant("Assistant must be created before making a thread.")?;
        let thread = self.api.create_thread().await?;
        info!(thread = %thread.id, "thread created");
        Ok(SessionState { thread_id: Some(thread.id), run_id: None, messages: Vec::new(), ..state })
    }

    pub async fn add_message(
        &self,
        state: SessionState,
        text: &str,
        file_ids: &[String],
        refresh: bool,
    ) -> SessionResult<SessionState> {
        let thread_id = state.require_thread("Thread must be created before adding a message.")?.to_string();
        info!(thread = %thread_id, files = ?file_ids, "add message");
        let msg = NewMessage { role: Role::User, content: text.into(), file_ids: file_ids.to_vec() };
        self.api.create_message(&thread_id, msg).await?;
        let mut next = state;
        next.local_messages.push(text.into());
        if refresh {
            next = self.refresh_messages(next).await?;
        }
        Ok(next)
    }

    pub async fn refresh_messages(&self, state: SessionState) -> SessionResult<SessionState> {
        let thread_id = state.require_thread("Thread must be created before loading messages.")?;
        debug!(thread = %thread_id, "load messages");
        let messages = self.api.list_messages(thread_id).await?;
        Ok(SessionState { messages, ..state })
    }

    /// Starts a run offering `toolbox` (every registered tool when `None`) and
    /// polls it to completion, servicing tool calls along the way.
    pub async fn run_thread(&self, state: SessionState, toolbox: Option<&[&str]>) -> SessionResult<SessionState> {
        let thread_id = state.require_thread("Thread must be created before running.")?.to_string();
        let assistant_id = state.require_assistant("Assistant must be created before running.")?.id.clone();

        let mut offered: Vec<AssistantTool> = state.tools.select(toolbox)?.iter().map(ToolKind::assistant_tool).collect();
        if state.retrieval_enabled {
            offered.push(AssistantTool::Retrieval);
        }
        info!(thread = %thread_id, tools = offered.len(), "run thread");

        let run = self.api.create_run(&thread_id, CreateRun { assistant_id, tools: Some(offered) }).await?;
        let run_id = run.id;
        let mut next = SessionState { run_id: Some(run_id.clone()), ..state };

        let mut polls = 0u32;
        loop {
            let current = self.api.retrieve_run(&thread_id, &run_id).await?;
            polls += 1;
            metrics::counter!("turbo4_run_polls_total").increment(1);
            debug!(run = %run_id, status = ?current.status, polls, "run status");

            match current.status {
                RunStatus::RequiresAction if current.required_action.is_some() => {
                    let outputs = self.resolve_tool_calls(&next.tools, current.pending_tool_calls()).await?;
                    debug!(run = %run_id, outputs = outputs.len(), "submitting tool outputs");
                    self.api.submit_tool_outputs(&thread_id, &run_id, outputs).await?;
                }
                RunStatus::Completed => {
                    next = self.refresh_messages(next).await?;
                    info!(run = %run_id, polls, "run completed");
                    return Ok(next);
                }
                status if status.is_failure() => {
                    return Err(SessionError::RunFailed {
                        run_id,
                        status,
                        last_error: current.last_error.map(|e| format!("{}: {}", e.code, e.message)),
                    });
                }
                _ => {}
            }

            if let Some(max) = self.max_polls {
                if polls >= max {
                    return Err(SessionError::PollLimit { run_id, status: current.status, polls });
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Resolves and parses every call before running any, then executes the
    /// batch concurrently. Outputs keep the order of `calls`.
    async fn resolve_tool_calls(&self, tools: &ToolSet, calls: &[ToolCall]) -> SessionResult<Vec<ToolOutput>> {
        let invocations = calls
            .iter()
            .map(|call| -> SessionResult<(String, ToolInvocation)> {
                info!(tool = %call.function.name, arguments = %call.function.arguments, "running tool");
                let kind = tools.resolve(&call.function.name)?;
                Ok((call.id.clone(), kind.parse(&call.function.arguments)?))
            })
            .collect::<SessionResult<Vec<_>>>()?;

        let ctx = ToolContext { output_dir: &self.output_dir, db_path: &self.db_path };
        let ctx = &ctx;
        run_batch(invocations, |invocation| tools::dispatch(ctx, invocation)).await
    }

    pub async fn list_run_steps(&self, state: &SessionState) -> SessionResult<Vec<RunStep>> {
        let thread_id = state.require_thread("Thread must be created before listing steps.")?;
        let run_id = state.require_run("Run must be created before listing steps.")?;
        self.api.list_run_steps(thread_id, run_id).await
    }

    /// Uploads each file unless the service already holds one with the same
    /// name and size. Returns file ids in the order of `paths`.
    pub async fn upsert_files(
        &self,
        state: &SessionState,
        paths: &[PathBuf],
        attach_to_assistant: bool,
    ) -> SessionResult<Vec<String>> {
        info!(files = paths.len(), attach_to_assistant, "upsert files");
        let existing = self.api.list_files().await?;
        let mut ids = Vec::with_capacity(paths.len());
        for path in paths {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| SessionError::Precondition("file path has no file name"))?;
            let contents = tokio::fs::read(path).await?;
            let reusable = existing.iter().find(|f| f.filename == file_name && f.bytes == contents.len() as u64);
            let id = match reusable {
                Some(f) => {
                    debug!(file = %file_name, id = %f.id, "reusing uploaded file");
                    f.id.clone()
                }
                None => {
                    let uploaded = self.api.upload_file(&file_name, contents, "assistants").await?;
                    info!(file = %file_name, id = %uploaded.id, "file uploaded");
                    uploaded.id
                }
            };
            ids.push(id);
        }

        if attach_to_assistant {
            if let Some(assistant) = &state.assistant {
                info!(assistant = %assistant.id, files = ?ids, "attaching files to assistant");
                let update = AssistantUpdate { file_ids: Some(ids.clone()), ..Default::default() };
                self.api.update_assistant(&assistant.id, update).await?;
            }
        }
        Ok(ids)
    }

    /// Remote files, optionally restricted to `ids`.
    pub async fn files(&self, ids: Option<&[String]>) -> SessionResult<Vec<FileObject>> {
        let files = self.api.list_files().await?;
        Ok(match ids {
            Some(ids) => files.into_iter().filter(|f| ids.contains(&f.id)).collect(),
            None => files,
        })
    }

    pub async fn files_by_name(&self, names: &[&str]) -> SessionResult<Vec<FileObject>> {
        let files = self.api.list_files().await?;
        Ok(files.into_iter().filter(|f| names.contains(&f.filename.as_str())).collect())
    }

    pub async fn file_ids_by_name(&self, names: &[&str]) -> SessionResult<Vec<String>> {
        Ok(self.files_by_name(names).await?.into_iter().map(|f| f.id).collect())
    }

    pub async fn export_conversation(&self, state: &SessionState, path: &Path) -> SessionResult<Vec<ChatRecord>> {
        session::export_conversation(state, path).await
    }
}

/// Runs every invocation at once through `exec`; the first failure wins.
async fn run_batch<F, Fut>(batch: Vec<(String, ToolInvocation)>, exec: F) -> SessionResult<Vec<ToolOutput>>
where
    F: Fn(ToolInvocation) -> Fut,
    Fut: Future<Output = SessionResult<ToolResult>>,
{
    try_join_all(batch.into_iter().map(|(tool_call_id, invocation)| {
        let pending = exec(invocation);
        async move {
            let res = pending.await?;
            Ok::<_, SessionError>(ToolOutput { tool_call_id, output: res.output })
        }
    }))
    .await
}
