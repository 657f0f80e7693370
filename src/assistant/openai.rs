use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{
    Assistant, AssistantApi, AssistantUpdate, CreateAssistant, CreateRun, FileObject, List, NewMessage, Run,
    RunStep, Thread, ThreadMessage, ToolOutput,
};
use crate::error::{SessionError, SessionResult};
use crate::settings::EffectiveSettings;

const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v1");

/// `reqwest` client for an OpenAI-compatible assistants endpoint.
#[derive(Clone)]
pub struct OpenAiAssistants {
    pub base_url: String,
    pub api_key: Option<String>,
    http: reqwest::Client,
}

impl OpenAiAssistants {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { base_url: base_url.into(), api_key, http: reqwest::Client::new() }
    }

    pub fn from_settings(settings: &EffectiveSettings) -> Self {
        Self::new(settings.base_url.clone(), settings.api_key.clone())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'));
        let mut rb = self.http.request(method, url).header(BETA_HEADER.0, BETA_HEADER.1);
        if let Some(key) = &self.api_key {
            rb = rb.bearer_auth(key);
        }
        rb
    }

    async fn send<T: DeserializeOwned>(&self, method: &'static str, path: &str, rb: RequestBuilder) -> SessionResult<T> {
        let resp = rb.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SessionError::RemoteStatus { method, path: path.to_string(), status: status.as_u16(), body });
        }
        Ok(resp.json::<T>().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> SessionResult<T> {
        self.send("GET", path, self.request(Method::GET, path)).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> SessionResult<T> {
        self.send("POST", path, self.request(Method::POST, path).json(body)).await
    }
}

#[derive(Serialize)]
struct SubmitToolOutputsBody {
    tool_outputs: Vec<ToolOutput>,
}

#[async_trait]
impl AssistantApi for OpenAiAssistants {
    async fn list_assistants(&self) -> SessionResult<Vec<Assistant>> {
        let list: List<Assistant> = self.get("assistants?limit=100").await?;
        Ok(list.data)
    }

    async fn retrieve_assistant(&self, assistant_id: &str) -> SessionResult<Assistant> {
        self.get(&format!("assistants/{assistant_id}")).await
    }

    async fn create_assistant(&self, req: CreateAssistant) -> SessionResult<Assistant> {
        self.post("assistants", &req).await
    }

    async fn update_assistant(&self, assistant_id: &str, update: AssistantUpdate) -> SessionResult<Assistant> {
        self.post(&format!("assistants/{assistant_id}"), &update).await
    }

    async fn create_thread(&self) -> SessionResult<Thread> {
        self.post("threads", &serde_json::json!({})).await
    }

    async fn create_message(&self, thread_id: &str, msg: NewMessage) -> SessionResult<ThreadMessage> {
        self.post(&format!("threads/{thread_id}/messages"), &msg).await
    }

    async fn list_messages(&self, thread_id: &str) -> SessionResult<Vec<ThreadMessage>> {
        let list: List<ThreadMessage> = self.get(&format!("threads/{thread_id}/messages?limit=100")).await?;
        Ok(list.data)
    }

    async fn create_run(&self, thread_id: &str, req: CreateRun) -> SessionResult<Run> {
        self.post(&format!("threads/{thread_id}/runs"), &req).await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> SessionResult<Run> {
        self.get(&format!("threads/{thread_id}/runs/{run_id}")).await
    }

    async fn submit_tool_outputs(&self, thread_id: &str, run_id: &str, outputs: Vec<ToolOutput>) -> SessionResult<Run> {
        let body = SubmitToolOutputsBody { tool_outputs: outputs };
        self.post(&format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"), &body).await
    }

    async fn list_run_steps(&self, thread_id: &str, run_id: &str) -> SessionResult<Vec<RunStep>> {
        let list: List<RunStep> = self.get(&format!("threads/{thread_id}/runs/{run_id}/steps")).await?;
        Ok(list.data)
    }

    async fn list_files(&self) -> SessionResult<Vec<FileObject>> {
        let list: List<FileObject> = self.get("files").await?;
        Ok(list.data)
    }

    async fn upload_file(&self, filename: &str, bytes: Vec<u8>, purpose: &str) -> SessionResult<FileObject> {
        let form = Form::new()
            .text("purpose", purpose.to_string())
            .part("file", Part::bytes(bytes).file_name(filename.to_string()));
        self.send("POST", "files", self.request(Method::POST, "files").multipart(form)).await
    }
}
