use thiserror::Error;

use crate::assistant::RunStatus;

/// Failures surfaced by the orchestrator and its collaborators.
#[derive(Error, Debug)]
pub enum SessionError {
    /// An operation was invoked before a required prior step.
    #[error("{0}")]
    Precondition(&'static str),

    #[error("remote call failed: {0}")]
    Remote(String),

    /// The service answered with a non-success status code.
    #[error("remote call {method} {path} failed with {status}: {body}")]
    RemoteStatus { method: &'static str, path: String, status: u16, body: String },

    #[error("run {run_id} ended with status {status:?} ({})", .last_error.as_deref().unwrap_or("no error reported"))]
    RunFailed { run_id: String, status: RunStatus, last_error: Option<String> },

    #[error("run {run_id} still {status:?} after {polls} polls")]
    PollLimit { run_id: String, status: RunStatus, polls: u32 },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for tool {tool}: {source}")]
    ToolArguments { tool: String, #[source] source: serde_json::Error },

    #[error("tool {tool} failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::RemoteStatus { status: 404, .. })
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        SessionError::Remote(err.to_string())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
