//! Local capabilities the assistant may call during a run.
//!
//! The set is closed: every tool is a [`ToolKind`] variant pairing the JSON
//! schema advertised to the service with a typed argument struct, and
//! [`dispatch`] is the single place handlers are invoked from.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::assistant::{AssistantTool, FunctionDefinition};
use crate::error::{SessionError, SessionResult};

pub mod file_tools;
pub mod page_tools;

pub use file_tools::WriteFileArgs;
pub use page_tools::ReadPageArgs;

pub struct ToolContext<'a> {
    /// Root every `writeFile` path is resolved under.
    pub output_dir: &'a Path,
    pub db_path: &'a Path,
}

pub struct ToolResult {
    pub summary: String,
    pub output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolKind {
    WriteFile,
    ReadPage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    WriteFile(WriteFileArgs),
    ReadPage(ReadPageArgs),
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::WriteFile, ToolKind::ReadPage];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::WriteFile => "writeFile",
            ToolKind::ReadPage => "readPage",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::WriteFile => "Write a file to disk",
            ToolKind::ReadPage => "Read one page of rows from the brc or measurements table",
        }
    }

    pub fn parameters(&self) -> Value {
        match self {
            ToolKind::WriteFile => json!({
                "type": "object",
                "properties": {
                    "contents": { "type": "string", "description": "The contents of the file" },
                    "fileName": { "type": "string", "description": "The name of the file" }
                },
                "required": ["contents", "fileName"]
            }),
            ToolKind::ReadPage => json!({
                "type": "object",
                "properties": {
                    "table": { "type": "string", "enum": ["brc", "measurements"] },
                    "page": { "type": "integer", "minimum": 1, "description": "1-based page number" },
                    "itemsPerPage": { "type": "integer", "minimum": 1 }
                },
                "required": ["table", "page", "itemsPerPage"]
            }),
        }
    }

    pub fn definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name().into(),
            description: Some(self.description().into()),
            parameters: self.parameters(),
        }
    }

    pub fn assistant_tool(&self) -> AssistantTool {
        AssistantTool::Function { function: self.definition() }
    }

    /// Parses the serialized argument payload of a call into the typed variant.
    pub fn parse(&self, arguments: &str) -> SessionResult<ToolInvocation> {
        match self {
            ToolKind::WriteFile => parse_args(self, arguments).map(ToolInvocation::WriteFile),
            ToolKind::ReadPage => parse_args(self, arguments).map(ToolInvocation::ReadPage),
        }
    }
}

fn parse_args<T: DeserializeOwned>(kind: &ToolKind, arguments: &str) -> SessionResult<T> {
    serde_json::from_str(arguments).map_err(|source| SessionError::ToolArguments { tool: kind.name().into(), source })
}

impl ToolInvocation {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolInvocation::WriteFile(_) => ToolKind::WriteFile,
            ToolInvocation::ReadPage(_) => ToolKind::ReadPage,
        }
    }
}

pub async fn dispatch(ctx: &ToolContext<'_>, invocation: ToolInvocation) -> SessionResult<ToolResult> {
    let kind = invocation.kind();
    metrics::counter!("turbo4_tool_calls_total", "tool" => kind.name()).increment(1);
    let res = match invocation {
        ToolInvocation::WriteFile(args) => file_tools::write_file(ctx, args).await,
        ToolInvocation::ReadPage(args) => page_tools::read_page(ctx, args).await,
    };
    match &res {
        Ok(r) => tracing::info!(tool = kind.name(), summary = %r.summary, "tool finished"),
        Err(e) => tracing::warn!(tool = kind.name(), error = %e, "tool failed"),
    }
    res
}

/// Tools registered with a session, in registration order. Names are unique;
/// registering a kind twice keeps its first position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSet {
    tools: Vec<ToolKind>,
}

impl ToolSet {
    pub fn from_kinds(kinds: impl IntoIterator<Item = ToolKind>) -> Self {
        let mut tools = Vec::new();
        for kind in kinds {
            if !tools.contains(&kind) {
                tools.push(kind);
            }
        }
        Self { tools }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(ToolKind::name).collect()
    }

    pub fn kinds(&self) -> Vec<ToolKind> {
        self.tools.clone()
    }

    /// Exact-name lookup.
    pub fn resolve(&self, name: &str) -> SessionResult<ToolKind> {
        self.tools
            .iter()
            .copied()
            .find(|k| k.name() == name)
            .ok_or_else(|| SessionError::UnknownTool(name.to_string()))
    }

    /// Tools to offer a run: the named subset, or everything when no subset is given.
    pub fn select(&self, subset: Option<&[&str]>) -> SessionResult<Vec<ToolKind>> {
        match subset {
            Some(names) => names.iter().map(|n| self.resolve(n)).collect(),
            None => Ok(self.kinds()),
        }
    }
}
