use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ToolContext, ToolResult};
use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileArgs {
    pub contents: String,
    pub file_name: String,
}

/// Joins `rel` onto `root`, refusing anything that would land outside it.
pub fn resolve_under_root(root: &Path, rel: &str) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for comp in Path::new(rel).components() {
        match comp {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if normalized.as_os_str().is_empty() {
        return None;
    }
    Some(root.join(normalized))
}

pub async fn write_file(ctx: &ToolContext<'_>, args: WriteFileArgs) -> SessionResult<ToolResult> {
    let path = resolve_under_root(ctx.output_dir, &args.file_name).ok_or_else(|| SessionError::ToolExecution {
        tool: "writeFile".into(),
        message: format!("path outside output directory: {}", args.file_name),
    })?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, args.contents.as_bytes()).await?;
    Ok(ToolResult {
        summary: format!("write:{} bytes:{}", path.display(), args.contents.len()),
        output: "File written".into(),
    })
}
