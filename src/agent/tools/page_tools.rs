use serde::{Deserialize, Serialize};

use super::{ToolContext, ToolResult};
use crate::error::{SessionError, SessionResult};
use crate::store::{self, Table};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadPageArgs {
    pub table: Table,
    pub page: u32,
    pub items_per_page: u32,
}

pub async fn read_page(ctx: &ToolContext<'_>, args: ReadPageArgs) -> SessionResult<ToolResult> {
    let page = store::read_page(ctx.db_path, args.table, args.page, args.items_per_page)
        .await
        .map_err(|e| SessionError::ToolExecution { tool: "readPage".into(), message: e.to_string() })?;
    Ok(ToolResult {
        summary: format!("page:{} of {} rows:{}", page.page, page.table, page.rows.len()),
        output: serde_json::to_string(&page.rows)?,
    })
}
