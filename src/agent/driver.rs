//! The scripted 1BRC session: prime an assistant with two knowledge bases and
//! have it write the table-building SQL and a paging function to disk.

use std::path::PathBuf;

use tracing::info;

use crate::agent::engine::Turbo4;
use crate::agent::tools::ToolKind;
use crate::assistant::AssistantApi;
use crate::knowledge::KnowledgeCollector;
use crate::session::{self, ChatRecord, SessionState};

pub const ASSISTANT_NAME: &str = "1brc";
pub const INSTRUCTIONS: &str = "You're a top performing engineer that reads the knowledge bases and generates concise solutions. You specialize in SQL, Rust, and SQLite.";
pub const BLOG_SOURCE: &str = "https://rmoff.net/2024/01/03/1%EF%B8%8F%E2%83%A3%EF%B8%8F-1brc-in-sql-with-duckdb/";
pub const DOCS_SOURCE: &str = "https://www.sqlite.org/lang_aggfunc.html";
pub const CONVERSATION_FILE: &str = "agent-spyware.json";

#[derive(Debug, Clone)]
pub struct KnowledgeSources {
    pub blog: String,
    pub docs: String,
}

impl Default for KnowledgeSources {
    fn default() -> Self {
        Self { blog: BLOG_SOURCE.into(), docs: DOCS_SOURCE.into() }
    }
}

enum Attach {
    Blog,
    Docs,
    Nothing,
}

const TURNS: [(&str, Attach, bool); 4] = [
    (
        "Read the knowledge base and generate sql that will convert measurements.txt into a table called 'brc' with columns 'station', 'min', 'max', and 'mean' with completed calculations.",
        Attach::Blog,
        false,
    ),
    ("Use writeFile function to write the sql results to a file called 'generate-table.sql'", Attach::Nothing, true),
    (
        "Given this table, and the sqlite docs generate a function where we can page through the results of the 'brc' table using page and size params",
        Attach::Docs,
        false,
    ),
    ("Use writeFile function to write the results to a file called 'page_table.rs'", Attach::Nothing, true),
];

pub async fn run<A: AssistantApi>(
    turbo: &Turbo4<A>,
    collector: &KnowledgeCollector,
    sources: &KnowledgeSources,
    model: &str,
) -> anyhow::Result<Vec<ChatRecord>> {
    let out = turbo.output_dir().to_path_buf();
    let conversation_path = out.join(CONVERSATION_FILE);
    let blog_path = out.join("one-billion-row-challenge.json");
    let docs_path = out.join("sqlite-aggregate-docs.json");

    let state = turbo.acquire_assistant(SessionState::new(), ASSISTANT_NAME, model).await?;
    let state = turbo.set_instructions(state, INSTRUCTIONS).await?;
    let state = turbo.enable_retrieval(state).await?;

    collector.collect(&sources.blog, &blog_path).await?;
    collector.collect(&sources.docs, &docs_path).await?;

    let paths: Vec<PathBuf> = vec![blog_path, docs_path];
    let file_ids = turbo.upsert_files(&state, &paths, false).await?;
    let (blog_id, docs_id) = match file_ids.as_slice() {
        [blog, docs] => (blog.clone(), docs.clone()),
        other => anyhow::bail!("expected two knowledge file ids, got {}", other.len()),
    };

    let state = turbo.register_tools(state, [ToolKind::WriteFile], false)?;
    let mut state = turbo.create_thread(state).await?;

    let write_only = [ToolKind::WriteFile.name()];
    for (i, (prompt, attach, writes)) in TURNS.iter().enumerate() {
        let files = match attach {
            Attach::Blog => vec![blog_id.clone()],
            Attach::Docs => vec![docs_id.clone()],
            Attach::Nothing => Vec::new(),
        };
        info!(turn = i + 1, "sending prompt");
        state = turbo.add_message(state, prompt, &files, false).await?;
        let toolbox = if *writes { Some(&write_only[..]) } else { None };
        state = turbo.run_thread(state, toolbox).await?;
        turbo.export_conversation(&state, &conversation_path).await?;
    }

    Ok(session::conversation(&state))
}
