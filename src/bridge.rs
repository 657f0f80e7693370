use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::store::{self, Page, Table};

/// What subscribers receive for each page request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeEvent {
    #[serde(rename_all = "camelCase")]
    Page { request_id: Uuid, page: Page },
    #[serde(rename_all = "camelCase")]
    PageError { request_id: Uuid, error: String },
}

impl BridgeEvent {
    /// Matches the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::Page { .. } => "page",
            BridgeEvent::PageError { .. } => "pageError",
        }
    }

    pub fn request_id(&self) -> Uuid {
        match self {
            BridgeEvent::Page { request_id, .. } | BridgeEvent::PageError { request_id, .. } => *request_id,
        }
    }
}

/// Request/response channel between the presentation layer and the page reader.
/// Requests return immediately; results arrive on the event channel.
#[derive(Clone)]
pub struct Bridge {
    db_path: Arc<PathBuf>,
    events: broadcast::Sender<BridgeEvent>,
}

impl Bridge {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { db_path: Arc::new(db_path.into()), events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    pub fn request_page(&self, table: Table, page: u32, items_per_page: u32) -> Uuid {
        let request_id = Uuid::new_v4();
        let db_path = self.db_path.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match store::read_page(&db_path, table, page, items_per_page).await {
                Ok(page) => BridgeEvent::Page { request_id, page },
                Err(e) => {
                    tracing::warn!(%request_id, %table, page, error = %e, "page request failed");
                    BridgeEvent::PageError { request_id, error: e.to_string() }
                }
            };
            // no subscribers is fine
            let _ = events.send(event);
        });
        request_id
    }

    pub async fn page(&self, table: Table, page: u32, items_per_page: u32) -> anyhow::Result<Page> {
        store::read_page(&self.db_path, table, page, items_per_page).await
    }
}
