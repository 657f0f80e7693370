use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::bridge::{Bridge, BridgeEvent};
use crate::store::{Page, Table};

#[derive(Clone)]
pub struct AppState {
    pub bridge: Bridge,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub items_per_page: Option<u32>,
}

const DEFAULT_ITEMS_PER_PAGE: u32 = 10;

fn parse_table(raw: &str) -> Result<Table, (StatusCode, String)> {
    raw.parse::<Table>().map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))
}

async fn get_page(
    State(state): State<AppState>,
    Path((table, page)): Path<(String, u32)>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Page>, (StatusCode, String)> {
    let table = parse_table(&table)?;
    let items = q.items_per_page.unwrap_or(DEFAULT_ITEMS_PER_PAGE);
    state
        .bridge
        .page(table, page, items)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequestBody {
    pub table: String,
    pub page: u32,
    pub items_per_page: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequestResponse {
    pub request_id: Uuid,
}

async fn request_page(
    State(state): State<AppState>,
    Json(body): Json<PageRequestBody>,
) -> Result<(StatusCode, Json<PageRequestResponse>), (StatusCode, String)> {
    let table = parse_table(&body.table)?;
    let request_id = state.bridge.request_page(table, body.page, body.items_per_page);
    Ok((StatusCode::ACCEPTED, Json(PageRequestResponse { request_id })))
}

// GET /v1/bridge/events (SSE)

async fn bridge_events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.bridge.subscribe();
    Sse::new(bridge_event_stream(rx)).keep_alive(KeepAlive::default())
}

fn bridge_event_stream(
    mut rx: broadcast::Receiver<BridgeEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event(event.name()).id(event.request_id().to_string()).data(data));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "bridge subscriber lagged");
                    yield Ok(Event::default().event("warning").data(format!("{{\"missed\":{n}}}")));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/tables/:table/pages/:page", get(get_page))
        .route("/v1/bridge/page-requests", post(request_page))
        .route("/v1/bridge/events", get(bridge_events))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "serving page reader");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn start(db: &std::path::Path) -> (String, Bridge) {
        let bridge = Bridge::new(db);
        let app = router(AppState { bridge: bridge.clone() });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), bridge)
    }

    async fn seeded_db(dir: &std::path::Path, rows: usize) -> std::path::PathBuf {
        let src = dir.join("m.txt");
        let lines: Vec<String> = (0..rows).map(|i| format!("S{i};{i}.0")).collect();
        std::fs::write(&src, lines.join("\n")).unwrap();
        let db = dir.join("db.sqlite");
        store::import_measurements(&db, &src).await.unwrap();
        db
    }

    #[tokio::test]
    async fn serves_pages_and_rejects_unknown_tables() {
        let dir = tempdir().unwrap();
        let db = seeded_db(dir.path(), 25).await;
        let (base, _bridge) = start(&db).await;
        let client = reqwest::Client::new();

        let page: Page = client
            .get(format!("{base}/v1/tables/measurements/pages/3?items_per_page=10"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(page.rows.len(), 5);

        let resp = client.get(format!("{base}/v1/tables/stations/pages/1")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

        let resp = client.get(format!("{base}/v1/tables/brc/pages/0")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn page_requests_are_accepted_and_delivered_as_events() {
        let dir = tempdir().unwrap();
        let db = seeded_db(dir.path(), 3).await;
        let (base, bridge) = start(&db).await;
        let mut rx = bridge.subscribe();

        let resp = reqwest::Client::new()
            .post(format!("{base}/v1/bridge/page-requests"))
            .json(&serde_json::json!({"table": "brc", "page": 1, "itemsPerPage": 2}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        let accepted: PageRequestResponse = resp.json().await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.request_id(), accepted.request_id);
        assert!(matches!(event, BridgeEvent::Page { ref page, .. } if page.rows.len() == 2));
    }

    #[tokio::test]
    async fn event_stream_delivers_page_results_over_sse() {
        let dir = tempdir().unwrap();
        let db = seeded_db(dir.path(), 4).await;
        let (base, _bridge) = start(&db).await;
        let client = reqwest::Client::new();

        let mut events = client.get(format!("{base}/v1/bridge/events")).send().await.unwrap();
        assert_eq!(events.status(), reqwest::StatusCode::OK);
        let content_type = events.headers()[reqwest::header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/event-stream"));

        let accepted: PageRequestResponse = client
            .post(format!("{base}/v1/bridge/page-requests"))
            .json(&serde_json::json!({"table": "measurements", "page": 2, "itemsPerPage": 3}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let mut buf = String::new();
        let event = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let chunk = events.chunk().await.unwrap().expect("event stream ended");
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(end) = buf.find("\n\n") {
                    let block: String = buf.drain(..end + 2).collect();
                    if block.lines().any(|l| l.strip_prefix("event:").map(str::trim) == Some("page")) {
                        let data = block.lines().find_map(|l| l.strip_prefix("data:")).unwrap().trim();
                        return serde_json::from_str::<BridgeEvent>(data).unwrap();
                    }
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(event.request_id(), accepted.request_id);
        match event {
            BridgeEvent::Page { page, .. } => {
                assert_eq!(page.page, 2);
                assert_eq!(page.rows.len(), 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
