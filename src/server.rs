use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    config::ScanOptions,
    engine::{ScanEngine, ScanHandle},
    export::{self, HostFilter},
    session::ResultTable,
    sink::ResultSink,
    types::{FinishReason, ScanEvent, ScanProgress, ScanState},
};

#[derive(Clone, Default)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>, // shared view of the current session
}

#[derive(Default)]
struct ServerState {
    table: ResultTable,
    handle: Option<ScanHandle>,
    finished: Option<FinishReason>,
    /// Bumped on every new scan or clear; events from older scans are dropped.
    generation: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Status {
    pub state: ScanState,
    pub progress: Option<ScanProgress>,
    pub hosts: usize,
    pub alive: usize,
    pub with_open_ports: usize,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct FilterQuery {
    #[serde(default)]
    pub filter: HostFilter,
}

/// Feeds a session's events into the shared server view.
struct StateSink {
    app: AppState,
    generation: u64,
}

#[async_trait]
impl ResultSink for StateSink {
    async fn on_event(&mut self, event: &ScanEvent) {
        let mut s = self.app.inner.write().await;
        if s.generation != self.generation {
            return;
        }
        s.table.apply(event);
        if let ScanEvent::ScanFinished { reason } = event {
            s.finished = Some(reason.clone());
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .route("/stop", post(post_stop))
        .route("/results", get(get_results).delete(delete_results))
        .route("/export.csv", get(get_export))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state);

    let static_svc = ServeDir::new("ui").append_index_html_on_directories(true);

    Router::new()
        .nest("/api", api)
        .fallback_service(static_svc)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

pub async fn spawn_server(bind: &str) -> Result<()> {
    let app = router(AppState::default());
    info!("serving UI on http://{bind}");
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

async fn current_status(app: &AppState) -> Status {
    let s = app.inner.read().await;
    let live = s.handle.as_ref().map(ScanHandle::status);
    let state = match (&s.finished, live) {
        (Some(reason), _) => reason.state(),
        (None, Some(status)) => status.state,
        (None, None) => ScanState::Idle,
    };
    Status {
        state,
        progress: live.and_then(|st| st.progress),
        hosts: s.table.len(),
        alive: s.table.hosts().filter(|h| h.alive).count(),
        with_open_ports: s.table.hosts().filter(|h| !h.open_ports.is_empty()).count(),
        error: match &s.finished {
            Some(FinishReason::Error(msg)) => Some(msg.clone()),
            _ => None,
        },
    }
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(current_status(&app).await))
}

async fn get_results(
    State(app): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> impl IntoResponse {
    let s = app.inner.read().await;
    (StatusCode::OK, Json(s.table.rows(q.filter)))
}

async fn get_export(
    State(app): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> impl IntoResponse {
    let s = app.inner.read().await;
    match export::csv_string(s.table.hosts(), q.filter) {
        Ok(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"scan.csv\"",
                ),
            ],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn post_stop(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    if let Some(h) = s.handle.as_ref() {
        h.stop();
    }
    StatusCode::ACCEPTED
}

async fn delete_results(State(app): State<AppState>) -> impl IntoResponse {
    let mut s = app.inner.write().await;
    if let Some(h) = s.handle.take() {
        h.stop();
    }
    s.generation += 1;
    s.table.clear();
    s.finished = None;
    StatusCode::NO_CONTENT
}

async fn post_scan(State(app): State<AppState>, Json(opts): Json<ScanOptions>) -> impl IntoResponse {
    let config = match opts.into_configuration() {
        Ok(c) => c,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
                .into_response()
        }
    };

    // Replace the current session before starting, so the new sink owns the view.
    let generation = {
        let mut s = app.inner.write().await;
        if let Some(h) = s.handle.take() {
            h.stop();
        }
        s.generation += 1;
        s.table.clear();
        s.finished = None;
        s.generation
    };

    let sink = StateSink {
        app: app.clone(),
        generation,
    };
    let handle = match ScanEngine::new(config).start(sink).await {
        Ok(h) => h,
        Err(e) => {
            warn!(error = %e, "scan rejected");
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
                .into_response();
        }
    };

    {
        let mut s = app.inner.write().await;
        if s.generation != generation {
            // superseded while starting
            handle.stop();
        } else {
            s.handle = Some(handle);
        }
    }

    (StatusCode::ACCEPTED, Json(current_status(&app).await)).into_response()
}
