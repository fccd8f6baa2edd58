use crate::config::ServerConfig;
use crate::render::{Figure, RegionLookup};
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

pub struct ViewerState {
    pub title: String,
    pub png: Vec<u8>,
    pub lookup: RegionLookup,
}

#[derive(Deserialize)]
pub struct QueryParams {
    x: f64,
    y: f64,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct QueryResponse {
    id: String,
    value: Option<f64>,
}

impl ViewerState {
    pub fn from_figure(figure: &Figure) -> Result<Self> {
        Ok(Self {
            title: figure.title().to_string(),
            png: figure.to_png()?,
            lookup: figure.lookup().clone(),
        })
    }
}

/// Serve the figure on localhost and block until Ctrl-C.
pub fn show(figure: &Figure, config: &ServerConfig) -> Result<()> {
    let state = Arc::new(ViewerState::from_figure(figure)?);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start viewer runtime")?;
    runtime.block_on(serve(state, config.port))
}

pub fn router(state: Arc<ViewerState>) -> Router {
    Router::new()
        .route("/", get(page_handler))
        .route("/figure.png", get(figure_handler))
        .route("/api/query", get(query_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn serve(state: Arc<ViewerState>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind viewer to {}", addr))?;

    info!("Showing figure at http://{} (Ctrl-C to close)", addr);
    println!("Open http://{} to view the map. Press Ctrl-C when done.", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Viewer closed");
    Ok(())
}

async fn page_handler(State(state): State<Arc<ViewerState>>) -> Html<String> {
    Html(PAGE.replace("{{title}}", &html_escape(&state.title)))
}

async fn figure_handler(State(state): State<Arc<ViewerState>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], state.png.clone())
}

async fn query_handler(
    State(state): State<Arc<ViewerState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<QueryResponse>> {
    Json(lookup(&state, params.x, params.y))
}

fn lookup(state: &ViewerState, x: f64, y: f64) -> Option<QueryResponse> {
    state.lookup.region_at(x, y).map(|region| QueryResponse {
        id: region.id.clone(),
        value: region.value,
    })
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{{title}}</title>
<style>
  body { font-family: sans-serif; margin: 0; }
  #readout { position: fixed; top: 8px; left: 8px; background: rgba(255,255,255,0.9);
             border: 1px solid #ccc; padding: 4px 8px; font-size: 13px; pointer-events: none; }
</style>
</head>
<body>
<div id="readout">{{title}}</div>
<img id="figure" src="/figure.png" alt="{{title}}">
<script>
  const img = document.getElementById("figure");
  const readout = document.getElementById("readout");
  let pending = null;
  img.addEventListener("mousemove", (e) => {
    const rect = img.getBoundingClientRect();
    const x = (e.clientX - rect.left) * img.naturalWidth / rect.width;
    const y = (e.clientY - rect.top) * img.naturalHeight / rect.height;
    if (pending) pending.abort();
    pending = new AbortController();
    fetch(`/api/query?x=${x}&y=${y}`, { signal: pending.signal })
      .then((r) => r.json())
      .then((hit) => {
        readout.textContent = hit
          ? `${hit.id}: ${hit.value === null ? "no data" : hit.value}`
          : "{{title}}";
      })
      .catch(() => {});
  });
</script>
</body>
</html>
"#;
