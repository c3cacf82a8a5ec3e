use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use tracing::info;

use docrag_cli::{init_tracing, load_settings, AppContext};
use docrag_pipeline::api::{
    Api, ApiError, AskRequest, AskResponse, ErrorBody, FilesResponse, HealthResponse, SearchParams, SearchResponse,
};
use docrag_pipeline::events::EventReport;

#[derive(Parser, Debug)]
#[command(name = "docrag-server", about = "HTTP API for document search, answers and bucket events")]
struct ServerCli {
    /// Address to bind (host:port); defaults to server.host/server.port.
    #[arg(long, env = "DOCRAG_BIND")]
    bind: Option<String>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorBody>)>;

fn reject(err: ApiError) -> (StatusCode, Json<ErrorBody>) {
    let status = StatusCode::from_u16(err.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.body()))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = ServerCli::parse();
    let settings = load_settings()?;
    let bind = cli.bind.unwrap_or_else(|| format!("{}:{}", settings.server.host, settings.server.port));
    let ctx = AppContext::build(settings).await?;
    let api = Arc::new(ctx.api()?);

    let app = Router::new()
        .route("/health", get(health))
        .route("/search", get(search))
        .route("/files", get(files))
        .route("/ask", post(ask))
        .route("/minio-event", post(minio_event))
        .with_state(api);

    let addr: SocketAddr = bind.parse().with_context(|| format!("invalid bind address {bind}"))?;
    info!("docrag-server listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server shutdown")?;
    Ok(())
}

async fn health(State(api): State<Arc<Api>>) -> Json<HealthResponse> {
    Json(api.health())
}

async fn search(State(api): State<Arc<Api>>, Query(params): Query<SearchParams>) -> ApiResult<SearchResponse> {
    api.search(params).await.map(Json).map_err(reject)
}

async fn files(State(api): State<Arc<Api>>) -> ApiResult<FilesResponse> {
    api.files().await.map(Json).map_err(reject)
}

async fn ask(State(api): State<Arc<Api>>, Json(request): Json<AskRequest>) -> ApiResult<AskResponse> {
    api.ask(request).await.map(Json).map_err(reject)
}

async fn minio_event(State(api): State<Arc<Api>>, body: Bytes) -> ApiResult<EventReport> {
    api.bucket_event(&body).await.map(Json).map_err(reject)
}
