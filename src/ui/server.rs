//! Local web UI: one page plus the JSON actions it calls.
//!
//! - GET  /                 → the page
//! - GET  /api/configs      → stem-count choices
//! - POST /api/visibility   → slot updates for a selector change
//! - POST /api/split/upload → multipart upload, separate, slot updates
//! - POST /api/split/url    → download, separate, slot updates
//! - GET  /api/progress     → advisory progress of the running job
//! - GET  /stems/:token     → a produced stem file

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    config::Settings,
    core::splitter::Separator,
    error::StemError,
    io::download::{AudioSource, MediaDownloader},
    types::{SplitProgress, StemConfig},
    ui::slots::{self, SlotUpdate},
};

const PAGE: &str = include_str!("page.html");
const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

/// Shared application state.
pub struct AppState {
    separator: Separator,
    downloader: Arc<dyn MediaDownloader>,
    settings: Settings,
    /// Held for the whole of a split; actions run one at a time.
    job: tokio::sync::Mutex<()>,
    progress: Mutex<ProgressSnapshot>,
    files: Mutex<HashMap<Uuid, PathBuf>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(separator: Separator, downloader: Arc<dyn MediaDownloader>, settings: Settings) -> SharedState {
        Arc::new(Self {
            separator,
            downloader,
            settings,
            job: tokio::sync::Mutex::new(()),
            progress: Mutex::new(ProgressSnapshot::default()),
            files: Mutex::new(HashMap::new()),
        })
    }

    fn record_progress(&self, p: SplitProgress) {
        let mut snap = self.progress.lock().unwrap_or_else(|e| e.into_inner());
        match p {
            SplitProgress::Stage(stage) => {
                snap.stage = stage.to_string();
                snap.running = true;
            }
            SplitProgress::Chunks { done, total, percent } => {
                snap.done = done;
                snap.total = total;
                snap.percent = percent;
            }
            SplitProgress::Writing { stem, .. } => snap.stage = format!("write {stem}"),
            SplitProgress::Finished => {
                snap.stage = "finished".into();
                snap.running = false;
            }
        }
    }

    fn finish_progress(&self) {
        let mut snap = self.progress.lock().unwrap_or_else(|e| e.into_inner());
        snap.running = false;
    }

    /// Give each visible slot a URL the page can play from. Tokens of the
    /// previous job stop resolving.
    fn publish(&self, updates: [SlotUpdate; slots::SLOT_COUNT]) -> Vec<SlotView> {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.clear();
        updates
            .into_iter()
            .map(|u| {
                let url = u.value.map(|path| {
                    let token = Uuid::new_v4();
                    files.insert(token, path);
                    format!("/stems/{token}")
                });
                SlotView {
                    index: u.index,
                    visible: u.visible,
                    label: u.label,
                    url,
                }
            })
            .collect()
    }

    fn stem_path(&self, token: &Uuid) -> Option<PathBuf> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.get(token).cloned()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgressSnapshot {
    pub running: bool,
    pub stage: String,
    pub done: usize,
    pub total: usize,
    pub percent: f32,
}

/// A slot update as the page consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotView {
    pub index: usize,
    pub visible: bool,
    pub label: String,
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConfigView {
    #[serde(flatten)]
    config: &'static StemConfig,
    available: bool,
}

#[derive(Debug, Deserialize)]
struct ChoiceRequest {
    choice: String,
}

#[derive(Debug, Deserialize)]
struct UrlRequest {
    url: String,
    choice: String,
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/configs", get(configs))
        .route("/api/visibility", post(update_visibility))
        .route("/api/split/upload", post(split_upload))
        .route("/api/split/url", post(split_url))
        .route("/api/progress", get(progress))
        .route("/stems/:token", get(stem_file))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: SharedState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.settings.server.host, state.settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Stem splitter UI on http://{}", addr);
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

/// GET / - the page.
async fn index(State(state): State<SharedState>) -> Html<String> {
    let device = state.separator.cache().backend().device().to_uppercase();
    Html(PAGE.replace("{{DEVICE}}", &device))
}

/// GET /api/configs - stem-count choices and the default one.
///
/// A choice whose model the backend has no weights for is flagged
/// unavailable, and the default falls to the first available choice.
async fn configs(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let backend = state.separator.cache().backend();
    let configs: Vec<ConfigView> = StemConfig::all()
        .iter()
        .map(|c| ConfigView {
            config: c,
            available: backend.provides(c.model),
        })
        .collect();
    let default = configs
        .iter()
        .find(|v| v.available)
        .map_or(StemConfig::default_choice(), |v| v.config);
    Json(json!({
        "default": default.label,
        "configs": configs,
    }))
}

/// POST /api/visibility - show/hide slots for a new selection.
async fn update_visibility(Json(req): Json<ChoiceRequest>) -> Result<Json<Vec<SlotView>>, ApiError> {
    let config = StemConfig::from_label(&req.choice)?;
    let views = slots::visibility(config)
        .into_iter()
        .map(|u| SlotView {
            index: u.index,
            visible: u.visible,
            label: u.label,
            url: None,
        })
        .collect();
    Ok(Json(views))
}

/// POST /api/split/upload - multipart `audio` file plus `choice`.
async fn split_upload(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<SlotView>>, ApiError> {
    let mut choice: Option<String> = None;
    let mut upload: Option<(String, axum::body::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("choice") => {
                choice = Some(field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?);
            }
            Some("audio") => {
                let name = field.file_name().unwrap_or("upload.wav").to_string();
                let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                upload = Some((name, bytes));
            }
            _ => {}
        }
    }

    let config = match choice {
        Some(label) => StemConfig::from_label(&label)?,
        None => StemConfig::default_choice(),
    };
    let (name, bytes) = match upload {
        Some((name, bytes)) if !bytes.is_empty() => (name, bytes),
        _ => return Err(StemError::NoAudio.into()),
    };

    let path = store_upload(&state.settings.upload_dir, &name, &bytes).await?;
    info!(path = %path.display(), bytes = bytes.len(), "stored upload");
    run_split(state, AudioSource::Upload(path), config).await
}

/// POST /api/split/url - `{ url, choice }`.
async fn split_url(
    State(state): State<SharedState>,
    Json(req): Json<UrlRequest>,
) -> Result<Json<Vec<SlotView>>, ApiError> {
    let config = StemConfig::from_label(&req.choice)?;
    if req.url.trim().is_empty() {
        return Err(StemError::MissingUrl.into());
    }
    run_split(state, AudioSource::Remote(req.url), config).await
}

/// GET /api/progress - last progress seen from the running job.
async fn progress(State(state): State<SharedState>) -> Json<ProgressSnapshot> {
    let snap = state.progress.lock().unwrap_or_else(|e| e.into_inner()).clone();
    Json(snap)
}

/// GET /stems/:token - a produced stem.
async fn stem_file(
    State(state): State<SharedState>,
    UrlPath(token): UrlPath<Uuid>,
) -> Result<Response, ApiError> {
    let path = state.stem_path(&token).ok_or(ApiError::NotFound)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Stem(e.into()))?;
    Ok(([(header::CONTENT_TYPE, "audio/wav")], bytes).into_response())
}

async fn run_split(
    state: SharedState,
    source: AudioSource,
    config: &'static StemConfig,
) -> Result<Json<Vec<SlotView>>, ApiError> {
    let _job = state.job.lock().await;
    *state.progress.lock().unwrap_or_else(|e| e.into_inner()) = ProgressSnapshot {
        running: true,
        ..ProgressSnapshot::default()
    };

    let worker = Arc::clone(&state);
    let result = task::spawn_blocking(move || {
        let path = source.resolve(worker.downloader.as_ref(), &worker.settings.download_dir)?;
        let report = |p: SplitProgress| worker.record_progress(p);
        worker.separator.separate(Some(&path), config, &report)
    })
    .await;
    state.finish_progress();

    let stems = match result {
        Ok(res) => res?,
        Err(e) => return Err(ApiError::Internal(format!("Task error: {e}"))),
    };
    Ok(Json(state.publish(slots::render(&stems, config))))
}

async fn store_upload(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, ApiError> {
    let file_name = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.wav");
    let path = dir.join(format!("{}-{}", Uuid::new_v4(), file_name));
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ApiError::Stem(e.into()))?;
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| ApiError::Stem(e.into()))?;
    Ok(path)
}

#[derive(Debug)]
pub enum ApiError {
    Stem(StemError),
    BadRequest(String),
    NotFound,
    Internal(String),
}

impl From<StemError> for ApiError {
    fn from(e: StemError) -> Self {
        ApiError::Stem(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Stem(e) => {
                let status = match &e {
                    e if e.is_user_input() => StatusCode::BAD_REQUEST,
                    StemError::DownloadFailed | StemError::Downloader(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        if status.is_server_error() {
            error!(%status, "{message}");
        } else {
            info!(%status, "rejected: {message}");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
