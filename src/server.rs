//! HTTP surface for the video library
//!
//! Routes:
//! - `GET /video?id=<id>` (opaque mode) or `GET /video?path=<path>` (direct mode)
//! - `GET /api/videos` - the published library tree
//! - `POST /api/rescan` - rescan all roots in the background

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::config::PathMode;
use crate::error::StreamError;
use crate::index::{LibraryIndex, VideoLocator};
use crate::models::{LibraryNode, ScanReport};
use crate::scanner::TreeScanner;
use crate::stream::{VideoStream, VIDEO_CONTENT_TYPE};

/// Read buffer per streaming connection
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Scanner and published index, shared by every handler
pub struct VideoLibrary {
    scanner: TreeScanner,
    index: Arc<LibraryIndex>,
    scanning: AtomicBool,
}

impl VideoLibrary {
    pub fn new(scanner: TreeScanner) -> Self {
        let index = Arc::new(LibraryIndex::new(scanner.config().path_mode));
        Self {
            scanner,
            index,
            scanning: AtomicBool::new(false),
        }
    }

    pub fn index(&self) -> &Arc<LibraryIndex> {
        &self.index
    }

    pub fn scanner(&self) -> &TreeScanner {
        &self.scanner
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// Reserve the right to scan; `None` while another scan is running
    pub fn begin_scan(self: &Arc<Self>) -> Option<ScanPermit> {
        self.scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ScanPermit {
                library: Arc::clone(self),
            })
    }

    /// Scan now and publish, unless a scan is already running
    pub fn rescan(self: &Arc<Self>) -> Option<ScanReport> {
        self.begin_scan().map(ScanPermit::run)
    }
}

/// Exclusive right to run one scan; released on drop
pub struct ScanPermit {
    library: Arc<VideoLibrary>,
}

impl ScanPermit {
    /// Scan all roots and publish the result. Blocks the calling thread.
    pub fn run(self) -> ScanReport {
        let mut report = self.library.scanner.scan_roots();
        let roots = std::mem::take(&mut report.roots);
        self.library.index.publish(roots);
        report
    }
}

impl Drop for ScanPermit {
    fn drop(&mut self) {
        self.library.scanning.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct AppState {
    pub library: Arc<VideoLibrary>,
}

/// Query parameters of `GET /video`
#[derive(Debug, Default, Deserialize)]
pub struct VideoQuery {
    pub id: Option<String>,
    pub path: Option<String>,
}

impl VideoQuery {
    fn locator(self, mode: PathMode) -> Option<VideoLocator> {
        match mode {
            PathMode::Opaque => self.id.map(VideoLocator::Id),
            PathMode::Direct => self.path.map(VideoLocator::Path),
        }
    }
}

pub fn router(library: Arc<VideoLibrary>) -> Router {
    Router::new()
        .route("/video", get(stream_video))
        .route("/api/videos", get(list_videos))
        .route("/api/rescan", post(trigger_rescan))
        .with_state(AppState { library })
}

/// Bind `addr` and serve until Ctrl-C
pub async fn serve(library: Arc<VideoLibrary>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Server running at http://{}", listener.local_addr()?);
    axum::serve(listener, router(library))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}

async fn stream_video(
    State(state): State<AppState>,
    Query(query): Query<VideoQuery>,
    headers: HeaderMap,
) -> Response {
    match open_requested(&state, query, &headers).await {
        Ok(stream) => video_response(stream),
        Err(e) => e.into_response(),
    }
}

async fn open_requested(
    state: &AppState,
    query: VideoQuery,
    headers: &HeaderMap,
) -> Result<VideoStream, StreamError> {
    let index = state.library.index();
    let path = query
        .locator(index.mode())
        .and_then(|locator| index.locate(&locator))
        .ok_or(StreamError::NotFound)?;
    log::debug!("Streaming {:?}", path);

    let range = headers
        .get(header::RANGE)
        .map(|v| {
            v.to_str().map_err(|_| {
                StreamError::InvalidRange(String::from_utf8_lossy(v.as_bytes()).into())
            })
        })
        .transpose()?;
    VideoStream::open(&path, range).await
}

fn video_response(stream: VideoStream) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(VIDEO_CONTENT_TYPE));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(stream.content_length()));

    let status = match stream.content_range() {
        Some(content_range) => {
            if let Ok(value) = HeaderValue::from_str(&content_range) {
                headers.insert(header::CONTENT_RANGE, value);
            }
            headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            StatusCode::PARTIAL_CONTENT
        }
        None => StatusCode::OK,
    };

    let body = Body::from_stream(ReaderStream::with_capacity(
        stream.into_reader(),
        STREAM_CHUNK_SIZE,
    ));
    (status, headers, body).into_response()
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        let status = match &self {
            StreamError::NotFound => StatusCode::NOT_FOUND,
            StreamError::InvalidRange(_) => StatusCode::BAD_REQUEST,
            StreamError::Unsatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            StreamError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("Stream request failed: {}", self);
        } else {
            log::warn!("Stream request rejected: {}", self);
        }

        let mut headers = HeaderMap::new();
        if let StreamError::Unsatisfiable { size } = &self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                headers.insert(header::CONTENT_RANGE, value);
            }
        }
        (status, headers, self.to_string()).into_response()
    }
}

async fn list_videos(State(state): State<AppState>) -> Json<Vec<LibraryNode>> {
    let snapshot = state.library.index().current_snapshot();
    Json(snapshot.roots().to_vec())
}

async fn trigger_rescan(State(state): State<AppState>) -> StatusCode {
    let Some(permit) = state.library.begin_scan() else {
        return StatusCode::CONFLICT;
    };
    tokio::task::spawn_blocking(move || {
        let report = permit.run();
        if report.error_count() > 0 {
            log::warn!("Rescan finished with {} errors", report.error_count());
        }
    });
    StatusCode::ACCEPTED
}
