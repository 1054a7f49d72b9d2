//! # API REST
//!
//! HTTP surface of the Depot file store.
//!
//! Handles:
//! - upload, download, move and delete of files with axum
//! - checksum lookups and the backup/restore protocol (`/get_meta`, `/set_meta`)
//! - OpenAPI documentation at `/api-docs/openapi.json`
//! - static serving of the store root for every other path
//!
//! Every handler that touches the engine runs it on the blocking pool, since index scans and
//! disk writes are synchronous.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path as AxumPath, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use depot_core::{
    DepotError, DepotResult, FileId, FileRecord, FilesError, MetadataEngine, RelativePath,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use utoipa::{IntoParams, OpenApi, ToSchema};

/// Upload limit used when none is configured (100 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MetadataEngine>,
    /// Store root, used for file downloads and static serving
    pub root: PathBuf,
}

impl AppState {
    pub fn new(engine: MetadataEngine, root: PathBuf) -> Self {
        Self {
            engine: Arc::new(engine),
            root,
        }
    }
}

/// Plain status response; `error` is set when `ok` is false.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Base {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Base {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub ok: bool,
    pub message: String,
}

/// A stored file as exchanged over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileDto {
    pub path: String,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl From<FileRecord> for FileDto {
    fn from(record: FileRecord) -> Self {
        Self {
            path: record.path.to_string(),
            identifier: record.identifier.to_string(),
            checksum: record.checksum.map(|c| c.to_string()),
        }
    }
}

/// Result of a bulk upload or a metadata dump.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PutResponse {
    pub ok: bool,
    pub files: Vec<FileDto>,
    pub errors: Vec<String>,
}

/// Result of a metadata restore.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SetMetaResponse {
    pub ok: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChecksumResponse {
    pub ok: bool,
    pub file: String,
    pub sha256sum: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IdQuery {
    /// File identifier
    pub id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MoveQuery {
    /// Current path; takes precedence over `id`
    pub oldpath: Option<String>,
    /// Identifier of the file to move
    pub id: Option<String>,
    pub newpath: Option<String>,
}

type ApiError = (StatusCode, Json<Base>);

fn fail(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(Base {
            ok: false,
            error: Some(message.into()),
        }),
    )
}

fn status_for(error: &DepotError) -> StatusCode {
    match error {
        DepotError::InvalidInput(_) | DepotError::Path(_) => StatusCode::BAD_REQUEST,
        DepotError::ChecksumNotFound { .. } => StatusCode::NOT_FOUND,
        DepotError::Files(FilesError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            StatusCode::NOT_FOUND
        }
        DepotError::MissingIdentity { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn depot_error(error: DepotError) -> ApiError {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!("{}", error);
    } else {
        tracing::debug!("{}", error);
    }
    fail(status, error.to_string())
}

/// Runs `op` against the engine on the blocking pool.
async fn with_engine<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&MetadataEngine) -> DepotResult<T> + Send + 'static,
{
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || op(&engine))
        .await
        .map_err(|e| {
            tracing::error!("engine task failed: {}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, "engine task failed")
        })?
        .map_err(depot_error)
}

fn parse_id(raw: Option<String>, missing: &'static str) -> Result<FileId, ApiError> {
    let raw = raw
        .filter(|s| !s.is_empty())
        .ok_or_else(|| fail(StatusCode::BAD_REQUEST, missing))?;
    FileId::parse(&raw).map_err(|e| fail(StatusCode::BAD_REQUEST, e.to_string()))
}

fn parse_path(raw: &str) -> Result<RelativePath, ApiError> {
    RelativePath::new(raw).map_err(|e| fail(StatusCode::BAD_REQUEST, e.to_string()))
}

/// Resolves an identifier to its current path, 404 when unknown.
async fn path_for_id(state: &AppState, id: FileId) -> Result<RelativePath, ApiError> {
    let lookup = id.clone();
    with_engine(state, move |engine| engine.path_of(&lookup))
        .await?
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, format!("no path with id {}", id)))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        get_file,
        put_root,
        put_dir,
        del_by_id,
        del_by_path,
        move_file,
        checksum_by_id,
        checksum_by_path,
        get_meta,
        set_meta,
    ),
    components(schemas(
        Base,
        HealthResponse,
        FileDto,
        PutResponse,
        SetMetaResponse,
        ChecksumResponse,
    ))
)]
pub struct ApiDoc;

/// Builds the full router.
///
/// Paths not claimed by an endpoint are served from the store root.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let static_files = ServeDir::new(&state.root);

    Router::new()
        .route("/health", get(health))
        .route("/get", get(get_file))
        .route("/put", post(put_root))
        .route("/put/*dir", post(put_dir))
        .route("/del", get(del_by_id))
        .route("/del/*path", get(del_by_path))
        .route("/move", get(move_file))
        .route("/sha256sum", get(checksum_by_id))
        .route("/sha256sum/*path", get(checksum_by_path))
        .route("/get_meta", get(get_meta))
        .route("/set_meta", post(set_meta))
        .route("/api-docs/openapi.json", get(openapi_json))
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthResponse)
    )
)]
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        message: "Depot is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/get",
    params(IdQuery),
    responses(
        (status = 200, description = "File content"),
        (status = 400, description = "Missing or invalid id", body = Base),
        (status = 404, description = "Unknown id", body = Base)
    )
)]
/// Downloads the file addressed by `id`.
#[axum::debug_handler]
async fn get_file(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
    request: Request,
) -> Result<Response, ApiError> {
    let id = parse_id(query.id, "missing id query parameter")?;
    let path = path_for_id(&state, id).await?;

    match ServeFile::new(path.under(&state.root)).oneshot(request).await {
        Ok(response) => Ok(response.into_response()),
        Err(never) => match never {},
    }
}

#[utoipa::path(
    post,
    path = "/put",
    responses(
        (status = 200, description = "Per-file results", body = PutResponse),
        (status = 400, description = "No file provided", body = Base)
    )
)]
/// Uploads files into the store root.
#[axum::debug_handler]
async fn put_root(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PutResponse>, ApiError> {
    put_files(&state, None, multipart).await
}

#[utoipa::path(
    post,
    path = "/put/{dir}",
    params(("dir" = String, Path, description = "Target directory")),
    responses(
        (status = 200, description = "Per-file results", body = PutResponse),
        (status = 400, description = "No file provided or invalid directory", body = Base)
    )
)]
/// Uploads files into `dir`.
#[axum::debug_handler]
async fn put_dir(
    State(state): State<AppState>,
    AxumPath(dir): AxumPath<String>,
    multipart: Multipart,
) -> Result<Json<PutResponse>, ApiError> {
    let dir = parse_path(&dir)?;
    put_files(&state, Some(dir), multipart).await
}

/// Stores every file part at `dir/<basename>`.
///
/// Parts whose name contains `.` or `..` components are reported in `errors`; the rest are
/// stored in parallel.
async fn put_files(
    state: &AppState,
    dir: Option<RelativePath>,
    mut multipart: Multipart,
) -> Result<Json<PutResponse>, ApiError> {
    let mut files = Vec::new();
    let mut errors = Vec::new();
    let mut parts = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| fail(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        parts += 1;

        let content = field
            .bytes()
            .await
            .map_err(|e| fail(StatusCode::BAD_REQUEST, e.to_string()))?;

        let path = RelativePath::new(&file_name).and_then(|name| match &dir {
            Some(dir) => dir.join(name.file_name()),
            None => RelativePath::new(name.file_name()),
        });
        match path {
            Ok(path) => files.push((path, content.to_vec())),
            Err(e) => errors.push(format!("{}: {}", file_name, e)),
        }
    }

    if parts == 0 {
        return Err(fail(StatusCode::BAD_REQUEST, "no file provided"));
    }

    let outcome = with_engine(state, move |engine| Ok(engine.store_many(files))).await?;
    errors.extend(
        outcome
            .errors
            .into_iter()
            .map(|failure| format!("{}: {}", failure.path, failure.error)),
    );

    Ok(Json(PutResponse {
        ok: errors.is_empty(),
        files: outcome.files.into_iter().map(FileDto::from).collect(),
        errors,
    }))
}

fn prefix_response(report: depot_core::PrefixReport) -> Json<Base> {
    if report.is_clean() {
        return Json(Base::ok());
    }
    let message = report
        .failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    Json(Base {
        ok: false,
        error: Some(message),
    })
}

#[utoipa::path(
    get,
    path = "/del",
    params(IdQuery),
    responses(
        (status = 200, description = "Deleted", body = Base),
        (status = 404, description = "Unknown id", body = Base)
    )
)]
/// Deletes the file addressed by `id`.
#[axum::debug_handler]
async fn del_by_id(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Base>, ApiError> {
    let id = parse_id(query.id, "missing id query parameter or path")?;
    let path = path_for_id(&state, id).await?;
    let report = with_engine(&state, move |engine| engine.delete(&path)).await?;
    Ok(prefix_response(report))
}

#[utoipa::path(
    get,
    path = "/del/{path}",
    params(("path" = String, Path, description = "File or directory to delete")),
    responses(
        (status = 200, description = "Deleted", body = Base),
        (status = 400, description = "Invalid path", body = Base)
    )
)]
/// Deletes a file or a whole directory.
#[axum::debug_handler]
async fn del_by_path(
    State(state): State<AppState>,
    AxumPath(path): AxumPath<String>,
) -> Result<Json<Base>, ApiError> {
    let path = parse_path(&path)?;
    let report = with_engine(&state, move |engine| engine.delete(&path)).await?;
    Ok(prefix_response(report))
}

#[utoipa::path(
    get,
    path = "/move",
    params(MoveQuery),
    responses(
        (status = 200, description = "Moved", body = Base),
        (status = 400, description = "Missing parameters", body = Base),
        (status = 404, description = "Unknown id or source", body = Base)
    )
)]
/// Moves a file or directory, addressed by `oldpath` or `id`, to `newpath`.
#[axum::debug_handler]
async fn move_file(
    State(state): State<AppState>,
    Query(query): Query<MoveQuery>,
) -> Result<Json<Base>, ApiError> {
    let old = match query.oldpath.filter(|s| !s.is_empty()) {
        Some(old) => parse_path(&old)?,
        None => {
            let id = parse_id(query.id, "missing either oldpath or id query parameter")?;
            path_for_id(&state, id).await?
        }
    };
    let new = query
        .newpath
        .filter(|s| !s.is_empty())
        .ok_or_else(|| fail(StatusCode::BAD_REQUEST, "missing newpath query parameter"))?;
    let new = parse_path(&new)?;

    let report = with_engine(&state, move |engine| engine.move_path(&old, &new)).await?;
    Ok(prefix_response(report))
}

async fn checksum_response(
    state: &AppState,
    path: RelativePath,
) -> Result<Json<ChecksumResponse>, ApiError> {
    let lookup = path.clone();
    let checksum = with_engine(state, move |engine| engine.checksum_of(&lookup))
        .await?
        .ok_or_else(|| {
            fail(
                StatusCode::NOT_FOUND,
                format!("no checksum stored for '{}'", path),
            )
        })?;

    Ok(Json(ChecksumResponse {
        ok: true,
        file: path.to_string(),
        sha256sum: checksum.to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/sha256sum",
    params(IdQuery),
    responses(
        (status = 200, description = "Stored checksum", body = ChecksumResponse),
        (status = 404, description = "Unknown id or no checksum", body = Base)
    )
)]
#[axum::debug_handler]
async fn checksum_by_id(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<ChecksumResponse>, ApiError> {
    let id = parse_id(query.id, "missing id query parameter or path")?;
    let path = path_for_id(&state, id).await?;
    checksum_response(&state, path).await
}

#[utoipa::path(
    get,
    path = "/sha256sum/{path}",
    params(("path" = String, Path, description = "Stored file path")),
    responses(
        (status = 200, description = "Stored checksum", body = ChecksumResponse),
        (status = 404, description = "No checksum", body = Base)
    )
)]
#[axum::debug_handler]
async fn checksum_by_path(
    State(state): State<AppState>,
    AxumPath(path): AxumPath<String>,
) -> Result<Json<ChecksumResponse>, ApiError> {
    let path = parse_path(&path)?;
    checksum_response(&state, path).await
}

#[utoipa::path(
    get,
    path = "/get_meta",
    responses(
        (status = 200, description = "Every indexed file", body = PutResponse),
        (status = 500, description = "Identity index unreadable", body = Base)
    )
)]
/// Dumps both indices for backup.
#[axum::debug_handler]
async fn get_meta(State(state): State<AppState>) -> Result<Json<PutResponse>, ApiError> {
    let outcome = with_engine(&state, |engine| engine.dump()).await?;
    let errors: Vec<String> = outcome.errors.iter().map(ToString::to_string).collect();

    Ok(Json(PutResponse {
        ok: errors.is_empty(),
        files: outcome.records.into_iter().map(FileDto::from).collect(),
        errors,
    }))
}

#[utoipa::path(
    post,
    path = "/set_meta",
    request_body = Vec<FileDto>,
    responses(
        (status = 200, description = "Restore result", body = SetMetaResponse)
    )
)]
/// Loads a backup into both indices.
#[axum::debug_handler]
async fn set_meta(
    State(state): State<AppState>,
    Json(records): Json<Vec<FileRecord>>,
) -> Result<Json<SetMetaResponse>, ApiError> {
    let failures = with_engine(&state, move |engine| Ok(engine.restore(&records))).await?;
    let errors: Vec<String> = failures.iter().map(ToString::to_string).collect();

    Ok(Json(SetMetaResponse {
        ok: errors.is_empty(),
        errors,
    }))
}
