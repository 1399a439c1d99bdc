use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Extension, Multipart,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::StatusCode,
    routing::{get, post},
};
use mime::Mime;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::config::AppConfig;
use crate::errors::ApiError;
use crate::inspect::{ImageInfo, inspect_image};
use crate::storage::{Storage, new_image_id, stored_filename};

/// Multipart field that carries the upload.
pub const FILE_FIELD: &str = "image";

/// Room for boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn Storage>,
}

impl AppState {
    pub fn new(config: AppConfig, storage: Arc<dyn Storage>) -> Self {
        Self {
            config: Arc::new(config),
            storage,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub url: String,
}

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_file_size.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload))
        .nest_service("/images", ServeDir::new(state.storage.root()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}

async fn health() -> &'static str {
    "OK"
}

async fn upload(
    Extension(state): Extension<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    // Not a multipart body at all, so there is no file in it either.
    let mut multipart = multipart.map_err(|_| ApiError::MissingFile)?;

    let mut pending = None;
    match receive(&state, &mut multipart, &mut pending).await {
        Ok(info) => {
            let filename = pending.take().map(PendingUpload::keep).unwrap_or_default();
            tracing::info!(
                filename = %filename,
                width = info.width,
                height = info.height,
                format = ?info.format,
                "Image uploaded"
            );
            Ok(Json(UploadResponse {
                message: "Image uploaded successfully",
                url: format!("/images/{filename}"),
            }))
        }
        Err(err) => {
            tracing::warn!(error = ?err, "Upload rejected");
            match pending.take() {
                Some(upload) => Err(upload.discard(err).await),
                None => Err(err),
            }
        }
    }
}

/// Runs the upload up to content verification. `pending` holds the stored
/// file from the moment it exists on disk.
async fn receive(
    state: &AppState,
    multipart: &mut Multipart,
    pending: &mut Option<PendingUpload>,
) -> Result<ImageInfo, ApiError> {
    let max_bytes = state.config.max_file_size;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| transport_error(e, max_bytes))?
    {
        // Parts without a filename are plain form values; an empty one is a
        // file input left blank.
        let Some(original_name) = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
        else {
            continue;
        };

        if field.name() != Some(FILE_FIELD) || pending.is_some() {
            return Err(ApiError::internal("Unexpected field"));
        }

        let declared = field.content_type().and_then(|ct| ct.parse::<Mime>().ok());
        if !declared.is_some_and(|mime| state.config.is_allowed(&mime)) {
            return Err(ApiError::UnsupportedType);
        }

        let filename = stored_filename(&new_image_id(), &original_name);
        let file = state.storage.create(&filename).await?;
        *pending = Some(PendingUpload::new(state.storage.clone(), filename));
        let size = write_field(field, file, max_bytes).await?;

        tracing::debug!(original_name = %original_name, size_bytes = size, "Upload written");
    }

    let filename = match pending {
        Some(upload) => upload.filename.clone(),
        None => return Err(ApiError::MissingFile),
    };
    let bytes = state.storage.read(&filename).await?;
    let info = tokio::task::spawn_blocking(move || inspect_image(&bytes))
        .await?
        .map_err(|err| {
            tracing::debug!(error = %err, "Stored upload failed to decode");
            ApiError::InvalidImage
        })?;

    Ok(info)
}

/// Streams a field into `file`, giving up once more than `max_bytes` arrive.
async fn write_field(
    mut field: Field<'_>,
    mut file: tokio::fs::File,
    max_bytes: usize,
) -> Result<usize, ApiError> {
    let mut size = 0usize;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| transport_error(e, max_bytes))?
    {
        size += chunk.len();
        if size > max_bytes {
            return Err(ApiError::PayloadTooLarge { max_bytes });
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(size)
}

fn transport_error(err: MultipartError, max_bytes: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge { max_bytes }
    } else {
        ApiError::internal(err.body_text())
    }
}

/// A stored file that is not yet accepted.
///
/// Dropping it while armed, e.g. when the client disconnects and the handler
/// future is cancelled, removes the file in a background task.
struct PendingUpload {
    storage: Arc<dyn Storage>,
    filename: String,
    armed: bool,
}

impl PendingUpload {
    fn new(storage: Arc<dyn Storage>, filename: String) -> Self {
        Self {
            storage,
            filename,
            armed: true,
        }
    }

    /// Accepts the file and returns its name.
    fn keep(mut self) -> String {
        self.armed = false;
        std::mem::take(&mut self.filename)
    }

    /// Removes a rejected upload. A failed removal replaces `cause`, since the
    /// file is still reachable under `/images`.
    async fn discard(mut self, cause: ApiError) -> ApiError {
        self.armed = false;
        match self.storage.delete(&self.filename).await {
            Ok(()) => cause,
            Err(err) => {
                tracing::error!(
                    filename = %self.filename,
                    error = ?err,
                    cause = %cause,
                    "Failed to remove rejected upload"
                );
                err
            }
        }
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let storage = self.storage.clone();
        let filename = std::mem::take(&mut self.filename);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match storage.delete(&filename).await {
                        Ok(()) => tracing::debug!(filename = %filename, "Removed abandoned upload"),
                        Err(err) => tracing::error!(
                            filename = %filename,
                            error = ?err,
                            "Failed to remove abandoned upload"
                        ),
                    }
                });
            }
            Err(_) => tracing::error!(
                filename = %filename,
                "No runtime to remove abandoned upload"
            ),
        }
    }
}
