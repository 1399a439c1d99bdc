use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

const MIB: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No image uploaded")]
    MissingFile,
    #[error("Only JPG, PNG, GIF, and WEBP images are allowed.")]
    UnsupportedType,
    #[error("File too large. Max size is {}.", human_size(.max_bytes))]
    PayloadTooLarge { max_bytes: usize },
    #[error("Invalid image file (corrupted or fake)")]
    InvalidImage,
    #[error("Upload failed")]
    Internal(String),
}

impl ApiError {
    pub fn internal(detail: impl ToString) -> Self {
        ApiError::Internal(detail.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile | ApiError::UnsupportedType | ApiError::InvalidImage => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::internal(err)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::internal(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.to_string();

        let detail = match self {
            ApiError::Internal(detail) => Some(detail),
            _ => None,
        };

        (status, Json(ErrorBody { error, detail })).into_response()
    }
}

fn human_size(bytes: &usize) -> String {
    let bytes = *bytes;
    if bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}
