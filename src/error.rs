use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde_json::json;
use axum::Json;
use polars::prelude::PolarsError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Unsupported file type: {0} (expected .csv or .xlsx)")]
    UnsupportedFileType(String),
    #[error("File processing error: {0}")]
    FileProcessingError(String),
    #[error("DataFrame error: {0}")]
    DataFrameError(String),
    #[error("Table from {file} has no 'date' column to merge on")]
    MissingJoinKey { file: String },
    #[error("No files could be parsed, nothing to merge")]
    NoTables,
    #[error("Merge error: {0}")]
    MergeError(String),
    #[error("Nothing to render: {0}")]
    NothingToRender(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PolarsError> for AppError {
    fn from(err: PolarsError) -> Self {
        AppError::DataFrameError(err.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::ParseError(err.to_string())
    }
}

impl From<calamine::XlsxError> for AppError {
    fn from(err: calamine::XlsxError) -> Self {
        AppError::FileProcessingError(err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ParseError(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::FileProcessingError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DataFrameError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::MissingJoinKey { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NoTables => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::MergeError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NothingToRender(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
