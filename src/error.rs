//! Error handling for the server

use thiserror::Error;
use warp::http::StatusCode;

use crate::protocol::error_codes;

/// Request-level failure, carried through warp as a custom rejection
#[derive(Debug, Error)]
pub enum AppError {
    #[error("No URL provided")]
    MissingUrl,

    #[error("URL must start with http:// or https://")]
    InvalidUrl,

    #[error("Invalid format id: {0}")]
    InvalidFormat(String),

    #[error("yt-dlp is not ready yet, please try again in a few seconds.")]
    YtDlpUnavailable,

    #[error("yt-dlp failed ({status}): {message}")]
    YtDlpFailed { status: String, message: String },

    #[error("yt-dlp returned invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("yt-dlp did not finish within {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to build response: {0}")]
    Http(#[from] warp::http::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingUrl | AppError::InvalidUrl | AppError::InvalidFormat(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::YtDlpUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::YtDlpFailed { .. }
            | AppError::InvalidJson(_)
            | AppError::Io(_)
            | AppError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingUrl => error_codes::MISSING_URL,
            AppError::InvalidUrl => error_codes::INVALID_URL,
            AppError::InvalidFormat(_) => error_codes::INVALID_FORMAT,
            AppError::YtDlpUnavailable => error_codes::YTDLP_NOT_FOUND,
            AppError::YtDlpFailed { .. } => error_codes::YTDLP_FAILED,
            AppError::InvalidJson(_) => error_codes::INVALID_JSON,
            AppError::Timeout(_) => error_codes::TIMEOUT,
            AppError::Io(_) | AppError::Http(_) => error_codes::INTERNAL_ERROR,
        }
    }
}

impl warp::reject::Reject for AppError {}
