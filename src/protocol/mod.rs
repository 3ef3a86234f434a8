//! Protocol module - query strings, JSON replies and error codes

mod queries;
mod replies;

pub use queries::*;
pub use replies::*;

/// Cookie set on every download so the page can tell the transfer has begun
pub const DOWNLOAD_STATUS_COOKIE: &str = "download-status=starting; Path=/";

/// Error codes
pub mod error_codes {
    pub const MISSING_URL: &str = "MISSING_URL";
    pub const INVALID_URL: &str = "INVALID_URL";
    pub const INVALID_FORMAT: &str = "INVALID_FORMAT";
    pub const INVALID_QUERY: &str = "INVALID_QUERY";
    pub const YTDLP_NOT_FOUND: &str = "YTDLP_NOT_FOUND";
    pub const YTDLP_FAILED: &str = "YTDLP_FAILED";
    pub const INVALID_JSON: &str = "INVALID_JSON";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const METHOD_NOT_ALLOWED: &str = "METHOD_NOT_ALLOWED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}
