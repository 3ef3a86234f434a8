//! JSON reply bodies

use serde::Serialize;

/// One row of the format table shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoFormat {
    pub itag: String,
    pub quality_label: String,
    pub container: String,
}

/// `GET /info` reply
#[derive(Debug, Clone, Serialize)]
pub struct VideoInfo {
    pub success: bool,
    pub title: String,
    pub thumbnail: String,
    pub formats: Vec<VideoFormat>,
}

impl VideoInfo {
    pub fn new(title: impl Into<String>, thumbnail: impl Into<String>, formats: Vec<VideoFormat>) -> Self {
        Self {
            success: true,
            title: title.into(),
            thumbnail: thumbnail.into(),
            formats,
        }
    }
}

/// Body of every non-2xx reply
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
            code: code.into(),
        }
    }
}

/// `GET /health` reply
#[derive(Debug, Clone, Serialize)]
pub struct HealthInfo {
    pub ok: bool,
    pub version: String,
    pub ytdlp: YtDlpStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct YtDlpStatus {
    pub available: bool,
    pub path: Option<String>,
    pub version: Option<String>,
}
