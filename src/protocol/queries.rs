//! Query strings accepted by the HTTP endpoints

use serde::Deserialize;

use crate::error::AppError;
use crate::utils;

/// `GET /info?url=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfoQuery {
    #[serde(default)]
    pub url: Option<String>,
}

impl InfoQuery {
    pub fn url(&self) -> Result<&str, AppError> {
        require_url(self.url.as_deref())
    }
}

/// `GET /download-mp4`, `/download-mp3` and `/download-mp3-hq`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub itag: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl DownloadQuery {
    pub fn url(&self) -> Result<&str, AppError> {
        require_url(self.url.as_deref())
    }

    /// Requested format id, `None` when absent or blank
    pub fn itag(&self) -> Result<Option<&str>, AppError> {
        match self.itag.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(itag) if utils::is_valid_format_id(itag) => Ok(Some(itag)),
            Some(itag) => Err(AppError::InvalidFormat(itag.to_string())),
        }
    }

    pub fn title_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title,
            _ => fallback,
        }
    }
}

fn require_url(url: Option<&str>) -> Result<&str, AppError> {
    let url = url.map(str::trim).unwrap_or("");
    if url.is_empty() {
        return Err(AppError::MissingUrl);
    }
    if !utils::is_http_url(url) {
        return Err(AppError::InvalidUrl);
    }
    Ok(url)
}
