//! Small helpers shared by the handlers

/// Only plain web URLs are handed to yt-dlp
pub fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// yt-dlp format ids are short tokens such as `137`, `hls-720p` or `dash_video`
pub fn is_valid_format_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// `Content-Disposition` value for a downloaded file.
///
/// `name` must already be header-safe; see `DownloadKind::attachment_name`.
pub fn content_disposition(name: &str) -> String {
    format!("attachment; filename=\"{}\"", name)
}

/// Last non-empty line of a process' stderr, used as the user-facing message
pub fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}
