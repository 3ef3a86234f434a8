//! Download flavours offered by the HTTP endpoints

/// Selector used when `/download-mp4` is called without an itag
pub const DEFAULT_VIDEO_SELECTOR: &str = "bv*[ext=mp4]+ba[ext=m4a]/b[ext=mp4]/bv*+ba/b";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadKind {
    /// Video format `itag` muxed with the best audio into MP4
    Mp4 { itag: Option<String> },
    /// 128 kbps MP3
    Mp3,
    /// 320 kbps MP3
    Mp3Hq,
}

impl DownloadKind {
    pub fn label(&self) -> &'static str {
        match self {
            DownloadKind::Mp4 { .. } => "mp4",
            DownloadKind::Mp3 => "mp3",
            DownloadKind::Mp3Hq => "mp3-hq",
        }
    }

    /// Value for yt-dlp's `-f`
    pub fn format_selector(&self) -> String {
        match self {
            DownloadKind::Mp4 { itag: Some(itag) } => format!("{}+ba", itag),
            DownloadKind::Mp4 { itag: None } => DEFAULT_VIDEO_SELECTOR.to_string(),
            DownloadKind::Mp3 | DownloadKind::Mp3Hq => "ba".to_string(),
        }
    }

    /// Post-processing args following the selector.
    /// yt-dlp's `--audio-quality` is VBR: 0 is best (~320k), 5 is ~128k.
    pub fn extra_args(&self) -> &'static [&'static str] {
        match self {
            DownloadKind::Mp4 { .. } => &["--merge-output-format", "mp4"],
            DownloadKind::Mp3 => &["-x", "--audio-format", "mp3", "--audio-quality", "5"],
            DownloadKind::Mp3Hq => &["-x", "--audio-format", "mp3", "--audio-quality", "0"],
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DownloadKind::Mp4 { .. } => "video/mp4",
            DownloadKind::Mp3 | DownloadKind::Mp3Hq => "audio/mpeg",
        }
    }

    pub fn default_title(&self) -> &'static str {
        match self {
            DownloadKind::Mp4 { .. } => "video",
            DownloadKind::Mp3 | DownloadKind::Mp3Hq => "audio",
        }
    }

    pub fn file_suffix(&self) -> &'static str {
        match self {
            DownloadKind::Mp4 { .. } => ".mp4",
            DownloadKind::Mp3 => " (128kbps).mp3",
            DownloadKind::Mp3Hq => " (320kbps).mp3",
        }
    }

    /// Percent-encoded title plus the kind's suffix, safe inside a quoted header value
    pub fn attachment_name(&self, title: &str) -> String {
        format!("{}{}", encode_uri_component(title), self.file_suffix())
    }
}

/// Percent-encoding that leaves `!'()*` readable, matching browsers' `encodeURIComponent`.
/// A literal `%` is encoded as `%25` first, so the restores below never hit it.
fn encode_uri_component(text: &str) -> String {
    urlencoding::encode(text)
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%2A", "*")
}
