//! Typed view of `yt-dlp -J` output and the format table built from it

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::protocol::{VideoFormat, VideoInfo};

/// Subset of yt-dlp's info dict that the page needs
#[derive(Debug, Deserialize)]
pub struct RawVideoInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFormat {
    pub format_id: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub tbr: Option<f64>,
}

impl RawFormat {
    fn vcodec(&self) -> &str {
        self.vcodec.as_deref().unwrap_or("none")
    }

    fn has_video(&self) -> bool {
        self.vcodec() != "none"
    }

    fn height(&self) -> u32 {
        self.height.unwrap_or(0)
    }

    /// Rank within one resolution: H.264 first, then bitrate
    fn score(&self) -> i64 {
        let codec_score = if self.vcodec().contains("avc") { 1000.0 } else { 0.0 };
        (codec_score + self.tbr.unwrap_or(0.0)) as i64
    }

    /// Rank across resolutions, for sources with no video-only formats
    fn combined_score(&self) -> i64 {
        i64::from(self.height()) * 1000 + self.tbr.unwrap_or(0.0) as i64
    }

    fn quality_label(&self) -> String {
        let fps = self.fps.unwrap_or(30.0).round() as u32;
        if fps > 30 {
            format!("{}p{}", self.height(), fps)
        } else {
            format!("{}p", self.height())
        }
    }

    fn to_video_format(&self, label: String) -> VideoFormat {
        VideoFormat {
            itag: self.format_id.clone(),
            quality_label: label,
            container: self.ext.clone().unwrap_or_else(|| "mp4".to_string()),
        }
    }
}

impl RawVideoInfo {
    pub fn into_video_info(self) -> VideoInfo {
        let formats = select_formats(&self.formats);
        VideoInfo::new(
            self.title.unwrap_or_else(|| "Unknown".to_string()),
            self.thumbnail.unwrap_or_default(),
            formats,
        )
    }
}

/// One entry per resolution, highest first
pub fn select_formats(formats: &[RawFormat]) -> Vec<VideoFormat> {
    let mut by_height: BTreeMap<u32, Vec<&RawFormat>> = BTreeMap::new();

    for fmt in formats {
        // Skip audio-only and AV1
        if !fmt.has_video() || fmt.vcodec().contains("av01") {
            continue;
        }
        if fmt.height() > 0 {
            by_height.entry(fmt.height()).or_default().push(fmt);
        }
    }

    let mut selected: Vec<VideoFormat> = by_height
        .values()
        .rev()
        .filter_map(|fmts| fmts.iter().max_by_key(|f| f.score()))
        .map(|fmt| fmt.to_video_format(fmt.quality_label()))
        .collect();

    // Fallback: no usable video-only formats, offer the best combined one
    if selected.is_empty() {
        let best = formats
            .iter()
            .filter(|f| f.has_video())
            .max_by_key(|f| f.combined_score());

        if let Some(fmt) = best {
            let label = if fmt.height() > 0 {
                format!("Best available ({})", fmt.quality_label())
            } else {
                "Best available".to_string()
            };
            selected.push(fmt.to_video_format(label));
        }
    }

    selected
}
