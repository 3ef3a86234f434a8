//! Video download module using yt-dlp

mod formats;
mod kind;
mod stream;
mod ytdlp;

pub use kind::DownloadKind;
pub use ytdlp::{find_deno, find_ffmpeg, runtime_args, YtDlp, YtDlpLocator};

#[cfg(all(test, unix))]
pub(crate) use ytdlp::tests::fake_ytdlp;
