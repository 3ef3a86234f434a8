//! Tubely Server
//!
//! HTTP backend for the Tubely downloader page. Looks up video formats and
//! streams MP4/MP3 downloads by running yt-dlp, one process per request.

mod download;
mod error;
mod protocol;
mod server;
mod utils;

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Tubely Server - YouTube format lookup and download streaming via yt-dlp
#[derive(Parser, Debug)]
#[command(name = "tubely-server")]
#[command(about = "HTTP backend for Tubely: fetches video formats and streams downloads through yt-dlp")]
#[command(version)]
struct Args {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "4000")]
    port: u16,

    /// yt-dlp binary (defaults to ./yt-dlp, then PATH)
    #[arg(long, env = "YT_DLP_PATH")]
    ytdlp_path: Option<PathBuf>,

    /// ffmpeg binary or directory handed to yt-dlp
    #[arg(long, env = "FFMPEG_PATH")]
    ffmpeg_path: Option<PathBuf>,

    /// Seconds to wait for `yt-dlp -J` before giving up
    #[arg(long, default_value = "120")]
    info_timeout_secs: u64,

    /// Run in background (no banner)
    #[arg(long)]
    background: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::builder()
        .with_default_directive(parse_level(level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Values from .env feed the `env =` fallbacks below
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log_level);

    let work_dir = std::env::current_dir()?;
    let ffmpeg_path = download::find_ffmpeg(args.ffmpeg_path);
    let system_ffmpeg = which::which("ffmpeg").ok();
    let deno_path = download::find_deno();

    if ffmpeg_path.is_none() && system_ffmpeg.is_none() {
        warn!("ffmpeg not found. Audio merging and MP3 conversion may fail.");
    }

    let config = server::ServerConfig {
        host: args.host,
        port: args.port,
        ytdlp_path: args.ytdlp_path,
        ffmpeg_path,
        deno_path,
        work_dir,
        info_timeout: Duration::from_secs(args.info_timeout_secs),
    };

    if !args.background {
        let locator = download::YtDlpLocator::new(config.ytdlp_path.clone(), &config.work_dir);
        let ytdlp = locator
            .locate()
            .map(|p| format!("{} [OK]", p.display()))
            .unwrap_or_else(|| "NOT FOUND".to_string());
        let ffmpeg = config
            .ffmpeg_path
            .as_ref()
            .or(system_ffmpeg.as_ref())
            .map(|p| format!("{} [OK]", p.display()))
            .unwrap_or_else(|| "NOT FOUND".to_string());

        println!();
        println!("========================================================");
        println!("  Tubely Server v{}", env!("CARGO_PKG_VERSION"));
        println!("========================================================");
        println!("  HTTP:      http://{}:{}", config.host, config.port);
        println!("  yt-dlp:    {}", ytdlp);
        println!("  ffmpeg:    {}", ffmpeg);
        println!("  deno:      {}", if config.deno_path.is_some() { "OK" } else { "not found (optional)" });
        println!("========================================================");
        println!();
    }

    if let Err(e) = server::run(config).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
