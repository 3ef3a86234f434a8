//! HTTP server implementation

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;
use warp::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, SET_COOKIE};
use warp::http::StatusCode;
use warp::hyper::Body;
use warp::{Filter, Rejection, Reply};

use crate::download::{self, DownloadKind, YtDlp, YtDlpLocator};
use crate::error::AppError;
use crate::protocol::{
    error_codes, DownloadQuery, ErrorResponse, HealthInfo, InfoQuery, YtDlpStatus,
    DOWNLOAD_STATUS_COOKIE,
};
use crate::utils;

/// Server configuration
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub deno_path: Option<PathBuf>,
    pub work_dir: PathBuf,
    pub info_timeout: Duration,
}

/// Shared application state
pub struct AppState {
    pub ytdlp: YtDlp,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        let locator = YtDlpLocator::new(config.ytdlp_path.clone(), &config.work_dir);
        Self {
            ytdlp: YtDlp::new(
                locator,
                config.ffmpeg_path.clone(),
                download::runtime_args(config.deno_path.as_deref()),
                config.info_timeout,
            ),
        }
    }
}

/// Run the HTTP server until Ctrl-C
pub async fn run(config: ServerConfig) -> Result<()> {
    let addr = SocketAddr::new(config.host, config.port);
    let state = Arc::new(AppState::new(&config));

    if state.ytdlp.locator().locate().is_none() {
        warn!("yt-dlp binary not found. Set YT_DLP_PATH or place yt-dlp in the working directory");
    }

    let (bound, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested, stopping server...");
        })?;

    info!("HTTP server listening on http://{}", bound);
    server.await;
    Ok(())
}

/// All routes with CORS, request tracing and JSON error replies
pub fn routes(state: Arc<AppState>) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(health);

    let info_route = warp::path("info")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<InfoQuery>())
        .and(with_state(state.clone()))
        .and_then(video_info);

    let mp4_route = warp::path("download-mp4")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<DownloadQuery>())
        .and(with_state(state.clone()))
        .and_then(download_mp4);

    let mp3_route = warp::path("download-mp3")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<DownloadQuery>())
        .and(with_state(state.clone()))
        .and_then(download_mp3);

    let mp3_hq_route = warp::path("download-mp3-hq")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<DownloadQuery>())
        .and(with_state(state))
        .and_then(download_mp3_hq);

    health_route
        .or(info_route)
        .or(mp4_route)
        .or(mp3_route)
        .or(mp3_hq_route)
        .recover(handle_rejection)
        .with(cors)
        .with(warp::trace::request())
}

fn with_state(state: Arc<AppState>) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

async fn health(state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    let path = state.ytdlp.locator().locate();
    let version = match path {
        Some(_) => state.ytdlp.version().await,
        None => None,
    };

    Ok(warp::reply::json(&HealthInfo {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        ytdlp: YtDlpStatus {
            available: version.is_some(),
            path: path.map(|p| p.display().to_string()),
            version,
        },
    }))
}

async fn video_info(query: InfoQuery, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let url = query.url().map_err(warp::reject::custom)?;
    info!("Fetching info for: {}", url);

    match state.ytdlp.fetch_info(url).await {
        Ok(info) => {
            info!("Found {} formats for \"{}\"", info.formats.len(), info.title);
            Ok(warp::reply::json(&info))
        }
        Err(e) => {
            warn!("Error fetching video info: {}", e);
            Err(warp::reject::custom(e))
        }
    }
}

async fn download_mp4(query: DownloadQuery, state: Arc<AppState>) -> Result<warp::reply::Response, Rejection> {
    stream_download(&state, &query, |q| {
        Ok(DownloadKind::Mp4 {
            itag: q.itag()?.map(str::to_string),
        })
    })
    .await
    .map_err(warp::reject::custom)
}

async fn download_mp3(query: DownloadQuery, state: Arc<AppState>) -> Result<warp::reply::Response, Rejection> {
    stream_download(&state, &query, |_| Ok(DownloadKind::Mp3))
        .await
        .map_err(warp::reject::custom)
}

async fn download_mp3_hq(query: DownloadQuery, state: Arc<AppState>) -> Result<warp::reply::Response, Rejection> {
    stream_download(&state, &query, |_| Ok(DownloadKind::Mp3Hq))
        .await
        .map_err(warp::reject::custom)
}

/// Validate, spawn yt-dlp and pipe its stdout into an attachment reply
async fn stream_download(
    state: &AppState,
    query: &DownloadQuery,
    kind: impl FnOnce(&DownloadQuery) -> Result<DownloadKind, AppError>,
) -> Result<warp::reply::Response, AppError> {
    let url = query.url()?;
    let kind = kind(query)?;
    let title = query.title_or(kind.default_title());

    let span = info_span!("download", job = %Uuid::new_v4(), kind = kind.label());
    async {
        info!("Downloading {} as {}", url, kind.label());

        let body = state.ytdlp.stream(&kind, url).await.map_err(|e| {
            warn!("Error downloading {}: {}", kind.label(), e);
            e
        })?;

        let response = warp::http::Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, kind.content_type())
            .header(CONTENT_DISPOSITION, utils::content_disposition(&kind.attachment_name(title)))
            .header(SET_COOKIE, DOWNLOAD_STATUS_COOKIE)
            .body(Body::wrap_stream(body))?;

        info!("Streaming \"{}\"", title);
        Ok::<_, AppError>(response)
    }
    .instrument(span)
    .await
}

/// Turn every rejection into the JSON error body
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, code, message) = if let Some(e) = err.find::<AppError>() {
        (e.status(), e.code(), e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, error_codes::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, error_codes::INVALID_QUERY, e.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, error_codes::NOT_FOUND, "Not found".to_string())
    } else {
        error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR, "Internal server error".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorResponse::new(code, message)),
        status,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn state_in(dir: &Path) -> Arc<AppState> {
        let locator = YtDlpLocator::new(None, dir).without_path_lookup();
        Arc::new(AppState {
            ytdlp: YtDlp::new(locator, None, vec![], Duration::from_secs(5)),
        })
    }

    fn json_body(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_missing_url_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let api = routes(state_in(dir.path()));

        for path in ["/info", "/download-mp4", "/download-mp3?title=x", "/download-mp3-hq?url="] {
            let res = warp::test::request().path(path).reply(&api).await;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{}", path);
            let body = json_body(res.body());
            assert_eq!(body["success"], false);
            assert_eq!(body["code"], error_codes::MISSING_URL);
            assert_eq!(body["error"], "No URL provided");
        }
    }

    #[tokio::test]
    async fn test_invalid_params_are_400() {
        let dir = tempfile::tempdir().unwrap();
        let api = routes(state_in(dir.path()));

        let res = warp::test::request().path("/info?url=-J").reply(&api).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res.body())["code"], error_codes::INVALID_URL);

        let res = warp::test::request()
            .path("/download-mp4?url=https%3A%2F%2Fyoutu.be%2Fabc&itag=137%2Bba")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res.body())["code"], error_codes::INVALID_FORMAT);
    }

    #[tokio::test]
    async fn test_missing_binary_is_503() {
        let dir = tempfile::tempdir().unwrap();
        let api = routes(state_in(dir.path()));

        for path in ["/info", "/download-mp4", "/download-mp3", "/download-mp3-hq"] {
            let res = warp::test::request()
                .path(&format!("{}?url=https%3A%2F%2Fyoutu.be%2Fabc", path))
                .reply(&api)
                .await;
            assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE, "{}", path);
            assert_eq!(json_body(res.body())["code"], error_codes::YTDLP_NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        let dir = tempfile::tempdir().unwrap();
        let api = routes(state_in(dir.path()));

        let res = warp::test::request().path("/nope").reply(&api).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(res.body())["code"], error_codes::NOT_FOUND);

        let res = warp::test::request().method("POST").path("/info").reply(&api).await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_health_without_binary() {
        let dir = tempfile::tempdir().unwrap();
        let api = routes(state_in(dir.path()));

        let res = warp::test::request().path("/health").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res.body());
        assert_eq!(body["ok"], true);
        assert_eq!(body["ytdlp"]["available"], false);
        assert!(body["ytdlp"]["path"].is_null());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_info_json_shape() {
        let dir = tempfile::tempdir().unwrap();
        download::fake_ytdlp(dir.path(), r#"cat <<'EOF'
{"title": "Never Gonna", "thumbnail": "https://i.ytimg.com/vi/abc/hq.jpg", "formats": [
  {"format_id": "140", "ext": "m4a", "vcodec": "none"},
  {"format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "height": 1080, "fps": 25, "tbr": 4000},
  {"format_id": "136", "ext": "mp4", "vcodec": "avc1.4d401f", "height": 720, "fps": 25, "tbr": 2000}
]}
EOF"#);
        let api = routes(state_in(dir.path()));

        let res = warp::test::request()
            .path("/info?url=https%3A%2F%2Fwww.youtube.com%2Fwatch%3Fv%3Dabc")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res.body()), serde_json::json!({
            "success": true,
            "title": "Never Gonna",
            "thumbnail": "https://i.ytimg.com/vi/abc/hq.jpg",
            "formats": [
                { "itag": "137", "qualityLabel": "1080p", "container": "mp4" },
                { "itag": "136", "qualityLabel": "720p", "container": "mp4" }
            ]
        }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_info_failure_is_500() {
        let dir = tempfile::tempdir().unwrap();
        download::fake_ytdlp(dir.path(), "echo 'ERROR: Unsupported URL' >&2; exit 1");
        let api = routes(state_in(dir.path()));

        let res = warp::test::request()
            .path("/info?url=https%3A%2F%2Fexample.com")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(res.body());
        assert_eq!(body["code"], error_codes::YTDLP_FAILED);
        assert!(body["error"].as_str().unwrap().ends_with("ERROR: Unsupported URL"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_streams_attachment() {
        let dir = tempfile::tempdir().unwrap();
        // Echo the argument vector back as the "file"
        download::fake_ytdlp(dir.path(), r#"printf '%s ' "$@""#);
        let api = routes(state_in(dir.path()));

        let res = warp::test::request()
            .path("/download-mp3-hq?url=https%3A%2F%2Fyoutu.be%2Fabc&title=My%20Song")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[CONTENT_TYPE], "audio/mpeg");
        assert_eq!(
            res.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"My%20Song (320kbps).mp3\""
        );
        assert_eq!(res.headers()[SET_COOKIE], DOWNLOAD_STATUS_COOKIE);

        let body = String::from_utf8(res.body().to_vec()).unwrap();
        assert_eq!(
            body.trim_end(),
            "-f ba -x --audio-format mp3 --audio-quality 0 --no-playlist --no-progress -o - -- https://youtu.be/abc"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_mp4_defaults() {
        let dir = tempfile::tempdir().unwrap();
        download::fake_ytdlp(dir.path(), r#"printf '%s ' "$@""#);
        let api = routes(state_in(dir.path()));

        let res = warp::test::request()
            .path("/download-mp4?url=https%3A%2F%2Fyoutu.be%2Fabc&itag=22")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[CONTENT_TYPE], "video/mp4");
        assert_eq!(res.headers()[CONTENT_DISPOSITION], "attachment; filename=\"video.mp4\"");
        let body = String::from_utf8(res.body().to_vec()).unwrap();
        assert!(body.starts_with("-f 22+ba --merge-output-format mp4 "));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_failure_before_output_is_500() {
        let dir = tempfile::tempdir().unwrap();
        download::fake_ytdlp(dir.path(), "echo 'ERROR: Requested format is not available' >&2; exit 1");
        let api = routes(state_in(dir.path()));

        let res = warp::test::request()
            .path("/download-mp4?url=https%3A%2F%2Fyoutu.be%2Fabc&itag=999")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(res.body())["code"], error_codes::YTDLP_FAILED);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_removed_binary_is_503() {
        let dir = tempfile::tempdir().unwrap();
        let binary = download::fake_ytdlp(dir.path(), "printf audio");
        let state = state_in(dir.path());
        let api = routes(state.clone());
        let path = "/download-mp3?url=https%3A%2F%2Fyoutu.be%2Fabc";

        let res = warp::test::request().path(path).reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(state.ytdlp.locator().locate(), Some(binary.clone()));

        // The cached path now fails to spawn
        std::fs::remove_file(&binary).unwrap();
        let res = warp::test::request().path(path).reply(&api).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(res.body())["code"], error_codes::YTDLP_NOT_FOUND);

        // Cache was cleared, so a restored binary is found again
        download::fake_ytdlp(dir.path(), "printf audio");
        let res = warp::test::request().path(path).reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body().as_ref(), b"audio");
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let dir = tempfile::tempdir().unwrap();
        let api = routes(state_in(dir.path()));

        let res = warp::test::request()
            .method("OPTIONS")
            .path("/info")
            .header("Origin", "http://localhost:3000")
            .header("Access-Control-Request-Method", "GET")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("access-control-allow-origin"));
    }
}
