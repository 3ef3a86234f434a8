//! Streams a child's stdout as an HTTP body
//!
//! The first chunk is awaited before any headers go out, so a process that
//! fails immediately still turns into a proper error reply. A failure after
//! that point ends the body with an error, which aborts the connection.

use std::io;
use std::pin::Pin;
use std::process::ExitStatus;

use futures_util::stream::{self, Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn, Instrument, Span};
use warp::hyper::body::Bytes;

use crate::error::AppError;
use crate::utils;

const CHUNK_SIZE: usize = 64 * 1024;

pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

struct Pump {
    pending: Option<Bytes>,
    chunks: ReaderStream<ChildStdout>,
    child: Option<Child>,
    stderr: Option<JoinHandle<String>>,
}

/// Take ownership of a spawned child (stdout and stderr piped) and stream its stdout
pub async fn from_child(mut child: Child) -> Result<ByteStream, AppError> {
    let stdout = child.stdout.take().ok_or_else(|| {
        io::Error::new(io::ErrorKind::BrokenPipe, "yt-dlp stdout was not captured")
    })?;
    let stderr = drain_stderr(child.stderr.take());
    let mut chunks = ReaderStream::with_capacity(stdout, CHUNK_SIZE);

    let first = match chunks.next().await {
        Some(chunk) => chunk?,
        None => {
            let status = child.wait().await?;
            if !status.success() {
                return Err(failure(Some(stderr), status).await);
            }
            debug!("yt-dlp exited without output");
            return Ok(stream::empty::<io::Result<Bytes>>().boxed());
        }
    };

    let pump = Pump {
        pending: Some(first),
        chunks,
        child: Some(child),
        stderr: Some(stderr),
    };
    Ok(stream::try_unfold(pump, next_chunk).boxed())
}

async fn next_chunk(mut pump: Pump) -> io::Result<Option<(Bytes, Pump)>> {
    if let Some(chunk) = pump.pending.take() {
        return Ok(Some((chunk, pump)));
    }

    if let Some(chunk) = pump.chunks.next().await {
        return chunk.map(|bytes| Some((bytes, pump)));
    }

    // stdout closed, the exit status decides whether the body was complete
    if let Some(mut child) = pump.child.take() {
        let status = child.wait().await?;
        if !status.success() {
            let err = failure(pump.stderr.take(), status).await;
            warn!("Stream aborted: {}", err);
            return Err(io::Error::new(io::ErrorKind::Other, err.to_string()));
        }
        debug!("yt-dlp finished: {}", status);
    }

    Ok(None)
}

/// Log stderr as it arrives; resolves to the last non-empty line
fn drain_stderr(stderr: Option<ChildStderr>) -> JoinHandle<String> {
    tokio::spawn(
        async move {
            let mut last = String::new();
            let Some(stderr) = stderr else {
                return last;
            };

            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(line) = utils::last_line(&line) {
                    debug!("[yt-dlp] {}", line);
                    last = line.to_string();
                }
            }
            last
        }
        .instrument(Span::current()),
    )
}

async fn failure(stderr: Option<JoinHandle<String>>, status: ExitStatus) -> AppError {
    let message = match stderr {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    AppError::YtDlpFailed {
        status: status.to_string(),
        message: if message.is_empty() {
            "Unknown error".to_string()
        } else {
            message
        },
    }
}
