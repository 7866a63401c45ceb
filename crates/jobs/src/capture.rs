//! Draining of child output streams.
//!
//! Every piped stream gets its own task. A stream that is not read fills the
//! OS pipe buffer and blocks the child, so a drain keeps reading to the end
//! even when its destination file cannot be written.

use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Spawn a task that copies `source` into a newly created file at `path`.
///
/// Write failures are logged; they never fail the job.
pub fn spawn_drain_to_file<R>(source: R, path: PathBuf, stream: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(drain_to_file(source, path, stream))
}

async fn drain_to_file<R>(mut source: R, path: PathBuf, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut file = match File::create(&path).await {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), stream, error = %e, "cannot create capture file; discarding output");
            discard(&mut source, stream).await;
            return;
        }
    };

    match io::copy(&mut source, &mut file).await {
        Ok(bytes) => debug!(path = %path.display(), stream, bytes, "capture finished"),
        Err(e) => {
            warn!(path = %path.display(), stream, error = %e, "cannot write capture file; discarding remaining output");
            discard(&mut source, stream).await;
        }
    }

    if let Err(e) = file.flush().await {
        warn!(path = %path.display(), stream, error = %e, "cannot flush capture file");
    }
}

async fn discard<R>(source: &mut R, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    if let Err(e) = io::copy(source, &mut io::sink()).await {
        debug!(stream, error = %e, "stream closed while discarding");
    }
}

/// Spawn a task that reads `source` to the end into memory.
pub fn spawn_collect<R>(source: Option<R>) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            source.read_to_end(&mut buf).await?;
        }
        Ok(buf)
    })
}
