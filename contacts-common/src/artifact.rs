use std::io;
use std::path::Path;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// The transient file an upload is spooled into before parsing.
///
/// The file is removed exactly once: by `release`, or on drop if the owner never gets
/// that far. A failed removal is logged and never reported over the submission's outcome.
#[derive(Debug)]
pub struct UploadArtifact {
    path: TempPath,
}

impl UploadArtifact {
    /// Spool `stream` into a new file under `dir`.
    /// A partially written file is removed if the stream or the write fails.
    pub async fn persist_from_stream<S, E>(dir: &Path, stream: S) -> io::Result<Self>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (file, path) = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".csv")
            .tempfile_in(dir)?
            .into_parts();
        let artifact = Self { path };

        let mut file = tokio::fs::File::from_std(file);
        let mut stream = std::pin::pin!(stream);
        let mut written = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(io::Error::other)?;
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        debug!(path = %artifact.path().display(), bytes = written, "persisted upload");
        Ok(artifact)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now.
    pub fn release(self) {
        let shown = self.path.display().to_string();
        if let Err(e) = self.path.close() {
            warn!(path = %shown, "failed to remove upload artifact: {}", e);
        }
    }
}

impl From<TempPath> for UploadArtifact {
    fn from(path: TempPath) -> Self {
        Self { path }
    }
}
