use crate::error::RecordingError;
use crate::pipeline::validate_session_id;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

/// Destination for a live recording's raw audio bytes
#[async_trait]
pub trait AudioSink: Send {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), RecordingError>;

    async fn flush(&mut self) -> Result<(), RecordingError>;

    /// Flush remaining bytes and release the handle
    async fn close(self: Box<Self>) -> Result<(), RecordingError>;
}

/// Allocates one sink per recording
#[async_trait]
pub trait SinkFactory: Send + Sync {
    /// Open a new destination for `connection_id`, returning the sink and a
    /// human-readable destination name
    async fn open(
        &self,
        connection_id: &str,
    ) -> Result<(Box<dyn AudioSink>, String), RecordingError>;
}

/// Writes recordings under a directory as `stream_audio_{id}_{unix_ts}.wav`
#[derive(Debug, Clone)]
pub struct FileSinkFactory {
    dir: PathBuf,
}

impl FileSinkFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SinkFactory for FileSinkFactory {
    async fn open(
        &self,
        connection_id: &str,
    ) -> Result<(Box<dyn AudioSink>, String), RecordingError> {
        // The id becomes part of a file name
        if validate_session_id(connection_id).is_err() {
            return Err(RecordingError::InvalidConnectionId(
                connection_id.to_string(),
            ));
        }

        let filename = format!(
            "stream_audio_{}_{}.wav",
            connection_id,
            chrono::Utc::now().timestamp()
        );
        let path = self.dir.join(&filename);

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| RecordingError::Open {
                path: self.dir.display().to_string(),
                source,
            })?;

        let file = File::create(&path)
            .await
            .map_err(|source| RecordingError::Open {
                path: path.display().to_string(),
                source,
            })?;

        info!("Created audio session: {} -> {}", connection_id, filename);

        Ok((
            Box::new(FileSink {
                writer: BufWriter::new(file),
            }),
            filename,
        ))
    }
}

struct FileSink {
    writer: BufWriter<File>,
}

#[async_trait]
impl AudioSink for FileSink {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), RecordingError> {
        self.writer
            .write_all(chunk)
            .await
            .map_err(RecordingError::Write)
    }

    async fn flush(&mut self) -> Result<(), RecordingError> {
        self.writer.flush().await.map_err(RecordingError::Write)
    }

    async fn close(mut self: Box<Self>) -> Result<(), RecordingError> {
        self.writer.flush().await.map_err(RecordingError::Close)?;
        self.writer
            .into_inner()
            .sync_all()
            .await
            .map_err(RecordingError::Close)
    }
}
