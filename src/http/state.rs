use crate::admin::OriginalCredentials;
use crate::pipeline::PipelineOrchestrator;
use crate::recording::SinkFactory;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,

    /// Credentials restored by `/admin/simulate-error/..?action=enable`
    pub originals: Arc<OriginalCredentials>,

    /// Destination allocator for the live audio channel
    pub sinks: Arc<dyn SinkFactory>,

    /// Progress notice interval on the audio channel
    pub progress_every: u64,

    /// Pause between streamed partial responses
    pub word_delay: Duration,

    /// Largest accepted audio upload, in bytes
    pub max_upload_bytes: usize,

    /// Directory served under `/static`
    pub static_dir: PathBuf,

    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<PipelineOrchestrator>,
        originals: OriginalCredentials,
        sinks: Arc<dyn SinkFactory>,
    ) -> Self {
        Self {
            orchestrator,
            originals: Arc::new(originals),
            sinks,
            progress_every: 10,
            word_delay: Duration::from_millis(100),
            max_upload_bytes: 25 * 1024 * 1024,
            static_dir: PathBuf::from("static"),
            started_at: Utc::now(),
        }
    }

    pub fn with_progress_every(mut self, progress_every: u64) -> Self {
        self.progress_every = progress_every;
        self
    }

    pub fn with_static_dir(mut self, static_dir: impl Into<PathBuf>) -> Self {
        self.static_dir = static_dir.into();
        self
    }

    pub fn with_word_delay(mut self, word_delay: Duration) -> Self {
        self.word_delay = word_delay;
        self
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}
