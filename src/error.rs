use thiserror::Error;

/// Why a stage did not produce a clean `Success`.
///
/// Stage errors never escape an adapter; they are carried inside
/// `StageResult::Fallback` / `StageResult::Failure` as the reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("API key missing or disabled")]
    CredentialMissing,

    #[error("request timed out")]
    RemoteTimeout,

    #[error("connection error: {0}")]
    RemoteConnectivity(String),

    #[error("unusable response: {0}")]
    RemoteMalformed(String),

    #[error("remote error: {0}")]
    RemoteHardError(String),
}

impl StageError {
    /// Classify a transport error from the HTTP client
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            StageError::RemoteTimeout
        } else if err.is_connect() {
            StageError::RemoteConnectivity(err.to_string())
        } else if err.is_decode() {
            StageError::RemoteMalformed(err.to_string())
        } else {
            StageError::RemoteHardError(err.to_string())
        }
    }
}

/// Errors surfaced by the pipeline itself (not by its stages)
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid session ID format: {0:?}")]
    InvalidSessionIdentifier(String),

    #[error("Unreadable upload: {0}")]
    UnreadableUpload(String),

    #[error("Upload exceeds {limit_bytes} bytes")]
    UploadTooLarge { limit_bytes: usize },

    /// The caller stopped listening; no further stages were started
    #[error("caller disconnected before the pipeline finished")]
    Cancelled,
}

/// Errors raised while buffering a live audio channel to storage
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("failed to open destination {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write audio chunk: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to finalize destination: {0}")]
    Close(#[source] std::io::Error),

    #[error("invalid connection id for a recording destination: {0:?}")]
    InvalidConnectionId(String),
}
