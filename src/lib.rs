pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod recording;
pub mod session;
pub mod stages;
pub mod timing;

pub use admin::{OriginalCredentials, OutageAction, StageTarget};
pub use config::Config;
pub use error::{PipelineError, RecordingError, StageError};
pub use http::{create_router, AppState};
pub use pipeline::{
    ChatResponse, EventStreamEncoder, PipelineOrchestrator, PipelineOutcome, StreamEvent,
};
pub use recording::{AudioChunkSession, FileSinkFactory, Notice};
pub use session::{Role, Session, SessionStats, SessionStore, Turn};
pub use stages::{
    GeminiResponder, HttpTranscriber, MurfSynthesizer, StageAdapter, StageResult, StageStatus,
};
