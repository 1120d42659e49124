//! Voice conversation pipeline
//!
//! One `run` takes uploaded audio through transcription, response and
//! synthesis against a single session. The same run can be delivered as one
//! `ChatResponse` or as an incremental `StreamEvent` sequence.

mod events;
mod orchestrator;
mod outcome;

pub use events::{word_chunks, EventStreamEncoder, PartialText, StatusStage, StreamEvent};
pub use orchestrator::{
    validate_session_id, PipelineObserver, PipelineOrchestrator, Progress, Silent,
};
pub use outcome::{ChatResponse, ErrorHandlingStatus, PipelineOutcome};
