use super::outcome::PipelineOutcome;
use crate::error::PipelineError;
use crate::session::{Role, SessionStore};
use crate::stages::{
    AudioClip, DynResponder, DynSynthesizer, DynTranscriber, Reply, ReplyRequest, Speech,
    Stage, StageHealth, StageResult, Transcript,
};
use crate::timing::timed_stage;
use std::sync::Arc;
use tracing::{info, warn};

/// Milestones reported while a pipeline run progresses
#[derive(Debug)]
pub enum Progress<'a> {
    SessionCreated { session_id: &'a str },
    Transcribing,
    Transcribed(&'a StageResult<Transcript>),
    Thinking,
    Responded(&'a StageResult<Reply>),
    Synthesizing,
    Synthesized(&'a StageResult<Speech>),
}

/// Receives progress before the next stage starts.
///
/// Returning an error (normally `PipelineError::Cancelled`) stops the run
/// before any further stage call is issued.
#[async_trait::async_trait]
pub trait PipelineObserver: Send {
    async fn on_progress(&mut self, progress: Progress<'_>) -> Result<(), PipelineError>;
}

/// Observer for synchronous delivery
pub struct Silent;

#[async_trait::async_trait]
impl PipelineObserver for Silent {
    async fn on_progress(&mut self, _progress: Progress<'_>) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Check a caller-supplied session identifier: ASCII alphanumerics, `-`
/// and `_`, between 3 and 100 characters.
pub fn validate_session_id(session_id: &str) -> Result<(), PipelineError> {
    let well_formed = (3..=100).contains(&session_id.len())
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if well_formed {
        Ok(())
    } else {
        Err(PipelineError::InvalidSessionIdentifier(session_id.to_string()))
    }
}

/// Sequences transcription, response and synthesis against one session
pub struct PipelineOrchestrator {
    store: Arc<SessionStore>,
    transcriber: DynTranscriber,
    responder: DynResponder,
    synthesizer: DynSynthesizer,
    /// Trailing turns handed to the responder
    history_window: usize,
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        transcriber: DynTranscriber,
        responder: DynResponder,
        synthesizer: DynSynthesizer,
        history_window: usize,
    ) -> Self {
        Self {
            store,
            transcriber,
            responder,
            synthesizer,
            history_window,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn transcriber(&self) -> &DynTranscriber {
        &self.transcriber
    }

    pub fn responder(&self) -> &DynResponder {
        &self.responder
    }

    pub fn synthesizer(&self) -> &DynSynthesizer {
        &self.synthesizer
    }

    /// Status of every stage, in pipeline order
    pub fn stage_health(&self) -> [StageHealth; 3] {
        [
            self.transcriber.status(),
            self.responder.status(),
            self.synthesizer.status(),
        ]
    }

    /// Run the full pipeline and return one composite outcome
    pub async fn run(
        &self,
        session_id: &str,
        clip: AudioClip,
    ) -> Result<PipelineOutcome, PipelineError> {
        self.run_observed(session_id, clip, &mut Silent).await
    }

    /// Run the pipeline, reporting each milestone to `observer` before the
    /// next stage starts.
    pub async fn run_observed(
        &self,
        session_id: &str,
        clip: AudioClip,
        observer: &mut dyn PipelineObserver,
    ) -> Result<PipelineOutcome, PipelineError> {
        validate_session_id(session_id)?;
        if clip.bytes.is_empty() {
            return Err(PipelineError::UnreadableUpload("audio upload is empty".to_string()));
        }

        info!("Processing audio message for session: {}", session_id);

        let session_created = self.store.ensure(session_id).await;
        if session_created {
            observer
                .on_progress(Progress::SessionCreated { session_id })
                .await?;
        }

        // Transcription
        observer.on_progress(Progress::Transcribing).await?;
        let (transcription, _) =
            timed_stage(Stage::Transcription, self.transcriber.invoke(clip)).await;
        // Failed transcriptions are recorded with zero confidence
        let confidence = Some(transcription.payload().map_or(0.0, |t| t.confidence));
        self.store
            .append(session_id, Role::User, transcription.text(), confidence)
            .await;
        observer
            .on_progress(Progress::Transcribed(&transcription))
            .await?;

        if transcription.is_failure() {
            warn!(
                "Transcription failed for session {}, skipping response and synthesis",
                session_id
            );
            return Ok(PipelineOutcome {
                session_id: session_id.to_string(),
                session_created,
                turn_count: self.store.turn_count(session_id).await,
                transcription,
                reply: None,
                speech: None,
            });
        }

        // Response
        observer.on_progress(Progress::Thinking).await?;
        let history = self.store.history(session_id, self.history_window).await;
        let request = ReplyRequest {
            message: transcription.text().to_string(),
            history,
            session_id: session_id.to_string(),
        };
        let (reply, _) = timed_stage(Stage::Response, self.responder.invoke(request)).await;
        self.store
            .append(session_id, Role::Assistant, reply.text(), None)
            .await;
        observer.on_progress(Progress::Responded(&reply)).await?;

        // Synthesis
        observer.on_progress(Progress::Synthesizing).await?;
        let (speech, _) = timed_stage(
            Stage::Synthesis,
            self.synthesizer.invoke(reply.text().to_string()),
        )
        .await;
        observer.on_progress(Progress::Synthesized(&speech)).await?;

        let turn_count = self.store.turn_count(session_id).await;
        info!(
            "Audio message processed for session {} (stt={:?}, llm={:?}, tts={:?})",
            session_id,
            transcription.status(),
            reply.status(),
            speech.status()
        );

        Ok(PipelineOutcome {
            session_id: session_id.to_string(),
            session_created,
            transcription,
            reply: Some(reply),
            speech: Some(speech),
            turn_count,
        })
    }
}
