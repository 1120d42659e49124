use crate::stages::synthesizer::{BROWSER_SOURCE, BROWSER_VOICE};
use crate::stages::{Reply, Speech, StageResult, StageStatus, Transcript};
use serde::{Deserialize, Serialize};

/// Everything one pipeline run produced.
///
/// Both the synchronous `ChatResponse` and the streamed events are derived
/// from these stage results; nothing is recomputed for either delivery mode.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub session_id: String,
    /// Whether this run created the session
    pub session_created: bool,
    pub transcription: StageResult<Transcript>,
    /// `None` when transcription failed and the run stopped early
    pub reply: Option<StageResult<Reply>>,
    pub speech: Option<StageResult<Speech>>,
    /// Turns in the session after this run
    pub turn_count: usize,
}

/// Per-stage status block of the synchronous response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorHandlingStatus {
    pub stt_status: StageStatus,
    pub llm_status: StageStatus,
    pub tts_status: StageStatus,
    pub error_message: Option<String>,
}

/// Synchronous chat response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub user_message: String,
    pub assistant_response: String,
    pub audio_url: Option<String>,
    pub use_browser_tts: bool,
    pub audio_source: String,
    pub voice_used: String,
    pub total_messages: usize,
    pub transcription_confidence: f32,
    pub error_handling: ErrorHandlingStatus,
}

fn status_of<T>(result: Option<&StageResult<T>>) -> StageStatus {
    result.map_or(StageStatus::Skipped, StageResult::status)
}

fn failure_message<T>(result: Option<&StageResult<T>>) -> Option<&str> {
    match result {
        Some(StageResult::Failure { message, .. }) => Some(message),
        _ => None,
    }
}

impl PipelineOutcome {
    /// True when transcription failed and downstream stages never ran
    pub fn stopped_early(&self) -> bool {
        self.transcription.is_failure()
    }

    /// The first user-facing failure message, if any stage failed
    pub fn error_message(&self) -> Option<&str> {
        failure_message(Some(&self.transcription))
            .or_else(|| failure_message(self.reply.as_ref()))
            .or_else(|| failure_message(self.speech.as_ref()))
    }

    /// Text the assistant "said" this turn
    pub fn assistant_text(&self) -> &str {
        match &self.reply {
            Some(reply) => reply.text(),
            None => self.transcription.text(),
        }
    }

    pub fn to_response(&self) -> ChatResponse {
        let speech = self.speech.as_ref().and_then(StageResult::payload);

        ChatResponse {
            session_id: self.session_id.clone(),
            user_message: self.transcription.text().to_string(),
            assistant_response: self.assistant_text().to_string(),
            audio_url: speech.and_then(|s| s.audio_url.clone()),
            use_browser_tts: speech.map_or(true, Speech::use_browser_tts),
            audio_source: speech.map_or(BROWSER_SOURCE.to_string(), |s| s.source.clone()),
            voice_used: speech.map_or(BROWSER_VOICE.to_string(), |s| s.voice.clone()),
            total_messages: self.turn_count,
            transcription_confidence: self
                .transcription
                .payload()
                .map_or(0.0, |t| t.confidence),
            error_handling: ErrorHandlingStatus {
                stt_status: self.transcription.status(),
                llm_status: status_of(self.reply.as_ref()),
                tts_status: status_of(self.speech.as_ref()),
                error_message: self.error_message().map(str::to_string),
            },
        }
    }
}
