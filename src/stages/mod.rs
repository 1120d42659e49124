//! Pipeline stages
//!
//! Each stage wraps exactly one remote call behind the `StageAdapter` trait:
//! - Transcriber: audio → text
//! - Responder: text + history → text
//! - Synthesizer: text → playable audio reference
//!
//! Adapters never fail past their boundary for remote problems; every
//! invocation yields one `StageResult` variant.

mod credential;
mod http;
pub mod responder;
pub mod synthesizer;
pub mod transcriber;

pub use credential::{CredentialCell, DISABLED_SENTINEL};
pub use responder::{GeminiResponder, Reply, ReplyRequest};
pub use synthesizer::{truncate_for_synthesis, MurfSynthesizer, Speech};
pub use transcriber::{AudioClip, HttpTranscriber, Transcript};

use crate::error::StageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One of the three pipeline steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "stt")]
    Transcription,
    #[serde(rename = "llm")]
    Response,
    #[serde(rename = "tts")]
    Synthesis,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Transcription, Stage::Response, Stage::Synthesis];

    /// Short administrative name (`stt`, `llm`, `tts`)
    pub fn short_name(&self) -> &'static str {
        match self {
            Stage::Transcription => "stt",
            Stage::Response => "llm",
            Stage::Synthesis => "tts",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Wire-level status of a stage in a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Success,
    Fallback,
    Error,
    /// Not invoked because an upstream stage failed
    Skipped,
}

/// Metadata attached to a successful remote call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageMeta {
    pub provider: String,
    pub elapsed_ms: u64,
    /// Remote calls made, including retries
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
}

/// Outcome of a single stage invocation
#[derive(Debug, Clone)]
pub enum StageResult<T> {
    Success { payload: T, meta: StageMeta },
    /// Degraded but usable content (placeholder or locally derived)
    Fallback { payload: T, reason: StageError },
    /// No usable payload; `message` is safe to show the user
    Failure { message: String, reason: StageError },
}

impl<T> StageResult<T> {
    pub fn status(&self) -> StageStatus {
        match self {
            StageResult::Success { .. } => StageStatus::Success,
            StageResult::Fallback { .. } => StageStatus::Fallback,
            StageResult::Failure { .. } => StageStatus::Error,
        }
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            StageResult::Success { payload, .. } | StageResult::Fallback { payload, .. } => {
                Some(payload)
            }
            StageResult::Failure { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&StageError> {
        match self {
            StageResult::Success { .. } => None,
            StageResult::Fallback { reason, .. } | StageResult::Failure { reason, .. } => {
                Some(reason)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageResult::Success { .. })
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, StageResult::Fallback { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StageResult::Failure { .. })
    }
}

impl<T: AsRef<str>> StageResult<T> {
    /// The user-visible text: the payload text, or the failure message
    pub fn text(&self) -> &str {
        match self {
            StageResult::Success { payload, .. } | StageResult::Fallback { payload, .. } => {
                payload.as_ref()
            }
            StageResult::Failure { message, .. } => message,
        }
    }
}

/// Health report for external status endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageHealth {
    #[serde(rename = "service")]
    pub stage: Stage,
    pub provider: String,
    pub available: bool,
    #[serde(rename = "api_key_set")]
    pub credential_present: bool,
    #[serde(rename = "disabled")]
    pub administratively_disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_text_length: Option<usize>,
}

/// Uniform capability wrapping one remote call.
///
/// Real provider clients and scripted test doubles both implement this; the
/// orchestrator depends on nothing else.
#[async_trait::async_trait]
pub trait StageAdapter: Send + Sync {
    type Input: Send + 'static;
    type Output: Send + 'static;

    fn stage(&self) -> Stage;

    /// False when no credential is configured or it was administratively disabled
    fn is_available(&self) -> bool;

    async fn invoke(&self, input: Self::Input) -> StageResult<Self::Output>;

    /// Swap the credential; `DISABLED_SENTINEL` counts as no credential
    fn set_credential(&self, credential: Option<String>);

    fn status(&self) -> StageHealth;
}

pub type DynTranscriber = Arc<dyn StageAdapter<Input = AudioClip, Output = Transcript>>;
pub type DynResponder = Arc<dyn StageAdapter<Input = ReplyRequest, Output = Reply>>;
pub type DynSynthesizer = Arc<dyn StageAdapter<Input = String, Output = Speech>>;
