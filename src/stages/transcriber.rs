use super::credential::CredentialCell;
use super::http::client_with_timeout;
use super::{Stage, StageAdapter, StageHealth, StageMeta, StageResult};
use crate::config::TranscriberConfig;
use crate::error::StageError;
use crate::timing::timed;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const PROVIDER: &str = "assemblyai";

const UNAVAILABLE_TEXT: &str =
    "I'm having trouble with my speech recognition right now. Could you please try again?";
const UNCLEAR_TEXT: &str = "I couldn't understand what you said. Please try speaking more clearly.";
const SILENT_TEXT: &str =
    "I didn't hear anything. Could you please speak louder or closer to your microphone?";

/// Uploaded audio handed to the transcriber
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    /// MIME type reported by the uploader, if any
    pub content_type: Option<String>,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            content_type: None,
        }
    }
}

/// Transcribed user speech
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub text: String,
    /// Confidence score (0.0 to 1.0)
    pub confidence: f32,
}

impl Transcript {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }

    fn placeholder(text: &str) -> Self {
        Self::new(text, 0.0)
    }
}

impl AsRef<str> for Transcript {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Provider response body
#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: Option<String>,
    confidence: Option<f32>,
    error: Option<String>,
}

/// Speech-to-text over a single HTTP upload
pub struct HttpTranscriber {
    client: reqwest::Client,
    endpoint: String,
    credential: CredentialCell,
}

impl HttpTranscriber {
    pub fn new(config: &TranscriberConfig) -> Result<Self> {
        let transcriber = Self {
            client: client_with_timeout(config.timeout())?,
            endpoint: config.endpoint.clone(),
            credential: CredentialCell::new(config.api_key.clone()),
        };

        if transcriber.is_available() {
            info!("STT stage initialized with {}", PROVIDER);
        } else {
            warn!("STT stage initialized without API key - fallback mode only");
        }

        Ok(transcriber)
    }

    fn failure_message(reason: &StageError) -> &'static str {
        match reason {
            StageError::RemoteTimeout => {
                "Speech recognition is taking longer than usual. Please try again in a moment."
            }
            StageError::RemoteConnectivity(_) => {
                "I'm having network connectivity issues. Please check your internet connection and try again."
            }
            _ => "My speech recognition service is temporarily unavailable. Please try again in a moment.",
        }
    }

    fn failure(reason: StageError) -> StageResult<Transcript> {
        warn!("STT error: {}", reason);
        StageResult::Failure {
            message: Self::failure_message(&reason).to_string(),
            reason,
        }
    }

    async fn call(&self, key: &str, clip: AudioClip) -> StageResult<Transcript> {
        let content_type = clip
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let response = match self
            .client
            .post(&self.endpoint)
            .header("authorization", key)
            .header("content-type", content_type)
            .body(clip.bytes)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Self::failure(StageError::from_transport(&e)),
        };

        let status = response.status();
        if !status.is_success() {
            return Self::failure(StageError::RemoteHardError(format!("HTTP {}", status)));
        }

        let body: TranscribeResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                let reason = StageError::from_transport(&e);
                if reason == StageError::RemoteTimeout {
                    return Self::failure(reason);
                }
                warn!("Unreadable transcription response: {}", e);
                return StageResult::Fallback {
                    payload: Transcript::placeholder(UNCLEAR_TEXT),
                    reason: StageError::RemoteMalformed(e.to_string()),
                };
            }
        };

        if let Some(error) = body.error {
            warn!("Transcription provider error: {}", error);
            return StageResult::Fallback {
                payload: Transcript::placeholder(UNCLEAR_TEXT),
                reason: StageError::RemoteMalformed(error),
            };
        }

        let text = body.text.unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            warn!("Empty transcription result");
            return StageResult::Fallback {
                payload: Transcript::placeholder(SILENT_TEXT),
                reason: StageError::RemoteMalformed("empty transcription".to_string()),
            };
        }

        let confidence = body.confidence.unwrap_or(0.8);
        info!("Transcription successful: '{}' (confidence: {})", text, confidence);

        StageResult::Success {
            payload: Transcript::new(text, confidence),
            meta: StageMeta {
                provider: PROVIDER.to_string(),
                attempts: 1,
                ..StageMeta::default()
            },
        }
    }
}

#[async_trait::async_trait]
impl StageAdapter for HttpTranscriber {
    type Input = AudioClip;
    type Output = Transcript;

    fn stage(&self) -> Stage {
        Stage::Transcription
    }

    fn is_available(&self) -> bool {
        self.credential.is_present()
    }

    async fn invoke(&self, clip: AudioClip) -> StageResult<Transcript> {
        let Some(key) = self.credential.get() else {
            warn!("STT provider unavailable - API key missing or disabled");
            return StageResult::Fallback {
                payload: Transcript::placeholder(UNAVAILABLE_TEXT),
                reason: StageError::CredentialMissing,
            };
        };

        info!("Transcribing {} bytes of audio", clip.bytes.len());
        let (mut result, elapsed) = timed("stt call", self.call(&key, clip)).await;
        if let StageResult::Success { meta, .. } = &mut result {
            meta.elapsed_ms = elapsed.as_millis() as u64;
        }
        result
    }

    fn set_credential(&self, credential: Option<String>) {
        self.credential.set(credential);
        info!("STT API key updated - Available: {}", self.is_available());
    }

    fn status(&self) -> StageHealth {
        self.credential.health(Stage::Transcription, PROVIDER)
    }
}
