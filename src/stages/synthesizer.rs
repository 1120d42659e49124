use super::credential::CredentialCell;
use super::http::client_with_timeout;
use super::{Stage, StageAdapter, StageHealth, StageMeta, StageResult};
use crate::config::SynthesizerConfig;
use crate::error::StageError;
use crate::timing::timed;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

const PROVIDER: &str = "murf";

pub const REMOTE_SOURCE: &str = "murf_api";
pub const REMOTE_VOICE: &str = "ken-conversational";
pub const BROWSER_SOURCE: &str = "browser_tts";
pub const BROWSER_VOICE: &str = "browser_fallback";

/// Synthesized (or to-be-synthesized) speech
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Speech {
    /// Playable audio reference; `None` means the caller should speak `text` locally
    pub audio_url: Option<String>,
    /// Text that was (or should be) spoken, after truncation
    pub text: String,
    pub source: String,
    pub voice: String,
}

impl Speech {
    pub fn remote(audio_url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            audio_url: Some(audio_url.into()),
            text: text.into(),
            source: REMOTE_SOURCE.to_string(),
            voice: REMOTE_VOICE.to_string(),
        }
    }

    pub fn browser(text: impl Into<String>) -> Self {
        Self {
            audio_url: None,
            text: text.into(),
            source: BROWSER_SOURCE.to_string(),
            voice: BROWSER_VOICE.to_string(),
        }
    }

    pub fn use_browser_tts(&self) -> bool {
        self.audio_url.is_none()
    }
}

/// Cut `text` to at most `ceiling` characters, ending in "..." when shortened
pub fn truncate_for_synthesis(text: &str, ceiling: usize) -> String {
    if text.chars().count() <= ceiling {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(ceiling.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(rename = "audioFile")]
    audio_file: Option<String>,
}

/// Text-to-speech via the Murf generate API, with retries and a browser-speech fallback
pub struct MurfSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    voice_id: String,
    max_text_length: usize,
    max_attempts: u32,
    retry_delay: Duration,
    credential: CredentialCell,
}

impl MurfSynthesizer {
    pub fn new(config: &SynthesizerConfig) -> Result<Self> {
        let synthesizer = Self {
            client: client_with_timeout(config.timeout())?,
            endpoint: config.endpoint.clone(),
            voice_id: config.voice_id.clone(),
            max_text_length: config.max_text_length,
            max_attempts: config.max_attempts,
            retry_delay: config.retry_delay(),
            credential: CredentialCell::new(config.api_key.clone()),
        };
        info!("TTS stage initialized - Available: {}", synthesizer.is_available());
        Ok(synthesizer)
    }

    /// One remote attempt; `Ok(url)` only when the provider returned audio
    async fn call(&self, key: &str, text: &str) -> std::result::Result<String, StageError> {
        let body = json!({
            "voiceId": self.voice_id,
            "style": "Conversational",
            "text": text,
            "rate": 0,
            "pitch": 0,
            "sampleRate": 48000,
            "format": "MP3",
            "channelType": "MONO",
            "pronunciationDictionary": {},
            "encodeAsBase64": false,
            "variation": 1,
            "audioDuration": 0
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .header("api-key", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StageError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StageError::RemoteHardError(format!("HTTP {}", status)));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| StageError::from_transport(&e))?;

        body.audio_file
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| StageError::RemoteMalformed("empty audio file".to_string()))
    }
}

#[async_trait::async_trait]
impl StageAdapter for MurfSynthesizer {
    type Input = String;
    type Output = Speech;

    fn stage(&self) -> Stage {
        Stage::Synthesis
    }

    fn is_available(&self) -> bool {
        self.credential.is_present()
    }

    async fn invoke(&self, text: String) -> StageResult<Speech> {
        let text = truncate_for_synthesis(&text, self.max_text_length);

        let Some(key) = self.credential.get() else {
            info!("Murf API unavailable - API key missing or disabled, using browser TTS");
            return StageResult::Fallback {
                payload: Speech::browser(text),
                reason: StageError::CredentialMissing,
            };
        };

        let mut last_reason =
            StageError::RemoteHardError("no synthesis attempts configured".to_string());

        for attempt in 1..=self.max_attempts {
            info!("Attempting Murf TTS (attempt {}/{})", attempt, self.max_attempts);

            let (result, elapsed) = timed("tts call", self.call(&key, &text)).await;
            match result {
                Ok(url) => {
                    info!("Murf TTS successful");
                    return StageResult::Success {
                        payload: Speech::remote(url, text),
                        meta: StageMeta {
                            provider: PROVIDER.to_string(),
                            elapsed_ms: elapsed.as_millis() as u64,
                            attempts: attempt,
                            tokens_used: None,
                        },
                    };
                }
                Err(reason) => {
                    match &reason {
                        StageError::RemoteTimeout | StageError::RemoteConnectivity(_) => {
                            warn!("Murf API {} on attempt {}", reason, attempt)
                        }
                        _ => error!("Murf API error on attempt {}: {}", attempt, reason),
                    }
                    last_reason = reason;
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        info!("Using browser TTS fallback");
        StageResult::Fallback {
            payload: Speech::browser(text),
            reason: last_reason,
        }
    }

    fn set_credential(&self, credential: Option<String>) {
        self.credential.set(credential);
        info!("TTS API key updated - Available: {}", self.is_available());
    }

    fn status(&self) -> StageHealth {
        StageHealth {
            max_text_length: Some(self.max_text_length),
            ..self.credential.health(Stage::Synthesis, PROVIDER)
        }
    }
}
