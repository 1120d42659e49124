// Integration tests for the remote stage adapters
//
// Each adapter is pointed at a fake provider served by axum on a local
// ephemeral port, so success, malformed, non-2xx, timeout and
// connectivity paths can be exercised without real credentials.

mod common;

use anyhow::Result;
use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use common::{closed_port, serve};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voice_agent::config::{ResponderConfig, SynthesizerConfig, TranscriberConfig};
use voice_agent::error::StageError;
use voice_agent::session::{Role, Turn};
use voice_agent::stages::{
    AudioClip, GeminiResponder, HttpTranscriber, MurfSynthesizer, ReplyRequest, StageAdapter,
    StageResult, DISABLED_SENTINEL,
};

/// Fake provider: counts hits and answers from a fixed list, repeating the last entry
#[derive(Clone)]
struct FakeProvider {
    hits: Arc<AtomicUsize>,
    answers: Arc<Vec<(StatusCode, String)>>,
    delay: Duration,
    last_body: Arc<Mutex<Option<Value>>>,
    last_auth: Arc<Mutex<Option<String>>>,
}

impl FakeProvider {
    fn new(answers: Vec<(StatusCode, &str)>) -> Self {
        Self {
            hits: Arc::new(AtomicUsize::new(0)),
            answers: Arc::new(
                answers
                    .into_iter()
                    .map(|(status, body)| (status, body.to_string()))
                    .collect(),
            ),
            delay: Duration::ZERO,
            last_body: Arc::new(Mutex::new(None)),
            last_auth: Arc::new(Mutex::new(None)),
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<String> {
        let router = Router::new()
            .route("/provider", post(answer))
            .with_state(self.clone());
        let addr = serve(router).await?;
        Ok(format!("http://{}/provider", addr))
    }
}

async fn answer(
    State(fake): State<FakeProvider>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> (StatusCode, String) {
    let hit = fake.hits.fetch_add(1, Ordering::SeqCst);
    *fake.last_body.lock().unwrap() = serde_json::from_slice(&body).ok();
    *fake.last_auth.lock().unwrap() = headers
        .get("authorization")
        .or_else(|| headers.get("api-key"))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if !fake.delay.is_zero() {
        tokio::time::sleep(fake.delay).await;
    }

    let index = hit.min(fake.answers.len() - 1);
    fake.answers[index].clone()
}

fn transcriber_config(endpoint: &str, key: Option<&str>) -> TranscriberConfig {
    TranscriberConfig {
        api_key: key.map(str::to_string),
        endpoint: endpoint.to_string(),
        timeout_secs: 1,
    }
}

fn responder_config(endpoint: &str, key: Option<&str>) -> ResponderConfig {
    ResponderConfig {
        api_key: key.map(str::to_string),
        endpoint: endpoint.to_string(),
        timeout_secs: 1,
        ..ResponderConfig::default()
    }
}

fn synthesizer_config(endpoint: &str, key: Option<&str>) -> SynthesizerConfig {
    SynthesizerConfig {
        api_key: key.map(str::to_string),
        endpoint: endpoint.to_string(),
        timeout_secs: 1,
        retry_delay_ms: 10,
        ..SynthesizerConfig::default()
    }
}

fn request(message: &str) -> ReplyRequest {
    ReplyRequest {
        message: message.to_string(),
        history: vec![Turn::new(Role::User, message, Some(0.9))],
        session_id: "abc123".to_string(),
    }
}

fn audio() -> AudioClip {
    AudioClip::new(vec![0u8; 512])
}

// ============================================================================
// Transcriber
// ============================================================================

#[tokio::test]
async fn test_transcriber_success() -> Result<()> {
    let fake = FakeProvider::new(vec![(
        StatusCode::OK,
        r#"{"text": "Hello", "confidence": 0.95}"#,
    )]);
    let endpoint = fake.start().await?;
    let transcriber = HttpTranscriber::new(&transcriber_config(&endpoint, Some("stt-key")))?;

    let result = transcriber.invoke(audio()).await;

    match result {
        StageResult::Success { payload, meta } => {
            assert_eq!(payload.text, "Hello");
            assert_eq!(payload.confidence, 0.95);
            assert_eq!(meta.attempts, 1);
            assert_eq!(meta.provider, "assemblyai");
        }
        other => panic!("Expected success, got {:?}", other),
    }
    assert_eq!(fake.last_auth.lock().unwrap().as_deref(), Some("stt-key"));

    Ok(())
}

#[tokio::test]
async fn test_transcriber_empty_text_falls_back() -> Result<()> {
    let fake = FakeProvider::new(vec![(StatusCode::OK, r#"{"text": "   "}"#)]);
    let endpoint = fake.start().await?;
    let transcriber = HttpTranscriber::new(&transcriber_config(&endpoint, Some("stt-key")))?;

    let result = transcriber.invoke(audio()).await;

    assert!(result.is_fallback());
    assert!(result.text().starts_with("I didn't hear anything"));
    assert_eq!(result.payload().map(|t| t.confidence), Some(0.0));

    Ok(())
}

#[tokio::test]
async fn test_transcriber_provider_error_falls_back() -> Result<()> {
    let fake = FakeProvider::new(vec![(StatusCode::OK, r#"{"error": "audio too short"}"#)]);
    let endpoint = fake.start().await?;
    let transcriber = HttpTranscriber::new(&transcriber_config(&endpoint, Some("stt-key")))?;

    let result = transcriber.invoke(audio()).await;

    assert!(result.is_fallback());
    assert!(result.text().starts_with("I couldn't understand"));
    assert!(matches!(result.reason(), Some(StageError::RemoteMalformed(_))));

    Ok(())
}

#[tokio::test]
async fn test_transcriber_non_2xx_is_failure() -> Result<()> {
    let fake = FakeProvider::new(vec![(StatusCode::INTERNAL_SERVER_ERROR, "boom")]);
    let endpoint = fake.start().await?;
    let transcriber = HttpTranscriber::new(&transcriber_config(&endpoint, Some("stt-key")))?;

    let result = transcriber.invoke(audio()).await;

    assert!(result.is_failure());
    assert!(matches!(result.reason(), Some(StageError::RemoteHardError(_))));
    assert!(!result.text().is_empty(), "Failures carry a user-facing message");

    Ok(())
}

#[tokio::test]
async fn test_transcriber_timeout_is_failure() -> Result<()> {
    let fake = FakeProvider::new(vec![(StatusCode::OK, r#"{"text": "late"}"#)])
        .slow(Duration::from_secs(3));
    let endpoint = fake.start().await?;
    let transcriber = HttpTranscriber::new(&transcriber_config(&endpoint, Some("stt-key")))?;

    let result = transcriber.invoke(audio()).await;

    assert!(result.is_failure());
    assert_eq!(result.reason(), Some(&StageError::RemoteTimeout));

    Ok(())
}

#[tokio::test]
async fn test_transcriber_unreachable_provider_is_connectivity_failure() -> Result<()> {
    let addr = closed_port().await?;
    let endpoint = format!("http://{}/provider", addr);
    let transcriber = HttpTranscriber::new(&transcriber_config(&endpoint, Some("stt-key")))?;

    let result = transcriber.invoke(audio()).await;

    assert!(result.is_failure());
    assert!(matches!(result.reason(), Some(StageError::RemoteConnectivity(_))));

    Ok(())
}

#[tokio::test]
async fn test_transcriber_without_key_never_calls_provider() -> Result<()> {
    let fake = FakeProvider::new(vec![(StatusCode::OK, r#"{"text": "Hello"}"#)]);
    let endpoint = fake.start().await?;
    let transcriber = HttpTranscriber::new(&transcriber_config(&endpoint, None))?;

    assert!(!transcriber.is_available());
    let result = transcriber.invoke(audio()).await;

    assert!(result.is_fallback());
    assert_eq!(result.reason(), Some(&StageError::CredentialMissing));
    assert_eq!(fake.hits(), 0);

    Ok(())
}

// ============================================================================
// Responder
// ============================================================================

#[tokio::test]
async fn test_responder_success_reads_candidate_text() -> Result<()> {
    let fake = FakeProvider::new(vec![(
        StatusCode::OK,
        r#"{
            "candidates": [{"content": {"parts": [{"text": "  Hi! How can I help?  "}]}}],
            "usageMetadata": {"totalTokenCount": 42}
        }"#,
    )]);
    let endpoint = fake.start().await?;
    let responder = GeminiResponder::new(&responder_config(&endpoint, Some("llm-key")))?;

    let result = responder.invoke(request("Hello")).await;

    match result {
        StageResult::Success { payload, meta } => {
            assert_eq!(payload.text, "Hi! How can I help?");
            assert_eq!(meta.tokens_used, Some(42));
        }
        other => panic!("Expected success, got {:?}", other),
    }

    // The prompt carries the user's message exactly once
    let body = fake.last_body.lock().unwrap().clone().expect("json body");
    let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap_or_default();
    assert!(prompt.ends_with("User: Hello"));
    assert_eq!(body["generationConfig"]["maxOutputTokens"], json!(300));

    Ok(())
}

#[tokio::test]
async fn test_responder_malformed_body_falls_back() -> Result<()> {
    let fake = FakeProvider::new(vec![(StatusCode::OK, "this is not json")]);
    let endpoint = fake.start().await?;
    let responder = GeminiResponder::new(&responder_config(&endpoint, Some("llm-key")))?;

    let result = responder.invoke(request("Hello")).await;

    assert!(result.is_fallback());
    assert!(result.text().starts_with("Hello!"));

    Ok(())
}

#[tokio::test]
async fn test_responder_empty_candidates_fall_back() -> Result<()> {
    let fake = FakeProvider::new(vec![(StatusCode::OK, r#"{"candidates": []}"#)]);
    let endpoint = fake.start().await?;
    let responder = GeminiResponder::new(&responder_config(&endpoint, Some("llm-key")))?;

    let result = responder.invoke(request("Why is the sky blue?")).await;

    assert!(result.is_fallback());
    assert!(result.text().starts_with("I'd love to help answer your question"));

    Ok(())
}

#[tokio::test]
async fn test_responder_non_2xx_is_failure() -> Result<()> {
    let fake = FakeProvider::new(vec![(StatusCode::TOO_MANY_REQUESTS, "slow down")]);
    let endpoint = fake.start().await?;
    let responder = GeminiResponder::new(&responder_config(&endpoint, Some("llm-key")))?;

    let result = responder.invoke(request("Hello")).await;

    assert!(result.is_failure());
    assert!(matches!(result.reason(), Some(StageError::RemoteHardError(_))));

    Ok(())
}

#[tokio::test]
async fn test_responder_timeout_is_failure() -> Result<()> {
    let fake = FakeProvider::new(vec![(
        StatusCode::OK,
        r#"{"candidates": [{"content": {"parts": [{"text": "late"}]}}]}"#,
    )])
    .slow(Duration::from_secs(3));
    let endpoint = fake.start().await?;
    let responder = GeminiResponder::new(&responder_config(&endpoint, Some("llm-key")))?;

    let result = responder.invoke(request("Hello")).await;

    assert!(result.is_failure());
    assert_eq!(result.reason(), Some(&StageError::RemoteTimeout));
    assert_eq!(
        result.text(),
        "I'm taking a bit longer to think than usual. Could you please try asking your question again?"
    );

    Ok(())
}

#[tokio::test]
async fn test_responder_unreachable_provider_is_connectivity_failure() -> Result<()> {
    let addr = closed_port().await?;
    let endpoint = format!("http://{}/provider", addr);
    let responder = GeminiResponder::new(&responder_config(&endpoint, Some("llm-key")))?;

    let result = responder.invoke(request("Hello")).await;

    assert!(result.is_failure());
    assert!(matches!(result.reason(), Some(StageError::RemoteConnectivity(_))));
    assert!(result
        .text()
        .starts_with("I'm having trouble connecting to my AI brain right now."));

    Ok(())
}

#[tokio::test]
async fn test_responder_disable_and_restore() -> Result<()> {
    let fake = FakeProvider::new(vec![(
        StatusCode::OK,
        r#"{"candidates": [{"content": {"parts": [{"text": "Back online"}]}}]}"#,
    )]);
    let endpoint = fake.start().await?;
    let responder = GeminiResponder::new(&responder_config(&endpoint, Some("llm-key")))?;

    responder.set_credential(Some(DISABLED_SENTINEL.to_string()));
    let status = responder.status();
    assert!(!status.available);
    assert!(status.administratively_disabled);

    let result = responder.invoke(request("Hello")).await;
    assert!(result.is_fallback());
    assert_eq!(result.reason(), Some(&StageError::CredentialMissing));
    assert_eq!(fake.hits(), 0, "Disabled stage must not call the provider");

    responder.set_credential(Some("llm-key".to_string()));
    assert!(responder.is_available());
    let result = responder.invoke(request("Hello")).await;
    assert!(result.is_success());
    assert_eq!(fake.hits(), 1);

    Ok(())
}

// ============================================================================
// Synthesizer
// ============================================================================

#[tokio::test]
async fn test_synthesizer_retries_then_succeeds() -> Result<()> {
    let fake = FakeProvider::new(vec![
        (StatusCode::BAD_GATEWAY, "upstream down"),
        (StatusCode::OK, r#"{"audioFile": "https://audio.example/ok.mp3"}"#),
    ]);
    let endpoint = fake.start().await?;
    let synthesizer = MurfSynthesizer::new(&synthesizer_config(&endpoint, Some("tts-key")))?;

    let result = synthesizer.invoke("Hi there".to_string()).await;

    match result {
        StageResult::Success { payload, meta } => {
            assert_eq!(payload.audio_url.as_deref(), Some("https://audio.example/ok.mp3"));
            assert_eq!(payload.source, "murf_api");
            assert_eq!(meta.attempts, 2);
        }
        other => panic!("Expected success, got {:?}", other),
    }
    assert_eq!(fake.hits(), 2);
    assert_eq!(fake.last_auth.lock().unwrap().as_deref(), Some("tts-key"));

    Ok(())
}

#[tokio::test]
async fn test_synthesizer_exhausted_attempts_fall_back_to_browser() -> Result<()> {
    let fake = FakeProvider::new(vec![(StatusCode::INTERNAL_SERVER_ERROR, "broken")]);
    let endpoint = fake.start().await?;
    let synthesizer = MurfSynthesizer::new(&synthesizer_config(&endpoint, Some("tts-key")))?;

    let result = synthesizer.invoke("Hi there".to_string()).await;

    assert!(result.is_fallback());
    let speech = result.payload().expect("browser speech");
    assert!(speech.use_browser_tts());
    assert_eq!(speech.text, "Hi there");
    assert_eq!(speech.source, "browser_tts");
    assert_eq!(fake.hits(), 2, "Default policy makes two attempts");

    Ok(())
}

#[tokio::test]
async fn test_synthesizer_missing_audio_file_is_malformed() -> Result<()> {
    let fake = FakeProvider::new(vec![(StatusCode::OK, r#"{"audioFile": ""}"#)]);
    let endpoint = fake.start().await?;
    let synthesizer = MurfSynthesizer::new(&SynthesizerConfig {
        max_attempts: 1,
        ..synthesizer_config(&endpoint, Some("tts-key"))
    })?;

    let result = synthesizer.invoke("Hi there".to_string()).await;

    assert!(result.is_fallback());
    assert!(matches!(result.reason(), Some(StageError::RemoteMalformed(_))));
    assert_eq!(fake.hits(), 1);

    Ok(())
}

#[tokio::test]
async fn test_synthesizer_truncates_long_input_before_sending() -> Result<()> {
    let fake = FakeProvider::new(vec![(
        StatusCode::OK,
        r#"{"audioFile": "https://audio.example/long.mp3"}"#,
    )]);
    let endpoint = fake.start().await?;
    let synthesizer = MurfSynthesizer::new(&synthesizer_config(&endpoint, Some("tts-key")))?;

    let result = synthesizer.invoke("word ".repeat(1000)).await;
    assert!(result.is_success());

    let body = fake.last_body.lock().unwrap().clone().expect("json body");
    let sent = body["text"].as_str().unwrap_or_default();
    assert_eq!(sent.chars().count(), 3000);
    assert!(sent.ends_with("..."));
    assert_eq!(body["voiceId"], "en-US-ken");

    Ok(())
}

#[tokio::test]
async fn test_synthesizer_without_key_uses_browser_speech() -> Result<()> {
    let fake = FakeProvider::new(vec![(StatusCode::OK, r#"{"audioFile": "x"}"#)]);
    let endpoint = fake.start().await?;
    let synthesizer = MurfSynthesizer::new(&synthesizer_config(&endpoint, None))?;

    let result = synthesizer.invoke("Hello".to_string()).await;

    assert!(result.is_fallback());
    assert_eq!(result.reason(), Some(&StageError::CredentialMissing));
    assert_eq!(fake.hits(), 0);
    assert_eq!(synthesizer.status().max_text_length, Some(3000));

    Ok(())
}
