//! Incremental event stream for a pipeline run
//!
//! Event order for one run:
//! `status(processing)`, `session` (new sessions only), `status(transcribing)`,
//! `transcription`, `status(thinking)`, `llm_response`..., `status(generating_audio)`,
//! `audio`, `complete`. A single `error` event may replace the tail of the
//! sequence; nothing follows `error` or `complete`.

use super::orchestrator::{PipelineObserver, PipelineOrchestrator, Progress};
use crate::error::PipelineError;
use crate::stages::{AudioClip, StageResult};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Which transition a status event announces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusStage {
    Processing,
    Transcribing,
    Thinking,
    GeneratingAudio,
}

impl StatusStage {
    fn message(&self) -> &'static str {
        match self {
            StatusStage::Processing => "Processing audio...",
            StatusStage::Transcribing => "Transcribing your voice...",
            StatusStage::Thinking => "AI is thinking...",
            StatusStage::GeneratingAudio => "Generating audio...",
        }
    }
}

/// One frame of the streaming wire format
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Status {
        stage: StatusStage,
        message: String,
        status: String,
    },
    Session {
        session_id: String,
        message: String,
    },
    Transcription {
        text: String,
        confidence: f32,
        is_fallback: bool,
    },
    #[serde(rename = "llm_response")]
    PartialResponse {
        text: String,
        is_complete: bool,
        is_fallback: bool,
    },
    Audio {
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        use_browser_tts: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        source: String,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    Complete {
        session_id: String,
        message_count: usize,
        status: String,
    },
}

impl StreamEvent {
    pub fn status(stage: StatusStage) -> Self {
        StreamEvent::Status {
            stage,
            message: stage.message().to_string(),
            status: "info".to_string(),
        }
    }

    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
            details,
        }
    }

    /// `error` and `complete` end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Error { .. } | StreamEvent::Complete { .. })
    }
}

/// A cumulative prefix of a reply, as streamed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialText {
    pub text: String,
    pub is_complete: bool,
}

/// Split `text` into cumulative prefixes emitted after every third word and
/// on the final word. An empty reply yields a single empty, complete prefix.
pub fn word_chunks(text: &str) -> Vec<PartialText> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return vec![PartialText {
            text: String::new(),
            is_complete: true,
        }];
    }

    let last = words.len() - 1;
    words
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 3 == 2 || *i == last)
        .map(|(i, _)| PartialText {
            text: words[..=i].join(" "),
            is_complete: i == last,
        })
        .collect()
}

/// Sender half of an event stream that refuses to emit past a terminal event
#[derive(Clone)]
struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    finished: Arc<AtomicBool>,
}

impl EventSink {
    async fn emit(&self, event: StreamEvent) -> Result<(), PipelineError> {
        if self.finished.load(Ordering::SeqCst) {
            debug!("Dropping event after stream end: {:?}", event);
            return Ok(());
        }
        if event.is_terminal() {
            self.finished.store(true, Ordering::SeqCst);
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| PipelineError::Cancelled)
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Translates orchestrator progress into stream events
struct StreamObserver {
    sink: EventSink,
    word_delay: Duration,
    reply_text: String,
}

#[async_trait::async_trait]
impl PipelineObserver for StreamObserver {
    async fn on_progress(&mut self, progress: Progress<'_>) -> Result<(), PipelineError> {
        match progress {
            Progress::SessionCreated { session_id } => {
                self.sink
                    .emit(StreamEvent::Session {
                        session_id: session_id.to_string(),
                        message: format!("New session created: {}", session_id),
                    })
                    .await
            }
            Progress::Transcribing => {
                self.sink
                    .emit(StreamEvent::status(StatusStage::Transcribing))
                    .await
            }
            Progress::Transcribed(result) => match result {
                StageResult::Failure { message, reason } => {
                    self.sink
                        .emit(StreamEvent::error(message.clone(), Some(reason.to_string())))
                        .await
                }
                StageResult::Success { payload, .. } | StageResult::Fallback { payload, .. } => {
                    self.sink
                        .emit(StreamEvent::Transcription {
                            text: payload.text.clone(),
                            confidence: payload.confidence,
                            is_fallback: result.is_fallback(),
                        })
                        .await
                }
            },
            Progress::Thinking => self.sink.emit(StreamEvent::status(StatusStage::Thinking)).await,
            Progress::Responded(result) => {
                self.reply_text = result.text().to_string();
                let is_fallback = !result.is_success();
                let chunks = word_chunks(&self.reply_text);
                let count = chunks.len();

                for (i, chunk) in chunks.into_iter().enumerate() {
                    self.sink
                        .emit(StreamEvent::PartialResponse {
                            text: chunk.text,
                            is_complete: chunk.is_complete,
                            is_fallback,
                        })
                        .await?;
                    if i + 1 < count && !self.word_delay.is_zero() {
                        tokio::time::sleep(self.word_delay).await;
                    }
                }
                Ok(())
            }
            Progress::Synthesizing => {
                self.sink
                    .emit(StreamEvent::status(StatusStage::GeneratingAudio))
                    .await
            }
            Progress::Synthesized(result) => {
                let event = match result.payload() {
                    Some(speech) if !speech.use_browser_tts() => StreamEvent::Audio {
                        url: speech.audio_url.clone(),
                        use_browser_tts: false,
                        text: None,
                        source: speech.source.clone(),
                    },
                    Some(speech) => StreamEvent::Audio {
                        url: None,
                        use_browser_tts: true,
                        text: Some(speech.text.clone()),
                        source: speech.source.clone(),
                    },
                    None => StreamEvent::Audio {
                        url: None,
                        use_browser_tts: true,
                        text: Some(self.reply_text.clone()),
                        source: crate::stages::synthesizer::BROWSER_SOURCE.to_string(),
                    },
                };
                self.sink.emit(event).await
            }
        }
    }
}

/// Drives one pipeline run and writes its events to a channel
pub struct EventStreamEncoder {
    sink: EventSink,
    word_delay: Duration,
}

impl EventStreamEncoder {
    pub fn new(tx: mpsc::Sender<StreamEvent>, word_delay: Duration) -> Self {
        Self {
            sink: EventSink {
                tx,
                finished: Arc::new(AtomicBool::new(false)),
            },
            word_delay,
        }
    }

    /// Encoder plus the receiving end of its event channel
    pub fn channel(capacity: usize, word_delay: Duration) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx, word_delay), rx)
    }

    /// Run the pipeline, emitting events until `complete` or `error`.
    ///
    /// If the receiver goes away, the in-flight run is aborted and no further
    /// stage calls are made.
    pub async fn drive(
        self,
        orchestrator: Arc<PipelineOrchestrator>,
        session_id: String,
        clip: AudioClip,
    ) {
        let sink = self.sink;

        if sink
            .emit(StreamEvent::status(StatusStage::Processing))
            .await
            .is_err()
        {
            return;
        }

        let mut observer = StreamObserver {
            sink: sink.clone(),
            word_delay: self.word_delay,
            reply_text: String::new(),
        };
        let run_session_id = session_id.clone();
        let task = tokio::spawn(async move {
            orchestrator
                .run_observed(&run_session_id, clip, &mut observer)
                .await
        });
        let abort = task.abort_handle();

        let joined = tokio::select! {
            joined = task => joined,
            _ = sink.tx.closed() => {
                abort.abort();
                info!("Stream caller for session {} disconnected, run aborted", session_id);
                return;
            }
        };

        let result = match joined {
            Ok(Ok(outcome)) => {
                if outcome.stopped_early() || sink.is_finished() {
                    return;
                }
                sink.emit(StreamEvent::Complete {
                    session_id: outcome.session_id,
                    message_count: outcome.turn_count,
                    status: "success".to_string(),
                })
                .await
            }
            Ok(Err(PipelineError::Cancelled)) => {
                debug!("Stream for session {} cancelled by caller", session_id);
                return;
            }
            Ok(Err(e)) => {
                error!("Streaming error for session {}: {}", session_id, e);
                sink.emit(StreamEvent::error(e.to_string(), None)).await
            }
            Err(e) => {
                error!("Streaming task for session {} failed: {}", session_id, e);
                sink.emit(StreamEvent::error(
                    "Unexpected error: Please try again.",
                    Some(e.to_string()),
                ))
                .await
            }
        };

        if result.is_err() {
            debug!("Stream for session {} closed before final event", session_id);
        }
    }
}
