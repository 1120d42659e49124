use super::sink::{AudioSink, SinkFactory};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Text commands accepted on the audio channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    StartRecording,
    StopRecording,
}

impl FromStr for ControlSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "start_recording" => Ok(ControlSignal::StartRecording),
            "stop_recording" => Ok(ControlSignal::StopRecording),
            other => Err(format!("Unknown command: {}", other)),
        }
    }
}

/// Server-to-client message on the audio channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    Connected {
        connection_id: String,
        message: String,
    },
    RecordingStarted {
        destination: String,
        message: String,
    },
    Progress {
        chunks_received: u64,
        total_bytes: u64,
        message: String,
    },
    RecordingStopped {
        chunks_received: u64,
        total_bytes: u64,
        message: String,
    },
    Warning {
        message: String,
    },
    Error {
        message: String,
    },
}

/// Counters for a recording, live or finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingSnapshot {
    pub connection_id: String,
    pub recording: bool,
    pub destination: Option<String>,
    pub chunks_received: u64,
    pub total_bytes: u64,
    pub started_at: Option<DateTime<Utc>>,
}

struct ActiveRecording {
    destination: String,
    sink: Box<dyn AudioSink>,
    chunks_received: u64,
    total_bytes: u64,
    started_at: DateTime<Utc>,
}

enum RecordingState {
    Idle,
    Recording(ActiveRecording),
}

/// Per-connection state machine buffering live binary audio to a sink.
///
/// Independent of the conversation pipeline: its identifier is the
/// connection id, not a chat session id.
pub struct AudioChunkSession {
    connection_id: String,
    factory: Arc<dyn SinkFactory>,
    progress_every: u64,
    state: RecordingState,
    /// Counters of the most recent finished recording
    last: Option<RecordingSnapshot>,
}

impl AudioChunkSession {
    pub fn new(
        connection_id: impl Into<String>,
        factory: Arc<dyn SinkFactory>,
        progress_every: u64,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            factory,
            progress_every,
            state: RecordingState::Idle,
            last: None,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecordingState::Recording(_))
    }

    /// Greeting sent when the connection opens
    pub fn welcome(&self) -> Notice {
        Notice::Connected {
            connection_id: self.connection_id.clone(),
            message: "Connected to Voice Agent Audio Streaming! Send 'start_recording' to begin."
                .to_string(),
        }
    }

    /// Parse and apply a text frame; unknown commands produce a warning
    pub async fn handle_text(&mut self, text: &str) -> Option<Notice> {
        match text.parse::<ControlSignal>() {
            Ok(signal) => self.handle_control(signal).await,
            Err(e) => {
                warn!("Connection {}: {}", self.connection_id, e);
                Some(Notice::Warning { message: e })
            }
        }
    }

    /// Apply a control signal. Re-issuing the current state's signal is a no-op.
    pub async fn handle_control(&mut self, signal: ControlSignal) -> Option<Notice> {
        match (signal, self.is_recording()) {
            (ControlSignal::StartRecording, true) => {
                debug!("Connection {} already recording", self.connection_id);
                None
            }
            (ControlSignal::StopRecording, false) => {
                debug!("Connection {} not recording, stop ignored", self.connection_id);
                None
            }
            (ControlSignal::StartRecording, false) => {
                match self.factory.open(&self.connection_id).await {
                    Ok((sink, destination)) => {
                        info!(
                            "Recording started for connection {} -> {}",
                            self.connection_id, destination
                        );
                        let message =
                            format!("Recording started! Audio will be saved to: {}", destination);
                        self.state = RecordingState::Recording(ActiveRecording {
                            destination: destination.clone(),
                            sink,
                            chunks_received: 0,
                            total_bytes: 0,
                            started_at: Utc::now(),
                        });
                        Some(Notice::RecordingStarted {
                            destination,
                            message,
                        })
                    }
                    Err(e) => {
                        error!("Failed to open recording destination: {}", e);
                        Some(Notice::Error {
                            message: format!("Could not start recording: {}", e),
                        })
                    }
                }
            }
            (ControlSignal::StopRecording, true) => {
                let snapshot = self.finish().await;
                snapshot.map(|(snapshot, result)| match result {
                    Ok(()) => Notice::RecordingStopped {
                        chunks_received: snapshot.chunks_received,
                        total_bytes: snapshot.total_bytes,
                        message: "Recording stopped and saved successfully!".to_string(),
                    },
                    Err(e) => Notice::Error {
                        message: format!("Recording stopped but could not be finalized: {}", e),
                    },
                })
            }
        }
    }

    /// Handle one binary frame
    pub async fn handle_audio(&mut self, chunk: &[u8]) -> Option<Notice> {
        let RecordingState::Recording(active) = &mut self.state else {
            warn!(
                "Connection {}: {} bytes received while idle, discarded",
                self.connection_id,
                chunk.len()
            );
            return Some(Notice::Warning {
                message: "Audio received but no recording session active. Send 'start_recording' first."
                    .to_string(),
            });
        };

        if let Err(e) = active.sink.write(chunk).await {
            error!("Connection {}: {}", self.connection_id, e);
            // Release the handle; bytes flushed so far are kept
            if let Some((_, Err(close_err))) = self.finish().await {
                error!(
                    "Connection {}: finalize after failed write also failed: {}",
                    self.connection_id, close_err
                );
            }
            return Some(Notice::Error {
                message: format!("Recording ended: {}", e),
            });
        }

        active.chunks_received += 1;
        active.total_bytes += chunk.len() as u64;
        debug!(
            "Connection {}: saved chunk {} ({} bytes)",
            self.connection_id,
            active.chunks_received,
            chunk.len()
        );

        if self.progress_every > 0 && active.chunks_received % self.progress_every == 0 {
            // Persist at each progress mark so a crash keeps what was reported
            if let Err(e) = active.sink.flush().await {
                warn!("Connection {}: flush failed: {}", self.connection_id, e);
            }
            return Some(Notice::Progress {
                chunks_received: active.chunks_received,
                total_bytes: active.total_bytes,
                message: format!(
                    "Received {} audio chunks ({} bytes)",
                    active.chunks_received, active.total_bytes
                ),
            });
        }
        None
    }

    /// Connection lost: release any open destination and return to Idle
    pub async fn close(&mut self) {
        if let Some((snapshot, result)) = self.finish().await {
            match result {
                Ok(()) => info!(
                    "Connection {} closed while recording; kept {} chunks ({} bytes)",
                    self.connection_id, snapshot.chunks_received, snapshot.total_bytes
                ),
                Err(e) => error!(
                    "Connection {} closed while recording; finalize failed: {}",
                    self.connection_id, e
                ),
            }
        }
    }

    /// Live counters, or the last finished recording's while idle
    pub fn snapshot(&self) -> RecordingSnapshot {
        match &self.state {
            RecordingState::Recording(active) => self.snapshot_of(active, true),
            RecordingState::Idle => self.last.clone().unwrap_or_else(|| RecordingSnapshot {
                connection_id: self.connection_id.clone(),
                recording: false,
                destination: None,
                chunks_received: 0,
                total_bytes: 0,
                started_at: None,
            }),
        }
    }

    fn snapshot_of(&self, active: &ActiveRecording, recording: bool) -> RecordingSnapshot {
        RecordingSnapshot {
            connection_id: self.connection_id.clone(),
            recording,
            destination: Some(active.destination.clone()),
            chunks_received: active.chunks_received,
            total_bytes: active.total_bytes,
            started_at: Some(active.started_at),
        }
    }

    /// Move to Idle, closing the sink if one was open
    async fn finish(
        &mut self,
    ) -> Option<(RecordingSnapshot, Result<(), crate::error::RecordingError>)> {
        let RecordingState::Recording(active) =
            std::mem::replace(&mut self.state, RecordingState::Idle)
        else {
            return None;
        };

        let snapshot = self.snapshot_of(&active, false);
        let result = active.sink.close().await;
        if result.is_ok() {
            info!(
                "Recording finished for connection {}: {} chunks, {} bytes",
                self.connection_id, snapshot.chunks_received, snapshot.total_bytes
            );
        }
        self.last = Some(snapshot.clone());
        Some((snapshot, result))
    }
}
