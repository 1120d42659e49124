// Shared test doubles and helpers
//
// Scripted stage adapters stand in for the remote providers so pipeline
// behavior can be checked without a network. Each double records every
// input it was invoked with.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use voice_agent::error::StageError;
use voice_agent::pipeline::PipelineOrchestrator;
use voice_agent::session::SessionStore;
use voice_agent::stages::{
    AudioClip, CredentialCell, Reply, ReplyRequest, Speech, Stage, StageAdapter, StageHealth,
    StageMeta, StageResult, Transcript,
};

pub const SCRIPTED_KEY: &str = "scripted-key";

/// Stage adapter that replays scripted results in order, repeating the last one
pub struct Scripted<I, O> {
    stage: Stage,
    script: Mutex<VecDeque<StageResult<O>>>,
    last: Mutex<StageResult<O>>,
    inputs: Mutex<Vec<I>>,
    delay: Duration,
    credential: CredentialCell,
}

impl<I, O: Clone> Scripted<I, O> {
    pub fn new(stage: Stage, results: Vec<StageResult<O>>) -> Self {
        let mut script: VecDeque<_> = results.into();
        let last = script
            .back()
            .cloned()
            .expect("scripted adapter needs at least one result");
        if script.len() == 1 {
            script.clear();
        }
        Self {
            stage,
            script: Mutex::new(script),
            last: Mutex::new(last),
            inputs: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            credential: CredentialCell::new(Some(SCRIPTED_KEY.to_string())),
        }
    }

    /// Sleep before answering, to simulate a slow provider
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }
}

impl<I: Clone, O> Scripted<I, O> {
    pub fn inputs(&self) -> Vec<I> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl<I, O> StageAdapter for Scripted<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    type Input = I;
    type Output = O;

    fn stage(&self) -> Stage {
        self.stage
    }

    fn is_available(&self) -> bool {
        self.credential.is_present()
    }

    async fn invoke(&self, input: I) -> StageResult<O> {
        self.inputs.lock().unwrap().push(input);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => self.last.lock().unwrap().clone(),
        }
    }

    fn set_credential(&self, credential: Option<String>) {
        self.credential.set(credential);
    }

    fn status(&self) -> StageHealth {
        self.credential.health(self.stage, "scripted")
    }
}

pub type ScriptedTranscriber = Scripted<AudioClip, Transcript>;
pub type ScriptedResponder = Scripted<ReplyRequest, Reply>;
pub type ScriptedSynthesizer = Scripted<String, Speech>;

pub fn meta() -> StageMeta {
    StageMeta {
        provider: "scripted".to_string(),
        attempts: 1,
        ..StageMeta::default()
    }
}

pub fn heard(text: &str, confidence: f32) -> ScriptedTranscriber {
    Scripted::new(
        Stage::Transcription,
        vec![StageResult::Success {
            payload: Transcript::new(text, confidence),
            meta: meta(),
        }],
    )
}

pub fn replies(text: &str) -> ScriptedResponder {
    Scripted::new(
        Stage::Response,
        vec![StageResult::Success {
            payload: Reply::new(text),
            meta: meta(),
        }],
    )
}

pub fn speaks(url: &str) -> ScriptedSynthesizer {
    Scripted::new(
        Stage::Synthesis,
        vec![StageResult::Success {
            payload: Speech::remote(url, "scripted"),
            meta: meta(),
        }],
    )
}

pub fn transcription_fails(message: &str) -> ScriptedTranscriber {
    Scripted::new(
        Stage::Transcription,
        vec![StageResult::Failure {
            message: message.to_string(),
            reason: StageError::RemoteTimeout,
        }],
    )
}

/// Orchestrator over the given doubles with a fresh store and a window of 5
pub fn orchestrator(
    transcriber: &Arc<ScriptedTranscriber>,
    responder: &Arc<ScriptedResponder>,
    synthesizer: &Arc<ScriptedSynthesizer>,
) -> Arc<PipelineOrchestrator> {
    Arc::new(PipelineOrchestrator::new(
        Arc::new(SessionStore::new()),
        transcriber.clone(),
        responder.clone(),
        synthesizer.clone(),
        5,
    ))
}

pub fn clip() -> AudioClip {
    AudioClip {
        bytes: vec![1u8; 256],
        content_type: Some("audio/wav".to_string()),
    }
}

/// Serve `router` on an ephemeral local port
pub async fn serve(router: Router) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(addr)
}

/// An address nothing is listening on
pub async fn closed_port() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}
