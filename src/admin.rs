//! Administrative control over stage credentials
//!
//! Disabling a stage swaps its credential for `DISABLED_SENTINEL`, which every
//! adapter treats as "no credential". Enabling restores the key the process
//! started with, if there was one.

use crate::config::StagesConfig;
use crate::pipeline::PipelineOrchestrator;
use crate::session::SessionStats;
use crate::stages::{Stage, StageHealth, DISABLED_SENTINEL};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Which stage(s) an administrative request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTarget {
    Stt,
    Llm,
    Tts,
    All,
}

impl StageTarget {
    pub fn stages(&self) -> Vec<Stage> {
        match self {
            StageTarget::Stt => vec![Stage::Transcription],
            StageTarget::Llm => vec![Stage::Response],
            StageTarget::Tts => vec![Stage::Synthesis],
            StageTarget::All => Stage::ALL.to_vec(),
        }
    }
}

impl FromStr for StageTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stt" => Ok(StageTarget::Stt),
            "llm" => Ok(StageTarget::Llm),
            "tts" => Ok(StageTarget::Tts),
            "all" => Ok(StageTarget::All),
            other => Err(format!(
                "Unknown service '{}'. Must be one of: stt, llm, tts, all",
                other
            )),
        }
    }
}

impl fmt::Display for StageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageTarget::Stt => "stt",
            StageTarget::Llm => "llm",
            StageTarget::Tts => "tts",
            StageTarget::All => "all",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutageAction {
    Disable,
    Enable,
}

impl FromStr for OutageAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" => Ok(OutageAction::Disable),
            "enable" => Ok(OutageAction::Enable),
            _ => Err("Action must be 'disable' or 'enable'".to_string()),
        }
    }
}

/// Credentials as configured at startup
#[derive(Debug, Clone, Default)]
pub struct OriginalCredentials {
    pub stt: Option<String>,
    pub llm: Option<String>,
    pub tts: Option<String>,
}

impl OriginalCredentials {
    pub fn from_config(stages: &StagesConfig) -> Self {
        Self {
            stt: stages.stt.api_key.clone(),
            llm: stages.llm.api_key.clone(),
            tts: stages.tts.api_key.clone(),
        }
    }

    fn for_stage(&self, stage: Stage) -> Option<&String> {
        match stage {
            Stage::Transcription => self.stt.as_ref(),
            Stage::Response => self.llm.as_ref(),
            Stage::Synthesis => self.tts.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutageReport {
    pub message: String,
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apis_disabled: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apis_restored: Option<Vec<String>>,
}

/// Disable or restore the credentials of `target`
pub fn apply_outage(
    orchestrator: &PipelineOrchestrator,
    originals: &OriginalCredentials,
    target: StageTarget,
    action: OutageAction,
) -> OutageReport {
    info!("Error simulation request: {} - {:?}", target, action);

    let stages = target.stages();
    for stage in &stages {
        let credential = match action {
            OutageAction::Disable => Some(DISABLED_SENTINEL.to_string()),
            // Stages that never had a key stay without one
            OutageAction::Enable => match originals.for_stage(*stage) {
                Some(key) => Some(key.clone()),
                None => continue,
            },
        };
        match stage {
            Stage::Transcription => orchestrator.transcriber().set_credential(credential),
            Stage::Response => orchestrator.responder().set_credential(credential),
            Stage::Synthesis => orchestrator.synthesizer().set_credential(credential),
        }
    }

    let names: Vec<String> = stages.iter().map(|s| s.short_name().to_string()).collect();
    match action {
        OutageAction::Disable => OutageReport {
            message: format!("Simulated {} error - API keys disabled", target),
            error_type: target.to_string(),
            apis_disabled: Some(names),
            apis_restored: None,
        },
        OutageAction::Enable => OutageReport {
            message: format!("Restored {} API functionality", target),
            error_type: target.to_string(),
            apis_disabled: None,
            apis_restored: Some(names),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorStatus {
    pub stt_disabled: bool,
    pub llm_disabled: bool,
    pub tts_disabled: bool,
    pub assemblyai_key_set: bool,
    pub gemini_key_set: bool,
    pub murf_key_set: bool,
}

impl ErrorStatus {
    pub fn collect(orchestrator: &PipelineOrchestrator) -> Self {
        let [stt, llm, tts] = orchestrator.stage_health();
        Self {
            stt_disabled: stt.administratively_disabled,
            llm_disabled: llm.administratively_disabled,
            tts_disabled: tts.administratively_disabled,
            assemblyai_key_set: stt.credential_present,
            gemini_key_set: llm.credential_present,
            murf_key_set: tts.credential_present,
        }
    }
}

/// Stage health plus session statistics
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub stt: StageHealth,
    pub llm: StageHealth,
    pub tts: StageHealth,
    pub sessions: SessionStats,
}

impl ServiceStatus {
    pub async fn collect(orchestrator: &PipelineOrchestrator) -> Self {
        let [stt, llm, tts] = orchestrator.stage_health();
        Self {
            stt,
            llm,
            tts,
            sessions: orchestrator.store().stats().await,
        }
    }
}
