use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
    pub stages: StagesConfig,
    pub chat: ChatConfig,
    pub recording: RecordingConfig,
    /// Directory served under `/static`
    pub static_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set
    pub level: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    pub stt: TranscriberConfig,
    pub llm: ResponderConfig,
    pub tts: SynthesizerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesizerConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub voice_id: String,
    /// Hard input ceiling in characters (provider limit)
    pub max_text_length: usize,
    /// Total remote attempts before falling back to browser speech
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Trailing turns handed to the responder
    pub history_window: usize,
    /// Pause between streamed partial responses
    pub stream_word_delay_ms: u64,
    /// Largest accepted audio upload
    pub max_upload_mb: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub uploads_dir: String,
    /// Emit a progress notice every N chunks
    pub progress_every: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            logging: LoggingConfig::default(),
            stages: StagesConfig::default(),
            chat: ChatConfig::default(),
            recording: RecordingConfig::default(),
            static_dir: "static".to_string(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-agent".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8001,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.assemblyai.com/v2/transcribe".to_string(),
            timeout_secs: 15,
        }
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
                .to_string(),
            timeout_secs: 15,
            temperature: 0.7,
            max_output_tokens: 300,
        }
    }
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.murf.ai/v1/speech/generate".to_string(),
            timeout_secs: 20,
            voice_id: "en-US-ken".to_string(),
            max_text_length: 3000,
            max_attempts: 2,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: 5,
            stream_word_delay_ms: 100,
            max_upload_mb: 25,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            uploads_dir: "uploads".to_string(),
            progress_every: 10,
        }
    }
}

impl TranscriberConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ResponderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SynthesizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl ChatConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

impl RecordingConfig {
    pub fn uploads_path(&self) -> PathBuf {
        PathBuf::from(&self.uploads_dir)
    }
}

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from an optional file, `VOICE_AGENT_*` environment
    /// variables, and the provider key variables (`ASSEMBLYAI_API_KEY`, ...).
    pub fn load(path: &str) -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("VOICE_AGENT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("stages.stt.api_key", env("ASSEMBLYAI_API_KEY"))?
            .set_override_option("stages.llm.api_key", env("GEMINI_API_KEY"))?
            .set_override_option("stages.tts.api_key", env("MURF_API_KEY"))?
            .set_override_option("service.http.bind", env("HOST"))?
            .set_override_option("logging.level", env("LOG_LEVEL"))?
            .set_override_option("recording.uploads_dir", env("UPLOADS_DIR"))?
            .set_override_option(
                "service.http.port",
                env("PORT").and_then(|p| p.parse::<i64>().ok()),
            )?
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    /// Non-fatal configuration issues, one message each
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        let missing = |key: &Option<String>| key.as_deref().map_or(true, |k| k.trim().is_empty());

        if missing(&self.stages.stt.api_key) {
            issues.push("AssemblyAI API key not set - STT stage will use fallback mode".to_string());
        }
        if missing(&self.stages.llm.api_key) {
            issues.push("Gemini API key not set - LLM stage will use fallback mode".to_string());
        }
        if missing(&self.stages.tts.api_key) {
            issues.push("Murf API key not set - TTS stage will use browser fallback".to_string());
        }

        if self.service.http.port == 0 {
            issues.push(format!("Invalid port number: {}", self.service.http.port));
        }

        for (stage, secs) in [
            ("stt", self.stages.stt.timeout_secs),
            ("llm", self.stages.llm.timeout_secs),
            ("tts", self.stages.tts.timeout_secs),
        ] {
            if secs == 0 {
                issues.push(format!("Invalid {} timeout: {}", stage, secs));
            }
        }

        if self.stages.tts.max_attempts == 0 {
            issues.push("Invalid TTS max attempts: 0 (no remote call will ever be made)".to_string());
        }

        if self.stages.tts.max_text_length < 4 {
            issues.push(format!(
                "Invalid TTS max text length: {}",
                self.stages.tts.max_text_length
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            issues.push(format!(
                "Invalid log level: {}. Must be one of {:?}",
                self.logging.level, VALID_LOG_LEVELS
            ));
        }

        issues
    }
}
