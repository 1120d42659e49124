use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single recorded utterance
///
/// Turns are immutable once created and only ever appended to a `Session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,

    pub content: String,

    /// When this turn was recorded
    pub timestamp: DateTime<Utc>,

    /// Transcription confidence (0.0 to 1.0), user turns only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            confidence,
        }
    }
}

/// Conversation state for one session identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,

    /// Turns in strict append order
    pub turns: Vec<Turn>,

    pub created_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            turns: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// The most recent `max` turns (all of them if fewer exist)
    pub fn trailing(&self, max: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(max);
        &self.turns[start..]
    }
}
