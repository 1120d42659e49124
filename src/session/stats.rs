use serde::{Deserialize, Serialize};

/// Aggregate statistics across all live sessions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Number of sessions currently held in memory
    pub active_sessions: usize,

    /// Sum of turn counts across all sessions
    pub total_messages: usize,
}
