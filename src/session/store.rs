use super::stats::SessionStats;
use super::turn::{Role, Session, Turn};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Owns all conversation sessions, keyed by session identifier.
///
/// The outer map lock is only held long enough to find or insert a session;
/// each session carries its own mutex, so appends to one session serialize
/// while appends to different sessions proceed independently. No lock is
/// ever held across an await on anything other than these locks.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or insert the session, reporting whether it was just created
    async fn materialize(&self, id: &str) -> (Arc<Mutex<Session>>, bool) {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(id) {
                return (Arc::clone(session), false);
            }
        }

        let mut sessions = self.sessions.write().await;
        match sessions.entry(id.to_string()) {
            Entry::Occupied(existing) => (Arc::clone(existing.get()), false),
            Entry::Vacant(slot) => {
                info!("New chat session created: {}", id);
                let session = Arc::new(Mutex::new(Session::new(id.to_string())));
                slot.insert(Arc::clone(&session));
                (session, true)
            }
        }
    }

    /// Return the session for `id`, creating it if absent.
    ///
    /// With no `id`, a fresh identifier is generated. Calling this with an
    /// existing id never resets that session.
    pub async fn get_or_create(&self, id: Option<&str>) -> Session {
        let id = match id {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        let (session, _) = self.materialize(&id).await;
        let snapshot = session.lock().await.clone();
        snapshot
    }

    /// Make sure a session exists; returns `true` if this call created it
    pub async fn ensure(&self, id: &str) -> bool {
        self.materialize(id).await.1
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        let session = {
            let sessions = self.sessions.read().await;
            sessions.get(id).cloned()
        }?;
        let snapshot = session.lock().await.clone();
        Some(snapshot)
    }

    /// Append a turn, creating the session first if needed
    pub async fn append(
        &self,
        id: &str,
        role: Role,
        content: impl Into<String>,
        confidence: Option<f32>,
    ) -> Turn {
        let (session, _) = self.materialize(id).await;
        let turn = Turn::new(role, content, confidence);

        let mut session = session.lock().await;
        session.turns.push(turn.clone());

        let preview: String = turn.content.chars().take(50).collect();
        debug!(
            "Message added to session {}: {} - {}",
            id,
            role.as_str(),
            preview
        );

        turn
    }

    /// The most recent `max` turns in append order; empty for unknown ids
    pub async fn history(&self, id: &str, max: usize) -> Vec<Turn> {
        let session = {
            let sessions = self.sessions.read().await;
            sessions.get(id).cloned()
        };

        match session {
            Some(session) => session.lock().await.trailing(max).to_vec(),
            None => Vec::new(),
        }
    }

    pub async fn turn_count(&self, id: &str) -> usize {
        self.get(id).await.map(|s| s.turn_count()).unwrap_or(0)
    }

    /// Drop every turn from a session; `false` if the session is unknown
    pub async fn clear(&self, id: &str) -> bool {
        let session = {
            let sessions = self.sessions.read().await;
            sessions.get(id).cloned()
        };

        match session {
            Some(session) => {
                session.lock().await.turns.clear();
                info!("Session {} cleared", id);
                true
            }
            None => false,
        }
    }

    /// Remove a session entirely; `false` if the session is unknown
    pub async fn delete(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!("Session {} deleted", id);
        }
        removed
    }

    /// Snapshot copy of every session
    pub async fn all(&self) -> HashMap<String, Session> {
        let handles: Vec<(String, Arc<Mutex<Session>>)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .map(|(id, session)| (id.clone(), Arc::clone(session)))
                .collect()
        };

        let mut snapshot = HashMap::with_capacity(handles.len());
        for (id, session) in handles {
            snapshot.insert(id, session.lock().await.clone());
        }
        snapshot
    }

    pub async fn stats(&self) -> SessionStats {
        let sessions = self.all().await;
        SessionStats {
            active_sessions: sessions.len(),
            total_messages: sessions.values().map(Session::turn_count).sum(),
        }
    }
}
