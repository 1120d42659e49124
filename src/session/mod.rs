//! Conversation session management
//!
//! This module provides the `SessionStore` that owns every conversation:
//! - Session creation (explicit, or implicit on first message)
//! - Append-only turn history per session
//! - Bounded trailing-history queries for the responder
//! - Clear / delete and aggregate statistics

mod stats;
mod store;
mod turn;

pub use stats::SessionStats;
pub use store::SessionStore;
pub use turn::{Role, Session, Turn};
