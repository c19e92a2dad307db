//! Process-wide game state shared by every connection
//!
//! This module holds the only state that crosses session boundaries:
//! - The set of active sessions, used to deliver the game-over broadcast
//! - The game-over flag, which exactly one winning session gets to set
//!
//! Scores are never stored here. Each session owns its score and only the
//! game-over signal travels between sessions.

use log::{debug, info};
use shared::ServerMessage;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::{mpsc, Mutex};

pub type SessionId = u32;

/// Registered entry for one connected player
///
/// The sender feeds the connection's outbound writer, so messages pushed
/// here are delivered in order with the session's own messages.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub addr: SocketAddr,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl SessionHandle {
    pub fn new(
        id: SessionId,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self { id, addr, sender }
    }

    /// Queues a message for this connection. Returns false if the
    /// connection's writer has already gone away.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// Active sessions plus the single game-over flag
///
/// One instance is created at server start and handed to every session
/// through an `Arc`. Membership changes and broadcasts are serialized by
/// one lock; the flag itself is an atomic so the per-round check never
/// waits on that lock.
pub struct SessionState {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
    game_over: AtomicBool,
    next_session_id: AtomicU32,
    max_sessions: usize,
}

impl SessionState {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            game_over: AtomicBool::new(false),
            next_session_id: AtomicU32::new(1),
            max_sessions,
        }
    }

    /// Adds a session to the active set
    ///
    /// Returns the new session id, or None when the server is at capacity.
    /// Registered sessions receive every later game-over broadcast.
    pub async fn register(
        &self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Option<SessionId> {
        let mut sessions = self.sessions.lock().await;
        if sessions.len() >= self.max_sessions {
            return None;
        }

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        sessions.insert(id, SessionHandle::new(id, addr, sender));
        info!("Session {} registered for {} ({} active)", id, addr, sessions.len());
        Some(id)
    }

    /// Removes a terminated session. Returns false if it was already gone.
    pub async fn unregister(&self, id: SessionId) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.remove(&id) {
            Some(handle) => {
                debug!("Session {} ({}) removed, {} active", id, handle.addr, sessions.len());
                true
            }
            None => false,
        }
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over.load(Ordering::Acquire)
    }

    /// Atomically flips the game-over flag from unset to set
    ///
    /// Exactly one caller ever observes true. That caller is the winner and
    /// is responsible for calling [`SessionState::broadcast_game_over`].
    pub fn try_declare_game_over(&self) -> bool {
        self.game_over
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Sends `GAME_OVER` to every registered session, the winner included
    ///
    /// Returns how many connections the notice was queued for. Sessions
    /// whose writer has already stopped are skipped.
    pub async fn broadcast_game_over(&self) -> usize {
        let sessions = self.sessions.lock().await;
        let mut delivered = 0;

        for handle in sessions.values() {
            if handle.send(ServerMessage::GameOver) {
                delivered += 1;
            } else {
                debug!("Session {} ({}) already closed, skipping", handle.id, handle.addr);
            }
        }

        info!("Game over broadcast to {}/{} sessions", delivered, sessions.len());
        delivered
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
