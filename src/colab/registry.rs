//! Process-wide index of active collaboration sessions, keyed by diagram id.
//!
//! The registry is constructed explicitly and cloned into whoever needs it.
//! Lock order is always registry map first, then a session's own state.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::presence::ConnectionId;
use super::session::CollaborationSession;

pub const REASON_HOST_LEFT: &str = "host_left";
pub const REASON_CLOSED_BY_HOST: &str = "closed_by_host";
pub const REASON_IDLE: &str = "idle_timeout";

pub(crate) type SessionMap = HashMap<Uuid, Arc<CollaborationSession>>;

/// Result of a create-or-join request
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub session: Arc<CollaborationSession>,
    /// True when this call established the session
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The connection was not (or no longer) part of the session
    NotPresent,
    /// A non-host left, the session stays active
    Left,
    /// The host left and the session was closed
    SessionClosed,
}

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<SessionMap>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, diagram_id: Uuid) -> Option<Arc<CollaborationSession>> {
        self.sessions.read().await.get(&diagram_id).cloned()
    }

    /// Return the active session for the diagram, establishing one with
    /// `actor` as host when there is none.
    pub async fn create(&self, diagram_id: Uuid, threat_model_id: Uuid, actor: &str) -> SessionEntry {
        let mut sessions = self.sessions.write().await;

        if let Some(existing) = sessions.get(&diagram_id) {
            if !existing.is_closed().await {
                debug!(
                    "Session {} already active on diagram {}, joining",
                    existing.id, diagram_id
                );
                return SessionEntry {
                    session: Arc::clone(existing),
                    created: false,
                };
            }
            warn!(
                "Replacing closed session {} left behind on diagram {}",
                existing.id, diagram_id
            );
        }

        let session = Arc::new(CollaborationSession::new(diagram_id, threat_model_id, actor));
        sessions.insert(diagram_id, Arc::clone(&session));
        info!(
            "Created session {} on diagram {} with host {}",
            session.id, diagram_id, actor
        );
        SessionEntry {
            session,
            created: true,
        }
    }

    /// Remove the diagram's session and disconnect all of its participants.
    pub async fn close(&self, diagram_id: Uuid, reason: &str) -> bool {
        let removed = self.sessions.write().await.remove(&diagram_id);
        match removed {
            Some(session) => {
                session.terminate(reason).await;
                true
            }
            None => false,
        }
    }

    /// Close `session` only if it is still the one registered for its diagram
    pub async fn close_session(&self, session: &Arc<CollaborationSession>, reason: &str) -> bool {
        {
            let mut sessions = self.sessions.write().await;
            match sessions.get(&session.diagram_id) {
                Some(current) if Arc::ptr_eq(current, session) => {
                    sessions.remove(&session.diagram_id);
                }
                _ => {
                    debug!("Session {} is no longer registered", session.id);
                    return false;
                }
            }
        }
        session.terminate(reason).await
    }

    /// Shared access to the map. No session is created or closed while it is held.
    pub(crate) async fn read_map(&self) -> RwLockReadGuard<'_, SessionMap> {
        self.sessions.read().await
    }

    pub async fn has_active(&self, diagram_id: Uuid) -> bool {
        self.sessions.read().await.contains_key(&diagram_id)
    }

    pub async fn list(&self) -> Vec<Arc<CollaborationSession>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Detach a live connection. The host leaving closes the session.
    pub async fn leave(&self, session: &Arc<CollaborationSession>, connection_id: ConnectionId) -> LeaveOutcome {
        let Some(participant) = session.remove_participant(connection_id).await else {
            return LeaveOutcome::NotPresent;
        };

        if session.is_host(&participant.user_id) {
            info!(
                "Host {} left session {}, closing it",
                participant.user_id, session.id
            );
            self.close_session(session, REASON_HOST_LEFT).await;
            return LeaveOutcome::SessionClosed;
        }
        LeaveOutcome::Left
    }

    /// Close every session with no participants and no activity for `idle_for`.
    /// Returns the number of sessions closed.
    pub async fn sweep_idle(&self, idle_for: Duration) -> usize {
        let idle_for = match chrono::Duration::from_std(idle_for) {
            Ok(d) => d,
            Err(_) => return 0,
        };
        let now = Utc::now();

        let mut idle = Vec::new();
        for session in self.list().await {
            if session.is_idle(now, idle_for).await {
                idle.push(session);
            }
        }

        let mut closed = 0;
        for session in idle {
            // activity may have resumed since the scan
            if !session.is_idle(Utc::now(), idle_for).await {
                continue;
            }
            if self.close_session(&session, REASON_IDLE).await {
                info!(
                    "Closed idle session {} on diagram {}",
                    session.id, session.diagram_id
                );
                closed += 1;
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colab::presence::Participant;
    use crate::models::SendMessage;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn create_then_join_returns_same_session() {
        let registry = SessionRegistry::new();
        let diagram_id = Uuid::new_v4();
        let tm_id = Uuid::new_v4();

        let first = registry.create(diagram_id, tm_id, "alice").await;
        let second = registry.create(diagram_id, tm_id, "bob").await;

        assert!(first.created);
        assert!(!second.created);
        assert!(Arc::ptr_eq(&first.session, &second.session));
        assert_eq!(second.session.host, "alice");
        assert!(registry.has_active(diagram_id).await);
    }

    #[tokio::test]
    async fn concurrent_creates_yield_one_session() {
        let registry = SessionRegistry::new();
        let diagram_id = Uuid::new_v4();
        let tm_id = Uuid::new_v4();

        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.create(diagram_id, tm_id, &format!("user-{}", i)).await
            }));
        }

        let mut created = 0;
        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            let entry = handle.await.unwrap();
            if entry.created {
                created += 1;
            }
            ids.insert(entry.session.id);
        }
        assert_eq!(created, 1);
        assert_eq!(ids.len(), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn close_returns_diagram_to_absent() {
        let registry = SessionRegistry::new();
        let diagram_id = Uuid::new_v4();
        let entry = registry.create(diagram_id, Uuid::new_v4(), "alice").await;

        assert!(registry.close(diagram_id, REASON_CLOSED_BY_HOST).await);
        assert!(!registry.close(diagram_id, REASON_CLOSED_BY_HOST).await);
        assert!(registry.get(diagram_id).await.is_none());
        assert!(!registry.has_active(diagram_id).await);
        assert!(entry.session.is_closed().await);

        let again = registry.create(diagram_id, Uuid::new_v4(), "bob").await;
        assert!(again.created);
        assert_ne!(again.session.id, entry.session.id);
    }

    #[tokio::test]
    async fn non_host_leave_keeps_session_active() {
        let registry = SessionRegistry::new();
        let diagram_id = Uuid::new_v4();
        let session = registry.create(diagram_id, Uuid::new_v4(), "alice").await.session;

        let (tx, _rx) = mpsc::channel(8);
        let bob = Participant::new("bob", tx);
        let bob_conn = bob.connection_id;
        session.join(bob).await.unwrap();

        assert_eq!(registry.leave(&session, bob_conn).await, LeaveOutcome::Left);
        assert_eq!(registry.leave(&session, bob_conn).await, LeaveOutcome::NotPresent);
        assert!(registry.has_active(diagram_id).await);
        assert_eq!(session.participant_count().await, 0);
    }

    #[tokio::test]
    async fn host_leave_closes_and_notifies_others() {
        let registry = SessionRegistry::new();
        let diagram_id = Uuid::new_v4();
        let session = registry.create(diagram_id, Uuid::new_v4(), "alice").await.session;

        let (host_tx, _host_rx) = mpsc::channel(8);
        let host = Participant::new("alice", host_tx);
        let host_conn = host.connection_id;
        session.join(host).await.unwrap();

        let (bob_tx, mut bob_rx) = mpsc::channel(8);
        session.join(Participant::new("bob", bob_tx)).await.unwrap();

        assert_eq!(registry.leave(&session, host_conn).await, LeaveOutcome::SessionClosed);
        assert!(registry.get(diagram_id).await.is_none());

        let mut frames = Vec::new();
        while let Some(frame) = bob_rx.recv().await {
            frames.push(frame);
        }
        assert_eq!(
            frames.last(),
            Some(&SendMessage::SessionEnded {
                reason: REASON_HOST_LEFT.to_string()
            })
        );
    }

    #[tokio::test]
    async fn stale_handle_cannot_close_replacement() {
        let registry = SessionRegistry::new();
        let diagram_id = Uuid::new_v4();
        let old = registry.create(diagram_id, Uuid::new_v4(), "alice").await.session;
        registry.close(diagram_id, REASON_CLOSED_BY_HOST).await;
        let replacement = registry.create(diagram_id, Uuid::new_v4(), "bob").await.session;

        assert!(!registry.close_session(&old, REASON_IDLE).await);
        assert!(!replacement.is_closed().await);
        assert!(registry.has_active(diagram_id).await);
    }

    #[tokio::test]
    async fn sweep_closes_only_empty_idle_sessions() {
        let registry = SessionRegistry::new();
        let empty = Uuid::new_v4();
        let busy = Uuid::new_v4();
        registry.create(empty, Uuid::new_v4(), "alice").await;
        let busy_session = registry.create(busy, Uuid::new_v4(), "bob").await.session;
        let (tx, _rx) = mpsc::channel(8);
        busy_session.join(Participant::new("carol", tx)).await.unwrap();

        assert_eq!(registry.sweep_idle(Duration::from_secs(900)).await, 0);
        assert_eq!(registry.sweep_idle(Duration::ZERO).await, 1);
        assert!(!registry.has_active(empty).await);
        assert!(registry.has_active(busy).await);
    }
}
