use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::presence::{ConnectionId, FanOut, Participant, PresenceTracker};
use crate::error::{ColabError, ColabResult};
use crate::models::{ParticipantView, SendMessage};

/// Mutable part of a session, guarded by the session's readers/writer lock
#[derive(Debug)]
struct SessionState {
    presence: PresenceTracker,
    last_activity: DateTime<Utc>,
    closed: bool,
}

/// Ephemeral coordination record for one diagram being edited live.
///
/// Identity and host are fixed at creation. Participants, activity time and
/// the closed flag change under `state`.
#[derive(Debug)]
pub struct CollaborationSession {
    pub id: Uuid,
    pub diagram_id: Uuid,
    pub threat_model_id: Uuid,
    pub host: String,
    pub created_at: DateTime<Utc>,
    state: RwLock<SessionState>,
}

/// Point-in-time copy of a session, input of the session view builder
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub diagram_id: Uuid,
    pub threat_model_id: Uuid,
    pub host: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub participants: Vec<ParticipantView>,
}

impl CollaborationSession {
    pub fn new(diagram_id: Uuid, threat_model_id: Uuid, host: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            diagram_id,
            threat_model_id,
            host: host.into(),
            created_at: now,
            state: RwLock::new(SessionState {
                presence: PresenceTracker::new(),
                last_activity: now,
                closed: false,
            }),
        }
    }

    pub fn is_host(&self, user_id: &str) -> bool {
        self.host == user_id
    }

    /// Attach a live connection. Fails once the session has been closed.
    pub async fn join(&self, participant: Participant) -> ColabResult<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(ColabError::conflict(format!(
                "Collaboration session {} has been closed",
                self.id
            )));
        }

        let now = Utc::now();
        let user_id = participant.user_id.clone();
        let connection_id = participant.connection_id;
        state.presence.insert(participant);
        state.last_activity = now;

        info!(
            "User {} joined session {} on diagram {} ({} participants)",
            user_id,
            self.id,
            self.diagram_id,
            state.presence.len()
        );

        state.presence.fan_out(
            &SendMessage::ParticipantJoined {
                user_id,
                timestamp: now,
            },
            Some(connection_id),
        );
        state.presence.fan_out(&self.participants_update(&state), None);
        Ok(())
    }

    /// Detach a live connection. Returns the removed participant, if it was present.
    pub async fn remove_participant(&self, connection_id: ConnectionId) -> Option<Participant> {
        let mut state = self.state.write().await;
        let participant = state.presence.remove(connection_id)?;
        let now = Utc::now();
        state.last_activity = now;

        info!(
            "User {} left session {} on diagram {} ({} participants)",
            participant.user_id,
            self.id,
            self.diagram_id,
            state.presence.len()
        );

        if !state.closed {
            state.presence.fan_out(
                &SendMessage::ParticipantLeft {
                    user_id: participant.user_id.clone(),
                    timestamp: now,
                },
                None,
            );
            state.presence.fan_out(&self.participants_update(&state), None);
        }
        Some(participant)
    }

    /// Fan a frame out to every participant except `except`. No-op once closed.
    pub async fn broadcast(&self, message: &SendMessage, except: Option<ConnectionId>) -> FanOut {
        let mut state = self.state.write().await;
        if state.closed {
            return FanOut::default();
        }
        state.last_activity = Utc::now();
        state.presence.fan_out(message, except)
    }

    /// Stop all broadcasts and disconnect every participant.
    ///
    /// Returns false when the session was already closed.
    pub async fn terminate(&self, reason: &str) -> bool {
        let mut state = self.state.write().await;
        if state.closed {
            return false;
        }
        state.closed = true;
        state.presence.fan_out(
            &SendMessage::SessionEnded {
                reason: reason.to_string(),
            },
            None,
        );
        let disconnected = state.presence.drain();
        info!(
            "Session {} on diagram {} closed ({}), disconnecting {} participants",
            self.id,
            self.diagram_id,
            reason,
            disconnected.len()
        );
        true
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    pub async fn participant_count(&self) -> usize {
        self.state.read().await.presence.len()
    }

    /// True when nobody is connected and nothing happened for `idle_for`
    pub async fn is_idle(&self, now: DateTime<Utc>, idle_for: chrono::Duration) -> bool {
        let state = self.state.read().await;
        state.presence.is_empty() && now - state.last_activity >= idle_for
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot {
            session_id: self.id,
            diagram_id: self.diagram_id,
            threat_model_id: self.threat_model_id,
            host: self.host.clone(),
            created_at: self.created_at,
            last_activity: state.last_activity,
            participants: state.presence.views(),
        }
    }

    fn participants_update(&self, state: &SessionState) -> SendMessage {
        SendMessage::ParticipantsUpdate {
            host: self.host.clone(),
            participants: state.presence.views(),
        }
    }
}
