//! Live participants of one collaboration session.
//!
//! Presence is driven purely by transport connections: a participant is
//! added when its WebSocket attaches and removed when it goes away. Each
//! participant owns a bounded outbound queue, fan-out never waits on it.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{ParticipantView, SendMessage};

pub type ConnectionId = Uuid;

/// A live connection handle plus the user behind it
#[derive(Debug)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
    outbound: mpsc::Sender<SendMessage>,
}

impl Participant {
    pub fn new(user_id: impl Into<String>, outbound: mpsc::Sender<SendMessage>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            user_id: user_id.into(),
            joined_at: Utc::now(),
            outbound,
        }
    }

    pub fn view(&self) -> ParticipantView {
        ParticipantView {
            user_id: self.user_id.clone(),
            joined_at: self.joined_at,
        }
    }
}

/// Delivery counts of one fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    /// Queue full, frame dropped for that connection only
    pub dropped: usize,
    /// Receiver already gone, the connection's own leave will clean it up
    pub disconnected: usize,
}

#[derive(Debug, Default)]
pub struct PresenceTracker {
    participants: Vec<Participant>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn insert(&mut self, participant: Participant) {
        self.participants.push(participant);
    }

    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Participant> {
        let index = self
            .participants
            .iter()
            .position(|p| p.connection_id == connection_id)?;
        Some(self.participants.remove(index))
    }

    /// Participants in join order
    pub fn views(&self) -> Vec<ParticipantView> {
        self.participants.iter().map(Participant::view).collect()
    }

    /// Queue `message` for every participant except `except`.
    pub fn fan_out(&self, message: &SendMessage, except: Option<ConnectionId>) -> FanOut {
        let mut result = FanOut::default();
        for participant in &self.participants {
            if Some(participant.connection_id) == except {
                continue;
            }
            match participant.outbound.try_send(message.clone()) {
                Ok(()) => result.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Outbound queue full for {} ({}), dropping frame",
                        participant.user_id, participant.connection_id
                    );
                    result.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(
                        "Connection {} of {} already closed",
                        participant.connection_id, participant.user_id
                    );
                    result.disconnected += 1;
                }
            }
        }
        result
    }

    /// Remove every participant. Dropping their queues tells each connection to close.
    pub fn drain(&mut self) -> Vec<Participant> {
        std::mem::take(&mut self.participants)
    }
}
