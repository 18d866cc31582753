use tokio::sync::RwLockReadGuard;
use uuid::Uuid;

use super::registry::{SessionMap, SessionRegistry};
use crate::error::{ColabError, ColabResult};

/// Direct diagram mutations the gate guards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectMutation {
    Modify,
    Delete,
}

impl DirectMutation {
    fn verb(&self) -> &'static str {
        match self {
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }
}

/// Held while a conventional write persists. Sessions cannot be created
/// until it is dropped.
#[must_use]
pub struct GateGuard<'a> {
    _sessions: RwLockReadGuard<'a, SessionMap>,
}

/// Reject a conventional write while the diagram is being edited live.
///
/// On success the returned guard keeps the diagram free of sessions until it
/// is dropped, so the check and the write cannot be split by a session create.
pub async fn ensure_no_active_session(
    registry: &SessionRegistry,
    diagram_id: Uuid,
    mutation: DirectMutation,
) -> ColabResult<GateGuard<'_>> {
    let sessions = registry.read_map().await;
    if sessions.contains_key(&diagram_id) {
        return Err(ColabError::conflict(format!(
            "Cannot {} diagram while collaboration session is active. Please end the collaboration session first.",
            mutation.verb()
        )));
    }
    Ok(GateGuard { _sessions: sessions })
}
