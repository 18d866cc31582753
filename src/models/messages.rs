use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cell, ParticipantView};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CellOperationKind {
    Add,
    Update,
    Remove,
}

/// One cell edit inside a patch
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CellOperation {
    pub id: Uuid,
    pub operation: CellOperationKind,
    /// Full cell for add/update, ignored for remove
    pub data: Option<Cell>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DiagramPatch {
    #[serde(rename = "type")]
    pub kind: String,
    pub cells: Vec<CellOperation>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DiagramOperationMessage {
    pub operation_id: String,
    pub operation: DiagramPatch,
}

/// Frames a live client sends
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum ReceivedMessage {
    DiagramOperation(DiagramOperationMessage),
    ResyncRequest,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    Unauthorized,
    ConflictDetected,
    InvalidOperation,
    NoStateChange,
    ServerError,
}

/// Frames the server sends to live clients
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum SendMessage {
    DiagramState {
        update_vector: i64,
        cells: Vec<Cell>,
    },
    ParticipantJoined {
        user_id: String,
        timestamp: DateTime<Utc>,
    },
    ParticipantLeft {
        user_id: String,
        timestamp: DateTime<Utc>,
    },
    ParticipantsUpdate {
        host: String,
        participants: Vec<ParticipantView>,
    },
    OperationApplied {
        operation_id: String,
        update_vector: i64,
    },
    OperationRejected {
        operation_id: String,
        reason: RejectionReason,
        message: String,
    },
    SessionEnded {
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_diagram_operation() {
        let id = Uuid::new_v4();
        let raw = json!({
            "message_type": "diagram_operation",
            "operation_id": "op-1",
            "operation": {
                "type": "patch",
                "cells": [{"id": id, "operation": "add", "data": {"id": id, "shape": "process"}}]
            }
        });
        let msg: ReceivedMessage = serde_json::from_value(raw).unwrap();
        let ReceivedMessage::DiagramOperation(op) = msg else {
            panic!("expected diagram operation");
        };
        assert_eq!(op.operation.cells[0].operation, CellOperationKind::Add);
        let cell = op.operation.cells[0].data.as_ref().unwrap();
        assert_eq!(cell.data.get("shape"), Some(&json!("process")));
    }

    #[test]
    fn tags_outbound_frames() {
        let frame = SendMessage::SessionEnded {
            reason: "host_left".to_string(),
        };
        let value = serde_json::to_value(frame).unwrap();
        assert_eq!(value["message_type"], "session_ended");
        let resync: ReceivedMessage = serde_json::from_str(r#"{"message_type":"resync_request"}"#).unwrap();
        assert_eq!(resync, ReceivedMessage::ResyncRequest);
    }
}
