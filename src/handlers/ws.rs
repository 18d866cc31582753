use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::colab::{CollaborationSession, ConnectionId, Participant, UpdateSource};
use crate::error::{ColabError, ColabResult, TransformError};
use crate::models::{DiagramOperationMessage, ReceivedMessage, RejectionReason, Role, SendMessage};
use crate::routes::auth_middleware::AuthUser;
use crate::services::access_service::{authorize, load_diagram};
use crate::services::diagram_service::cell_operations_transform;
use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const JOIN_ATTEMPTS: usize = 3;

/// Everything a live connection needs once upgraded
struct LiveConnection {
    state: AppState,
    threat_model_id: Uuid,
    diagram_id: Uuid,
    user_id: String,
    role: Role,
}

/// WebSocket handler. Access is checked before the upgrade so failures are plain HTTP errors.
pub async fn websocket_handler(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((threat_model_id, diagram_id)): Path<(Uuid, Uuid)>,
    ws: WebSocketUpgrade,
) -> ColabResult<Response> {
    info!("New WebSocket connection attempt for diagram {} by {}", diagram_id, user_id);
    let threat_model = authorize(&state, threat_model_id, &user_id, Role::Reader).await?;
    load_diagram(&state, &threat_model, diagram_id).await?;
    let role = threat_model.role_of(&user_id).unwrap_or(Role::Reader);

    let connection = LiveConnection {
        state,
        threat_model_id,
        diagram_id,
        user_id,
        role,
    };
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, connection)))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, connection: LiveConnection) {
    let capacity = connection.state.config.participant_queue_capacity.max(1);
    let (outbound, mut frames) = mpsc::channel::<SendMessage>(capacity);

    // The session owns the only strong sender, dropping it ends the writer
    let replies = outbound.downgrade();
    let Some((session, connection_id)) = join_session(&connection, outbound).await else {
        return;
    };
    info!(
        "WebSocket connection {} established for diagram {} by {}",
        connection_id, connection.diagram_id, connection.user_id
    );

    // through the diagram's worker, so no broadcast can overtake it
    send_state(&connection, &replies).await;

    let (mut sender, mut receiver) = socket.split();

    // Forward queued frames to the client, with a keep-alive ping
    let mut send_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.tick().await;
        loop {
            tokio::select! {
                frame = frames.recv() => {
                    let Some(frame) = frame else {
                        // session closed under us
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    };
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to serialize frame: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Listen to the client and apply its operations
    let recv_connection = LiveConnection {
        state: connection.state.clone(),
        threat_model_id: connection.threat_model_id,
        diagram_id: connection.diagram_id,
        user_id: connection.user_id.clone(),
        role: connection.role,
    };
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let parsed: ReceivedMessage = match serde_json::from_str(&text) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(
                        "Failed to parse message on diagram {} from {}: {}",
                        recv_connection.diagram_id, recv_connection.user_id, e
                    );
                    continue;
                }
            };

            let response = match parsed {
                ReceivedMessage::DiagramOperation(op) => {
                    handle_operation(&recv_connection, connection_id, op).await
                }
                ReceivedMessage::ResyncRequest => {
                    send_state(&recv_connection, &replies).await;
                    None
                }
            };
            if let Some(response) = response {
                reply(&replies, response);
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    let outcome = connection.state.registry.leave(&session, connection_id).await;
    info!(
        "WebSocket connection {} terminated ({:?})",
        connection_id, outcome
    );
}

/// Create-or-join the diagram's session and attach this connection.
///
/// A session can close between lookup and join, so a fresh one is tried.
async fn join_session(
    connection: &LiveConnection,
    outbound: mpsc::Sender<SendMessage>,
) -> Option<(Arc<CollaborationSession>, ConnectionId)> {
    for _ in 0..JOIN_ATTEMPTS {
        let entry = connection
            .state
            .registry
            .create(connection.diagram_id, connection.threat_model_id, &connection.user_id)
            .await;
        let participant = Participant::new(connection.user_id.clone(), outbound.clone());
        let connection_id = participant.connection_id;
        match entry.session.join(participant).await {
            Ok(()) => return Some((entry.session, connection_id)),
            Err(e) => debug!("Join on diagram {} failed: {}", connection.diagram_id, e),
        }
    }
    error!(
        "Giving up joining a session on diagram {} for {}",
        connection.diagram_id, connection.user_id
    );
    None
}

fn reply(replies: &mpsc::WeakSender<SendMessage>, frame: SendMessage) {
    let Some(outbound) = replies.upgrade() else {
        return;
    };
    if let Err(e) = outbound.try_send(frame) {
        warn!("Could not queue reply: {}", e);
    }
}

async fn handle_operation(
    connection: &LiveConnection,
    connection_id: ConnectionId,
    message: DiagramOperationMessage,
) -> Option<SendMessage> {
    let DiagramOperationMessage {
        operation_id,
        operation,
    } = message;
    let reject = |reason: RejectionReason, message: String| SendMessage::OperationRejected {
        operation_id: operation_id.clone(),
        reason,
        message,
    };

    if connection.role < Role::Writer {
        return Some(reject(
            RejectionReason::Unauthorized,
            "Writer access is required to edit this diagram".to_string(),
        ));
    }
    if operation.kind != "patch" {
        return Some(reject(
            RejectionReason::InvalidOperation,
            format!("Unsupported operation type '{}'", operation.kind),
        ));
    }

    let result = connection
        .state
        .pipeline
        .update_diagram(
            connection.diagram_id,
            cell_operations_transform(operation.cells),
            UpdateSource::Live { connection_id },
            &connection.user_id,
        )
        .await;

    let response = match result {
        Ok(outcome) if outcome.event.changed => SendMessage::OperationApplied {
            operation_id: operation_id.clone(),
            update_vector: outcome.event.update_vector,
        },
        Ok(_) => reject(
            RejectionReason::NoStateChange,
            "Operation did not change the diagram".to_string(),
        ),
        Err(ColabError::Transform(e @ TransformError::Conflict { .. })) => {
            reject(RejectionReason::ConflictDetected, e.to_string())
        }
        Err(ColabError::Transform(e @ TransformError::Invalid(_))) => {
            reject(RejectionReason::InvalidOperation, e.to_string())
        }
        Err(e) => {
            error!(
                "Operation {} on diagram {} failed: {}",
                operation_id, connection.diagram_id, e
            );
            reject(RejectionReason::ServerError, "Failed to apply operation".to_string())
        }
    };
    Some(response)
}

async fn send_state(connection: &LiveConnection, replies: &mpsc::WeakSender<SendMessage>) {
    if let Err(e) = connection
        .state
        .pipeline
        .send_state(connection.diagram_id, replies.clone())
        .await
    {
        error!("Failed to send state of diagram {}: {}", connection.diagram_id, e);
    }
}
