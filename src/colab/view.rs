//! External representation of a session.

use uuid::Uuid;

use super::session::SessionSnapshot;
use crate::config::DeploymentSettings;
use crate::models::CollaborationSessionView;

/// Build the session view clients receive. Pure, no side effects.
///
/// `request_host` is the `Host` header of the request that asked for the
/// view, used when no TLS subject name is configured.
pub fn build_session_view(
    session: &SessionSnapshot,
    deployment: &DeploymentSettings,
    request_host: Option<&str>,
) -> CollaborationSessionView {
    CollaborationSessionView {
        session_id: session.session_id,
        threat_model_id: session.threat_model_id,
        diagram_id: session.diagram_id,
        participants: session.participants.clone(),
        websocket_url: websocket_url(
            deployment,
            request_host,
            session.threat_model_id,
            session.diagram_id,
        ),
    }
}

/// Live endpoint of a diagram, `ws://` or `wss://` depending on TLS
pub fn websocket_url(
    deployment: &DeploymentSettings,
    request_host: Option<&str>,
    threat_model_id: Uuid,
    diagram_id: Uuid,
) -> String {
    let scheme = if deployment.tls_enabled { "wss" } else { "ws" };

    let authority = match (&deployment.tls_subject_name, deployment.tls_enabled) {
        (Some(subject), true) if deployment.port == 443 => subject.clone(),
        (Some(subject), true) => format!("{}:{}", subject, deployment.port),
        _ => match request_host {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => format!("localhost:{}", deployment.port),
        },
    };

    format!(
        "{}://{}/threat_models/{}/diagrams/{}/ws",
        scheme, authority, threat_model_id, diagram_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParticipantView;
    use chrono::Utc;

    fn snapshot() -> SessionSnapshot {
        let now = Utc::now();
        SessionSnapshot {
            session_id: Uuid::new_v4(),
            diagram_id: Uuid::new_v4(),
            threat_model_id: Uuid::new_v4(),
            host: "alice".to_string(),
            created_at: now,
            last_activity: now,
            participants: vec![ParticipantView {
                user_id: "bob".to_string(),
                joined_at: now,
            }],
        }
    }

    fn plain() -> DeploymentSettings {
        DeploymentSettings {
            tls_enabled: false,
            tls_subject_name: None,
            port: 8080,
        }
    }

    #[test]
    fn plain_deployment_uses_request_host() {
        let session = snapshot();
        let view = build_session_view(&session, &plain(), Some("colab.local:8080"));
        assert_eq!(view.session_id, session.session_id);
        assert_eq!(view.participants, session.participants);
        assert_eq!(
            view.websocket_url,
            format!(
                "ws://colab.local:8080/threat_models/{}/diagrams/{}/ws",
                session.threat_model_id, session.diagram_id
            )
        );
    }

    #[test]
    fn tls_subject_name_wins_over_request_host() {
        let session = snapshot();
        let mut deployment = DeploymentSettings {
            tls_enabled: true,
            tls_subject_name: Some("tmi.example.com".to_string()),
            port: 443,
        };
        let url = websocket_url(&deployment, Some("internal:8080"), session.threat_model_id, session.diagram_id);
        assert!(url.starts_with("wss://tmi.example.com/threat_models/"));

        deployment.port = 8443;
        let url = websocket_url(&deployment, Some("internal:8080"), session.threat_model_id, session.diagram_id);
        assert!(url.starts_with("wss://tmi.example.com:8443/"));
    }

    #[test]
    fn tls_without_subject_keeps_request_host() {
        let deployment = DeploymentSettings {
            tls_enabled: true,
            tls_subject_name: None,
            port: 443,
        };
        let url = websocket_url(&deployment, Some("edge.example.com"), Uuid::nil(), Uuid::nil());
        assert!(url.starts_with("wss://edge.example.com/"));
        assert!(websocket_url(&plain(), None, Uuid::nil(), Uuid::nil()).starts_with("ws://localhost:8080/"));
    }
}
