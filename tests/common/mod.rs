#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use diagram_colab::config::Config;
use diagram_colab::db::{DiagramStore, MemoryStore};
use diagram_colab::models::{DiagramSnapshot, Role, ThreatModel};
use diagram_colab::{create_app, AppState};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const SECRET: &str = "test-secret";

/// alice owns the threat model, bob writes, carol reads, mallory has nothing
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub threat_model_id: Uuid,
    pub diagram_id: Uuid,
}

pub fn token(user_id: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    encode(
        &Header::new(Algorithm::HS256),
        &json!({"sub": user_id, "exp": exp}),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn test_config() -> Config {
    Config {
        auth_jwt_secret: Some(SECRET.to_string()),
        environment: "test".to_string(),
        ..Config::default()
    }
}

impl TestApp {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let tm = ThreatModel::new("payments", "alice")
            .grant("bob", Role::Writer)
            .grant("carol", Role::Reader);
        let threat_model_id = tm.id;
        store.insert_threat_model(tm).await;

        let diagram = DiagramSnapshot::new(threat_model_id, "d1");
        let diagram_id = diagram.id;
        store.create(&diagram).await.unwrap();

        let state = AppState::in_memory(test_config(), store.clone());
        let app = create_app(state.clone());
        Self {
            app,
            state,
            store,
            threat_model_id,
            diagram_id,
        }
    }

    pub fn diagram_path(&self) -> String {
        format!("/threat_models/{}/diagrams/{}", self.threat_model_id, self.diagram_id)
    }

    pub fn collaborate_path(&self) -> String {
        format!("{}/collaborate", self.diagram_path())
    }

    pub async fn request(&self, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "colab.test");
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
        }
        let body = match body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = self.app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}
