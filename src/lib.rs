//! Real-time collaboration service for threat model diagrams.
//!
//! Conventional REST writes and live WebSocket edits share one update
//! pipeline per diagram. While a collaboration session is active the REST
//! write path is closed.

pub mod auth;
pub mod colab;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use error::{ColabError, ColabResult};
pub use routes::create_app;
pub use state::AppState;
