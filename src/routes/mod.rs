pub mod api;
pub mod auth_middleware;
pub mod body_guard;

pub use api::create_app;
